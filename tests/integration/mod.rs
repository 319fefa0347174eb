//! Integration tests for PromptCrafter
//!
//! These tests verify that multiple components work together correctly.

#[path = "../common/mod.rs"]
pub mod common;

pub mod version_properties;
pub mod workbench_flow;
