//! Shared test utilities for PromptCrafter
//!
//! - Deterministic id generation
//! - Throwaway on-disk databases

pub mod determinism;

use promptcrafter::Database;
use tempfile::TempDir;

/// Create a database in a temporary directory
pub fn temp_database() -> (Database, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(dir.path().join("test.db")).expect("Failed to open database");
    (db, dir)
}
