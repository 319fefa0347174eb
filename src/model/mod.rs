//! Language model invocation
//!
//! The workbench only depends on [`ModelClient`]; [`OllamaClient`] talks to a
//! local Ollama server and [`mock::MockModelClient`] scripts responses for tests.

pub mod mock;
pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::TaskType;

pub use ollama::OllamaClient;

/// Options that shape prompt construction and generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_tests: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_citations: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examples_text: Option<String>,
}

/// A model the server can run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Could not reach the model server: {0}")]
    Request(String),
    #[error("Model server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected response from model server: {0}")]
    Decode(String),
    #[error("Request aborted")]
    Aborted,
}

impl ModelError {
    /// User-initiated cancellation, not a failure
    pub fn is_abort(&self) -> bool {
        matches!(self, ModelError::Aborted)
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ModelError::Decode(err.to_string())
        } else {
            ModelError::Request(err.to_string())
        }
    }
}

/// Anything that turns a built prompt into model output
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        task_type: TaskType,
        options: &GenerationOptions,
    ) -> Result<String, ModelError>;

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ModelError>;
}
