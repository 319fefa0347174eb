//! Mock model client for deterministic testing
//!
//! Returns scripted responses without any network access and records every
//! prompt it receives.
//!
//! # Example
//! ```no_run
//! use promptcrafter::model::mock::MockModelClient;
//!
//! let client = MockModelClient::new()
//!     .with_response("Refined prompt")
//!     .with_failure("connection refused");
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{GenerationOptions, ModelClient, ModelError, ModelInfo};
use crate::data::TaskType;

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail(String),
}

/// Scripted [`ModelClient`]
#[derive(Clone, Default)]
pub struct MockModelClient {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    /// Reply used once the script runs out
    fallback: Option<String>,
    /// Delay before answering (lets tests cancel in-flight calls)
    delay: Duration,
    models: Vec<ModelInfo>,
    captured_prompts: Arc<Mutex<Vec<String>>>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.script.lock().push_back(Scripted::Reply(response.into()));
        self
    }

    /// Queue a failure whose message is surfaced to the user
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.script.lock().push_back(Scripted::Fail(message.into()));
        self
    }

    /// Reply with `response` whenever nothing is queued
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_models(mut self, names: &[&str]) -> Self {
        self.models = names
            .iter()
            .map(|name| ModelInfo {
                name: name.to_string(),
                size: None,
            })
            .collect();
        self
    }

    /// Prompts received so far, in call order
    pub fn captured_prompts(&self) -> Vec<String> {
        self.captured_prompts.lock().clone()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn generate(
        &self,
        prompt: &str,
        _task_type: TaskType,
        _options: &GenerationOptions,
    ) -> Result<String, ModelError> {
        self.captured_prompts.lock().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(message)) => Err(ModelError::Request(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| ModelError::Request("mock script exhausted".to_string())),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ModelError> {
        Ok(self.models.clone())
    }
}
