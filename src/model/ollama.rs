//! Client for a locally running Ollama server

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationOptions, ModelClient, ModelError, ModelInfo};
use crate::config::ModelConfig;
use crate::data::TaskType;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<SamplingOptions>,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            config.name.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request_body<'a>(&'a self, prompt: &'a str, options: &GenerationOptions) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: options
                .temperature
                .map(|temperature| SamplingOptions { temperature }),
        }
    }

    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ModelError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        task_type: TaskType,
        options: &GenerationOptions,
    ) -> Result<String, ModelError> {
        debug!(model = %self.model, task_type = %task_type, "Sending generate request");
        let response = self
            .client
            .post(self.url("api/generate"))
            .json(&self.request_body(prompt, options))
            .send()
            .await?;
        let response = Self::error_for_status(response).await?;
        let body: GenerateResponse = response.json().await?;
        Ok(body.response)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ModelError> {
        let response = self.client.get(self.url("api/tags")).send().await?;
        let response = Self::error_for_status(response).await?;
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models)
    }
}
