//! Ollama provider for local inference.

use async_trait::async_trait;
use base64::Engine;
use rota_core::VisionError;
use serde_json::{json, Value};

use crate::{TextModel, VisionModel};

const PROVIDER: &str = "ollama";

/// Client for a local Ollama daemon.
pub struct OllamaProvider {
    http: reqwest::Client,
    model: String,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            model: model.into(),
            base_url: "http://localhost:11434".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn generate(&self, body: Value) -> Result<String, VisionError> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: e.status().map(|s| s.as_u16() as i32).unwrap_or(0),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VisionError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: status.as_u16() as i32,
                message,
            });
        }

        let payload: Value = response.json().await.map_err(|e| VisionError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        })?;
        payload["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| VisionError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "missing response field".to_string(),
            })
    }
}

#[async_trait]
impl VisionModel for OllamaProvider {
    async fn infer_image(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, VisionError> {
        // Ollama infers the image type; the mime type is not sent.
        let _ = mime_type;
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "images": [encoded],
            "stream": false
        });
        self.generate(body).await
    }
}

#[async_trait]
impl TextModel for OllamaProvider {
    async fn infer(&self, prompt: &str) -> Result<String, VisionError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false
        });
        self.generate(body).await
    }
}
