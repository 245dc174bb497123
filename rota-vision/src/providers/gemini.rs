//! Gemini provider over the generateContent REST surface.

use async_trait::async_trait;
use base64::Engine;
use rota_core::VisionError;
use serde_json::{json, Value};

use crate::{TextModel, VisionModel};

const PROVIDER: &str = "gemini";

/// Gemini client. One instance per (api key, model) pair; keys may be
/// per-owner, so instances are constructed where needed rather than shared
/// process-wide.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_failed(e: reqwest::Error) -> VisionError {
        VisionError::RequestFailed {
            provider: PROVIDER.to_string(),
            status: e.status().map(|s| s.as_u16() as i32).unwrap_or(0),
            message: e.to_string(),
        }
    }

    async fn generate(&self, parts: Value) -> Result<String, VisionError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({ "contents": [{ "parts": parts }] });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::request_failed)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VisionError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: status.as_u16() as i32,
                message,
            });
        }

        let payload: Value = response.json().await.map_err(Self::request_failed)?;
        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| VisionError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "no text part in first candidate".to_string(),
            })
    }
}

#[async_trait]
impl VisionModel for GeminiProvider {
    async fn infer_image(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, VisionError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let parts = json!([
            { "text": prompt },
            { "inline_data": { "mime_type": mime_type, "data": encoded } }
        ]);
        self.generate(parts).await
    }
}

#[async_trait]
impl TextModel for GeminiProvider {
    async fn infer(&self, prompt: &str) -> Result<String, VisionError> {
        self.generate(json!([{ "text": prompt }])).await
    }
}
