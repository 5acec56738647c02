//! Mistral chat-completion generation backend.
//!
//! The Mistral API mirrors the OpenAI shapes: `GET /v1/models` for the
//! credential probe, `POST /v1/chat/completions` for generation.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::EngineError;
use crate::models::QaPair;

use super::{
    chat_completion_content, parse_qa_pairs, qa_system_prompt, BackendKind, GenerationBackend,
    GenerationRequest,
};

pub struct MistralBackend {
    model: String,
    base_url: String,
    timeout: Duration,
}

impl MistralBackend {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for mistral backend"))?;
        Ok(Self {
            model,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.mistral.ai".to_string()),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn client(&self) -> Result<reqwest::Client, EngineError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EngineError::Generation {
                backend: BackendKind::Mistral,
                detail: format!("failed to build HTTP client: {}", e),
            })
    }
}

#[async_trait]
impl GenerationBackend for MistralBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mistral
    }

    async fn validate_credential(&self, credential: &str) -> Result<(), EngineError> {
        let client = self.client()?;
        let resp = client
            .get(format!("{}/v1/models", self.base_url))
            .header("Authorization", format!("Bearer {}", credential))
            .send()
            .await
            .map_err(|e| EngineError::InvalidCredential {
                backend: BackendKind::Mistral,
                detail: format!("probe failed: {}", e),
            })?;

        if !resp.status().is_success() {
            return Err(EngineError::InvalidCredential {
                backend: BackendKind::Mistral,
                detail: format!("probe returned HTTP {}", resp.status()),
            });
        }
        Ok(())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<QaPair>, EngineError> {
        let credential = request.credential.as_deref().unwrap_or_default();
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": qa_system_prompt(&request.context_hint) },
                { "role": "user", "content": request.document_text },
            ],
        });

        let client = self.client()?;
        let resp = client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", credential))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Generation {
                backend: BackendKind::Mistral,
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(EngineError::Generation {
                backend: BackendKind::Mistral,
                detail: format!("HTTP {}: {}", status, body_text),
            });
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| EngineError::Generation {
            backend: BackendKind::Mistral,
            detail: format!("invalid completion response: {}", e),
        })?;

        let content = chat_completion_content(&json).ok_or_else(|| EngineError::Generation {
            backend: BackendKind::Mistral,
            detail: "completion response missing choices[0].message.content".to_string(),
        })?;

        Ok(parse_qa_pairs(&content))
    }
}
