//! OpenAI chat-completion generation backend.
//!
//! Credential probe: `GET /v1/models`. Generation: `POST /v1/chat/completions`
//! with the shared Q&A system prompt, parsed via
//! [`parse_qa_pairs`](super::parse_qa_pairs). HTTP failures carry the status
//! and vendor name; there is no retry at this layer.

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

pub struct OpenAiBackend {
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for openai backend"))?;
        Ok(Self {
            model,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn client(&self) -> Result<reqwest::Client, EngineError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EngineError::Generation {
                backend: BackendKind::OpenAi,
                detail: format!("failed to build HTTP client: {}", e),
            })
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    async fn validate_credential(&self, credential: &str) -> Result<(), EngineError> {
        let client = self.client()?;
        let resp = client
            .get(format!("{}/v1/models", self.base_url))
            .header("Authorization", format!("Bearer {}", credential))
            .send()
            .await
            .map_err(|e| EngineError::InvalidCredential {
                backend: BackendKind::OpenAi,
                detail: format!("probe failed: {}", e),
            })?;

        if !resp.status().is_success() {
            return Err(EngineError::InvalidCredential {
                backend: BackendKind::OpenAi,
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
                backend: BackendKind::OpenAi,
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(EngineError::Generation {
                backend: BackendKind::OpenAi,
                detail: format!("HTTP {}: {}", status, body_text),
            });
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| EngineError::Generation {
            backend: BackendKind::OpenAi,
            detail: format!("invalid completion response: {}", e),
        })?;

        let content = chat_completion_content(&json).ok_or_else(|| EngineError::Generation {
            backend: BackendKind::OpenAi,
            detail: "completion response missing choices[0].message.content".to_string(),
        })?;

        Ok(parse_qa_pairs(&content))
    }
}
