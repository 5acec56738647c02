//! Anthropic messages-API generation backend.
//!
//! Credential probe: `GET /v1/models`. Generation: `POST /v1/messages` with
//! the shared Q&A prompt as the `system` field. Responses carry the text in
//! `content[0].text`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::EngineError;
use crate::models::QaPair;

use super::{parse_qa_pairs, qa_system_prompt, BackendKind, GenerationBackend, GenerationRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;

pub struct AnthropicBackend {
    model: String,
    base_url: String,
    timeout: Duration,
}

impl AnthropicBackend {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for anthropic backend"))?;
        Ok(Self {
            model,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn client(&self) -> Result<reqwest::Client, EngineError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EngineError::Generation {
                backend: BackendKind::Anthropic,
                detail: format!("failed to build HTTP client: {}", e),
            })
    }
}

#[async_trait]
impl GenerationBackend for AnthropicBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Anthropic
    }

    async fn validate_credential(&self, credential: &str) -> Result<(), EngineError> {
        let client = self.client()?;
        let resp = client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", credential)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .map_err(|e| EngineError::InvalidCredential {
                backend: BackendKind::Anthropic,
                detail: format!("probe failed: {}", e),
            })?;

        if !resp.status().is_success() {
            return Err(EngineError::InvalidCredential {
                backend: BackendKind::Anthropic,
                detail: format!("probe returned HTTP {}", resp.status()),
            });
        }
        Ok(())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<QaPair>, EngineError> {
        let credential = request.credential.as_deref().unwrap_or_default();
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": qa_system_prompt(&request.context_hint),
            "messages": [
                { "role": "user", "content": request.document_text },
            ],
        });

        let client = self.client()?;
        let resp = client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", credential)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Generation {
                backend: BackendKind::Anthropic,
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(EngineError::Generation {
                backend: BackendKind::Anthropic,
                detail: format!("HTTP {}: {}", status, body_text),
            });
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| EngineError::Generation {
            backend: BackendKind::Anthropic,
            detail: format!("invalid messages response: {}", e),
        })?;

        let content = json
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|block| block.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| EngineError::Generation {
                backend: BackendKind::Anthropic,
                detail: "messages response missing content[0].text".to_string(),
            })?;

        Ok(parse_qa_pairs(content))
    }
}
