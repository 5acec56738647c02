//! Local out-of-process generation backend.
//!
//! Invokes a configured executable with the document text and context hint
//! as arguments and reads a JSON array of `{question, answer}` objects from
//! its stdout. No credential, no network.

use std::process::Stdio;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GenerationConfig;
use crate::error::EngineError;
use crate::models::QaPair;

use super::{BackendKind, GenerationBackend, GenerationRequest};

pub struct LocalBackend {
    command: std::path::PathBuf,
    timeout: Duration,
}

#[derive(Deserialize)]
struct LocalPair {
    question: String,
    answer: String,
}

impl LocalBackend {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let command = config
            .command
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.command required for local backend"))?;
        Ok(Self {
            command,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn failure(&self, detail: impl Into<String>) -> EngineError {
        EngineError::Generation {
            backend: BackendKind::Local,
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl GenerationBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn requires_credential(&self) -> bool {
        false
    }

    async fn validate_credential(&self, _credential: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<QaPair>, EngineError> {
        let child = tokio::process::Command::new(&self.command)
            .arg(&request.document_text)
            .arg(&request.context_hint)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A cancelled or timed-out request must not leave the
            // generator running.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failure(format!("failed to spawn {}: {}", self.command.display(), e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| self.failure(format!("generator timed out after {:?}", self.timeout)))?
            .map_err(|e| self.failure(format!("generator failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!(
                "generator exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: Vec<LocalPair> = serde_json::from_str(stdout.trim())
            .map_err(|e| self.failure(format!("generator emitted invalid JSON: {}", e)))?;

        Ok(parsed
            .into_iter()
            .filter(|p| !p.question.trim().is_empty() && !p.answer.trim().is_empty())
            .map(|p| QaPair {
                question: p.question,
                answer: p.answer,
            })
            .collect())
    }
}
