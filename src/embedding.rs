//! Embedding provider abstraction and vector math.
//!
//! Defines the [`Embedder`] trait and two concrete providers:
//! - **[`CommandEmbedder`]** — invokes a configured subprocess with
//!   `{text, credential?, is_query}` JSON on stdin and reads a JSON array
//!   of floats from stdout.
//! - **[`OpenAiEmbedder`]** — calls the OpenAI embeddings API with retry
//!   and backoff.
//!
//! Also provides the vector utilities used by the retrieval engine:
//! - [`cosine_similarity`] — directional closeness in `[-1, 1]`
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 BLOB codecs for
//!   SQLite storage
//!
//! Vectors are opaque values: providers make no normalization guarantee, so
//! consumers must not assume unit length and must compare vectors only via
//! [`cosine_similarity`]. Two vectors are only comparable when produced by
//! the same provider/model (same dimensionality).
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::config::EmbeddingConfig;
use crate::error::EngineError;

/// Similarity assigned to vectors that cannot meaningfully score: the
/// lowest possible cosine value, so they can never win a comparison and
/// never produce `NaN`.
pub const SIMILARITY_FLOOR: f32 = -1.0;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text. `is_query` distinguishes query-time embedding
    /// from document/item embedding for providers that care.
    ///
    /// Implementations may assume `text` is non-empty; the public entry
    /// point [`embed_text`] enforces that.
    async fn embed(
        &self,
        text: &str,
        credential: Option<&str>,
        is_query: bool,
    ) -> Result<Vec<f32>, EngineError>;

    /// Expected vector dimensionality.
    fn dims(&self) -> usize;
}

/// Embed a text using the given provider.
///
/// This is the engine's single entry point for embedding: it validates that
/// the text is non-empty after trimming, then delegates. Empty input fails
/// with [`EngineError::Embedding`] before any subprocess or network call.
pub async fn embed_text<'a>(
    embedder: &'a dyn Embedder,
    text: &'a str,
    credential: Option<&'a str>,
    is_query: bool,
) -> Result<Vec<f32>, EngineError> {
    if text.trim().is_empty() {
        return Err(EngineError::Embedding {
            detail: "cannot embed empty text".to_string(),
        });
    }
    embedder.embed(text, credential, is_query).await
}

/// Create the appropriate [`Embedder`] based on configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "command" => Ok(Box::new(CommandEmbedder::new(config)?)),
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Command (subprocess) provider ============

/// Embedding provider backed by an out-of-process executable.
///
/// The subprocess receives `{"text": ..., "credential": ..., "is_query": ...}`
/// as JSON on stdin and must emit a JSON array of floats (or an array of
/// arrays, in which case the first row is taken) on stdout. Non-zero exit,
/// timeout, or malformed output fail with [`EngineError::Embedding`].
pub struct CommandEmbedder {
    command: std::path::PathBuf,
    dims: usize,
    timeout: Duration,
}

impl CommandEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let command = config
            .command
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.command required for command provider"))?;
        Ok(Self {
            command,
            dims: config.dims,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl Embedder for CommandEmbedder {
    async fn embed(
        &self,
        text: &str,
        credential: Option<&str>,
        is_query: bool,
    ) -> Result<Vec<f32>, EngineError> {
        let input = serde_json::json!({
            "text": text,
            "credential": credential,
            "is_query": is_query,
        });

        let mut child = tokio::process::Command::new(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A cancelled or timed-out request must not leave the
            // subprocess running.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Embedding {
                detail: format!("failed to spawn {}: {}", self.command.display(), e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.to_string().as_bytes())
                .await
                .map_err(|e| EngineError::Embedding {
                    detail: format!("failed to write subprocess stdin: {}", e),
                })?;
            // Close stdin so the subprocess sees EOF.
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| EngineError::Embedding {
                detail: format!("embedding subprocess timed out after {:?}", self.timeout),
            })?
            .map_err(|e| EngineError::Embedding {
                detail: format!("embedding subprocess failed: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Embedding {
                detail: format!(
                    "embedding subprocess exited with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_embedding_output(&stdout)
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Parse subprocess output: a JSON array of floats, or an array of arrays
/// (document-level batch shape) from which the first row is taken.
fn parse_embedding_output(raw: &str) -> Result<Vec<f32>, EngineError> {
    let json: serde_json::Value =
        serde_json::from_str(raw.trim()).map_err(|e| EngineError::Embedding {
            detail: format!("embedding subprocess emitted invalid JSON: {}", e),
        })?;

    let row = match json.as_array() {
        Some(arr) if arr.first().map(|v| v.is_array()).unwrap_or(false) => arr
            .first()
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
        Some(arr) => arr.clone(),
        None => {
            return Err(EngineError::Embedding {
                detail: "embedding subprocess output is not a JSON array".to_string(),
            })
        }
    };

    if row.is_empty() {
        return Err(EngineError::Embedding {
            detail: "embedding subprocess emitted an empty vector".to_string(),
        });
    }

    let mut vec = Vec::with_capacity(row.len());
    for value in &row {
        match value.as_f64() {
            Some(f) => vec.push(f as f32),
            None => {
                return Err(EngineError::Embedding {
                    detail: "embedding subprocess emitted a non-numeric element".to_string(),
                })
            }
        }
    }
    Ok(vec)
}

// ============ OpenAI provider ============

/// Embedding provider using the OpenAI embeddings API.
///
/// Calls `POST {base_url}/v1/embeddings` with the configured model. The
/// credential is passed per request (decrypted transit token or
/// environment fallback; see [`crate::config::Config::embedding_credential`]).
pub struct OpenAiEmbedder {
    model: String,
    base_url: String,
    dims: usize,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for openai provider"))?;
        Ok(Self {
            model,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            dims: config.dims,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(
        &self,
        text: &str,
        credential: Option<&str>,
        _is_query: bool,
    ) -> Result<Vec<f32>, EngineError> {
        let api_key = credential.ok_or_else(|| EngineError::Embedding {
            detail: "openai embedding provider requires a credential".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EngineError::Embedding {
                detail: format!("failed to build HTTP client: {}", e),
            })?;

        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/v1/embeddings", self.base_url))
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value =
                            response.json().await.map_err(|e| EngineError::Embedding {
                                detail: format!("invalid embeddings response: {}", e),
                            })?;
                        return parse_openai_embedding(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(format!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EngineError::Embedding {
                        detail: format!("OpenAI API error {}: {}", status, body_text),
                    });
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(EngineError::Embedding {
            detail: last_err.unwrap_or_else(|| "embedding failed after retries".to_string()),
        })
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

fn parse_openai_embedding(json: &serde_json::Value) -> Result<Vec<f32>, EngineError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| EngineError::Embedding {
            detail: "invalid OpenAI response: missing data[0].embedding".to_string(),
        })?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Vector math ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// A zero-norm vector makes the quotient undefined; it scores
/// [`SIMILARITY_FLOOR`] so it can never win a comparison and never yields
/// `NaN`. Mismatched lengths also score the floor, but callers are
/// expected to reject mixed dimensionalities before scoring (see
/// [`crate::retrieval`]).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return SIMILARITY_FLOOR;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return SIMILARITY_FLOOR;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_is_symmetric() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-0.5, 4.0, 0.25];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn cosine_self_similarity_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector_scores_floor_not_nan() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&zero, &v);
        assert!(!sim.is_nan());
        assert_eq!(sim, SIMILARITY_FLOOR);
        assert_eq!(cosine_similarity(&zero, &zero), SIMILARITY_FLOOR);
    }

    #[test]
    fn cosine_mismatched_lengths_score_floor() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), SIMILARITY_FLOOR);
    }

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), vec.len() * 4);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn parse_flat_array() {
        let vec = parse_embedding_output("[0.1, 0.2, 0.3]").unwrap();
        assert_eq!(vec.len(), 3);
    }

    #[test]
    fn parse_nested_array_takes_first_row() {
        let vec = parse_embedding_output("[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        assert_eq!(vec, vec![1.0, 2.0]);
    }

    #[test]
    fn parse_rejects_non_array() {
        assert!(parse_embedding_output("{\"oops\": true}").is_err());
        assert!(parse_embedding_output("not json").is_err());
        assert!(parse_embedding_output("[]").is_err());
        assert!(parse_embedding_output("[1.0, \"two\"]").is_err());
    }
}
