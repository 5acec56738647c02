use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cipher::KeyCipher;
use crate::generation::BackendKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub generation: GenerationConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub transit: TransitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Backend id: `local`, `openai`, `anthropic`, or `mistral`.
    pub backend: String,
    /// Model name for vendor backends (e.g. `gpt-4o-mini`).
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override for vendor APIs. Defaults to the vendor's
    /// public endpoint.
    #[serde(default)]
    pub url: Option<String>,
    /// Path to the local generator executable (required for `local`).
    #[serde(default)]
    pub command: Option<PathBuf>,
    /// API key for vendor backends, encrypted with the transit secret.
    /// Falls back to the vendor's environment variable when absent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Provider id: `command` (subprocess) or `openai`.
    pub provider: String,
    /// Path to the embedding executable (required for `command`).
    #[serde(default)]
    pub command: Option<PathBuf>,
    /// Model name (required for `openai`).
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override for the OpenAI embeddings API.
    #[serde(default)]
    pub url: Option<String>,
    /// Vector dimensionality. All vectors compared in one retrieval call
    /// must share this dimensionality.
    pub dims: usize,
    /// API key, encrypted with the transit secret. Falls back to
    /// `OPENAI_API_KEY` when absent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Worker bound for the lazy per-item embedding fan-out at query time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Embed generated items during ingestion (best-effort). Items that
    /// fail stay unembedded and are computed lazily at first query.
    #[serde(default = "default_inline_items")]
    pub inline_items: bool,
}

fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}
fn default_concurrency() -> usize {
    4
}
fn default_inline_items() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Minimum document-level cosine similarity required to answer.
    /// Queries scoring below this are declined.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Canned response returned for declined queries.
    #[serde(default = "default_decline_message")]
    pub decline_message: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            decline_message: default_decline_message(),
        }
    }
}

fn default_threshold() -> f32 {
    0.70
}
fn default_decline_message() -> String {
    "Sorry, I could not find a relevant answer to that question.".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Shared secret for the credential transit cipher. Transport obfuscation
/// only; see [`crate::cipher`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TransitConfig {
    #[serde(default)]
    pub secret: Option<String>,
}

impl GenerationConfig {
    pub fn backend_kind(&self) -> Result<BackendKind> {
        BackendKind::parse(&self.backend).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown generation backend: '{}'. Must be local, openai, anthropic, or mistral.",
                self.backend
            )
        })
    }
}

impl Config {
    /// Resolve the generation credential: decrypt the configured transit
    /// token, or fall back to the vendor's environment variable.
    ///
    /// Returns `None` for the local backend and when nothing is configured;
    /// the missing-credential failure belongs to the generation layer, not
    /// config loading.
    pub fn generation_credential(&self) -> Result<Option<String>> {
        let kind = self.generation_backend_or_default();
        resolve_credential(
            self.generation.api_key.as_deref(),
            self.transit.secret.as_deref(),
            kind.env_var(),
        )
    }

    /// Resolve the embedding credential (transit token or `OPENAI_API_KEY`).
    pub fn embedding_credential(&self) -> Result<Option<String>> {
        resolve_credential(
            self.embedding.api_key.as_deref(),
            self.transit.secret.as_deref(),
            Some("OPENAI_API_KEY"),
        )
    }

    fn generation_backend_or_default(&self) -> BackendKind {
        BackendKind::parse(&self.generation.backend).unwrap_or(BackendKind::Local)
    }
}

fn resolve_credential(
    encrypted: Option<&str>,
    secret: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<String>> {
    if let Some(token) = encrypted {
        let secret =
            secret.ok_or_else(|| anyhow::anyhow!("transit.secret required to decrypt api_key"))?;
        let cipher = KeyCipher::new(secret.as_bytes());
        let plain = cipher
            .decrypt(token)
            .context("Failed to decrypt api_key with transit.secret")?;
        return Ok(Some(plain));
    }
    if let Some(var) = env_var {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate generation
    let kind = config.generation.backend_kind()?;
    match kind {
        BackendKind::Local => {
            if config.generation.command.is_none() {
                anyhow::bail!("generation.command required for the local backend");
            }
        }
        _ => {
            if config.generation.model.is_none() {
                anyhow::bail!(
                    "generation.model must be specified for backend '{}'",
                    config.generation.backend
                );
            }
        }
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "command" => {
            if config.embedding.command.is_none() {
                anyhow::bail!("embedding.command required for the command provider");
            }
        }
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified for the openai provider");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be command or openai.",
            other
        ),
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.concurrency == 0 {
        anyhow::bail!("embedding.concurrency must be >= 1");
    }

    // Validate retrieval
    if !(-1.0..=1.0).contains(&config.retrieval.threshold) {
        anyhow::bail!("retrieval.threshold must be in [-1.0, 1.0]");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("askdoc.toml");
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    const VALID: &str = r#"
[db]
path = "data/askdoc.sqlite"

[generation]
backend = "local"
command = "/usr/local/bin/qagen"

[embedding]
provider = "command"
command = "/usr/local/bin/embed"
dims = 384

[server]
bind = "127.0.0.1:7411"
"#;

    #[test]
    fn loads_valid_config_with_defaults() {
        let (_dir, path) = write_config(VALID);
        let config = load_config(&path).unwrap();
        assert!((config.retrieval.threshold - 0.70).abs() < 1e-6);
        assert!(config.embedding.inline_items);
        assert_eq!(config.embedding.concurrency, 4);
        assert_eq!(config.generation.timeout_secs, 120);
    }

    #[test]
    fn rejects_unknown_backend() {
        let body = VALID.replace("backend = \"local\"", "backend = \"vendor-x\"");
        let (_dir, path) = write_config(&body);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_vendor_backend_without_model() {
        let body = VALID.replace("backend = \"local\"", "backend = \"openai\"");
        let (_dir, path) = write_config(&body);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_zero_dims() {
        let body = VALID.replace("dims = 384", "dims = 0");
        let (_dir, path) = write_config(&body);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let body = format!("{VALID}\n[retrieval]\nthreshold = 1.5\n");
        let (_dir, path) = write_config(&body);
        assert!(load_config(&path).is_err());
    }
}
