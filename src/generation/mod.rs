//! Question/answer generation backends.
//!
//! Defines the [`GenerationBackend`] trait and concrete implementations:
//! - **[`LocalBackend`]** — runs an out-of-process generator and parses its
//!   JSON output; no credential, no network.
//! - **[`OpenAiBackend`]**, **[`AnthropicBackend`]**, **[`MistralBackend`]**
//!   — vendor chat-completion adapters sharing the same prompt and the same
//!   `Q:`/`A:` response parser.
//!
//! Backends are selected by [`BackendKind`] and constructed through
//! [`create_backend`]; adding a backend means adding an enum variant and an
//! adapter file, while shared orchestration ([`generate_pairs`]) never
//! changes.
//!
//! # Orchestration policy
//!
//! [`generate_pairs`] enforces, in order:
//! 1. a non-blank context hint (fail `MissingContext` before any subprocess
//!    or network call),
//! 2. for vendor backends, a present credential and a successful probe call
//!    (fail `InvalidCredential` before any completion call is issued, so a
//!    doomed request never incurs vendor generation cost),
//! 3. a non-empty result (fail `EmptyGeneration` rather than silently
//!    returning zero pairs).
//!
//! There is no retry at this layer; retrying is the caller's decision.

mod anthropic;
mod local;
mod mistral;
mod openai;

pub use anthropic::AnthropicBackend;
pub use local::LocalBackend;
pub use mistral::MistralBackend;
pub use openai::OpenAiBackend;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::EngineError;
use crate::models::QaPair;

/// The available generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    OpenAi,
    Anthropic,
    Mistral,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(BackendKind::Local),
            "openai" => Some(BackendKind::OpenAi),
            "anthropic" => Some(BackendKind::Anthropic),
            "mistral" => Some(BackendKind::Mistral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::OpenAi => "openai",
            BackendKind::Anthropic => "anthropic",
            BackendKind::Mistral => "mistral",
        }
    }

    /// Environment variable consulted when no transit-encrypted key is
    /// configured.
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            BackendKind::Local => None,
            BackendKind::OpenAi => Some("OPENAI_API_KEY"),
            BackendKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            BackendKind::Mistral => Some("MISTRAL_API_KEY"),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral generation input. Never persisted; the credential is dropped
/// when the request goes out of scope.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub document_text: String,
    pub context_hint: String,
    pub credential: Option<String>,
}

/// A strategy for deriving question/answer pairs from document text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether this backend needs an API credential. Vendor backends do;
    /// the local subprocess does not.
    fn requires_credential(&self) -> bool {
        true
    }

    /// Cheap probe verifying the credential is usable (e.g. a models-list
    /// call). Must not incur generation cost.
    async fn validate_credential(&self, credential: &str) -> Result<(), EngineError>;

    /// Produce question/answer pairs. May return an empty list; the empty
    /// case is turned into `EmptyGeneration` by [`generate_pairs`].
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<QaPair>, EngineError>;
}

/// Generate Q&A pairs through a backend, enforcing the shared policy
/// (context hint, credential probe, non-empty result).
pub async fn generate_pairs(
    backend: &dyn GenerationBackend,
    request: &GenerationRequest,
) -> Result<Vec<QaPair>, EngineError> {
    if request.context_hint.trim().is_empty() {
        return Err(EngineError::MissingContext);
    }

    if backend.requires_credential() {
        let credential = request
            .credential
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| EngineError::InvalidCredential {
                backend: backend.kind(),
                detail: "no credential supplied".to_string(),
            })?;
        backend.validate_credential(credential).await?;
    }

    let pairs = backend.generate(request).await?;
    if pairs.is_empty() {
        return Err(EngineError::EmptyGeneration);
    }
    Ok(pairs)
}

/// Create the configured [`GenerationBackend`].
pub fn create_backend(config: &GenerationConfig) -> Result<Box<dyn GenerationBackend>> {
    match config.backend_kind()? {
        BackendKind::Local => Ok(Box::new(LocalBackend::new(config)?)),
        BackendKind::OpenAi => Ok(Box::new(OpenAiBackend::new(config)?)),
        BackendKind::Anthropic => Ok(Box::new(AnthropicBackend::new(config)?)),
        BackendKind::Mistral => Ok(Box::new(MistralBackend::new(config)?)),
    }
}

/// System prompt shared by all vendor backends.
pub(crate) fn qa_system_prompt(context_hint: &str) -> String {
    format!(
        "You are building a knowledge base from a document. Focus on: {}.\n\
         Read the document the user provides and write natural, conversational \
         question/answer pairs a reader might actually ask, grounded in the \
         document and the focus above. Format every pair exactly as:\n\
         Q: <question>\n\
         A: <answer>\n\
         Do not number the pairs or add commentary outside the Q:/A: lines.",
        context_hint.trim()
    )
}

/// Parse a vendor response into Q&A pairs using the `Q:`/`A:` marker
/// convention.
///
/// Each chunk starting with `Q:` is a candidate pair; it is accepted only
/// if a later `A:` marker follows with non-empty text on both sides.
/// Malformed chunks are silently dropped: a lossy parse, so one garbled
/// pair never fails the whole generation. Emptiness is judged by the
/// caller ([`generate_pairs`]).
pub fn parse_qa_pairs(raw: &str) -> Vec<QaPair> {
    let mut pairs = Vec::new();
    for chunk in raw.split("Q:").skip(1) {
        let Some((question, answer)) = chunk.split_once("A:") else {
            continue;
        };
        let question = question.trim();
        let answer = answer.trim();
        if question.is_empty() || answer.is_empty() {
            continue;
        }
        pairs.push(QaPair {
            question: question.to_string(),
            answer: answer.to_string(),
        });
    }
    pairs
}

/// Extract `choices[0].message.content` from an OpenAI-style chat
/// completion response (shared by the OpenAI and Mistral adapters).
pub(crate) fn chat_completion_content(json: &serde_json::Value) -> Option<String> {
    json.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_well_formed_pairs() {
        let raw = "Q: What is the return window?\nA: 30 days.\n\nQ: Who pays shipping?\nA: We do.";
        let pairs = parse_qa_pairs(raw);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].question, "What is the return window?");
        assert_eq!(pairs[0].answer, "30 days.");
        assert_eq!(pairs[1].question, "Who pays shipping?");
        assert_eq!(pairs[1].answer, "We do.");
    }

    #[test]
    fn chunk_without_answer_marker_is_dropped() {
        let raw = "Q: Orphan question with no answer\n\nQ: Good one?\nA: Yes.";
        let pairs = parse_qa_pairs(raw);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].question, "Good one?");
    }

    #[test]
    fn preamble_before_first_marker_is_ignored() {
        let raw = "Here are your pairs:\n\nQ: One?\nA: Yes.";
        let pairs = parse_qa_pairs(raw);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn multiline_answers_survive() {
        let raw = "Q: How do I return an item?\nA: Pack it up.\nInclude the receipt.\nShip it back.";
        let pairs = parse_qa_pairs(raw);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].answer.contains("Include the receipt."));
    }

    #[test]
    fn empty_sides_are_dropped() {
        assert!(parse_qa_pairs("Q: A: ").is_empty());
        assert!(parse_qa_pairs("Q: question only\nA:").is_empty());
        assert!(parse_qa_pairs("Q:\nA: answer only").is_empty());
    }

    #[test]
    fn no_markers_yields_no_pairs() {
        assert!(parse_qa_pairs("The model ignored the format entirely.").is_empty());
        assert!(parse_qa_pairs("").is_empty());
    }

    #[test]
    fn backend_kind_roundtrip() {
        for kind in [
            BackendKind::Local,
            BackendKind::OpenAi,
            BackendKind::Anthropic,
            BackendKind::Mistral,
        ] {
            assert_eq!(BackendKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(BackendKind::parse("vendor-x"), None);
    }

    #[test]
    fn prompt_carries_the_hint() {
        let prompt = qa_system_prompt("returns policy");
        assert!(prompt.contains("returns policy"));
        assert!(prompt.contains("Q: <question>"));
    }
}
