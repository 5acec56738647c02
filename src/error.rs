//! Typed failure taxonomy for the ingestion and generation engine.
//!
//! Every failure an ingestion request can hit is one of these variants, so
//! callers (CLI, HTTP surface) can map each to a user-facing message without
//! string matching. Retrieval does not use this type: "no good match" is a
//! modeled outcome, not an error (see [`crate::retrieval::AnswerOutcome`]).

use thiserror::Error;

use crate::generation::BackendKind;

/// Errors produced by ingestion, generation, and embedding.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The context hint was missing or blank. Raised before any subprocess
    /// or network call is made.
    #[error("a context hint is required to generate questions")]
    MissingContext,

    /// Text extraction produced nothing usable.
    #[error("no extractable text: {detail}")]
    NoExtractableText { detail: String },

    /// The generation backend failed (subprocess exit, HTTP error, bad
    /// output). `detail` carries the vendor status line or stderr summary.
    #[error("generation failed ({backend}): {detail}")]
    Generation {
        backend: BackendKind,
        detail: String,
    },

    /// A vendor credential was missing, rejected by the probe endpoint, or
    /// unreachable. Raised before any completion call is issued.
    #[error("credential rejected by {backend}: {detail}")]
    InvalidCredential {
        backend: BackendKind,
        detail: String,
    },

    /// Generation succeeded but produced zero usable question/answer pairs.
    /// Callers never receive a successful-but-empty result silently.
    #[error("generation produced no usable question/answer pairs")]
    EmptyGeneration,

    /// The embedding provider failed (subprocess exit, timeout, malformed
    /// output, exhausted retries).
    #[error("embedding failed: {detail}")]
    Embedding { detail: String },

    /// The store rejected the write. By policy the caller must not retry
    /// generation after this; the vendor cost was already paid.
    #[error("persistence failed: {detail}")]
    Persistence { detail: String },
}
