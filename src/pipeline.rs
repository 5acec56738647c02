//! Ingestion pipeline orchestration.
//!
//! Coordinates the full ingestion flow: text extraction → Q&A generation →
//! document embedding → persistence. The pipeline is all-or-nothing: on
//! success exactly one document row and N item rows are created; on any
//! failure, zero rows.
//!
//! Per-item embeddings are best-effort during ingestion (bounded fan-out,
//! non-fatal); items that fail to embed are persisted without a vector and
//! picked up lazily at query time by the retrieval engine.

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::embedding::{embed_text, Embedder};
use crate::error::EngineError;
use crate::extract;
use crate::generation::{generate_pairs, GenerationBackend, GenerationRequest};
use crate::models::{Document, ProcessingStatus, QaItem};
use crate::store::Store;

/// Stages an ingestion request moves through, in order. Used for logging;
/// any stage can transition to `Failed` with the originating error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    TextExtracted,
    GenerationRequested,
    GenerationComplete,
    Embedding,
    Persisted,
}

impl IngestStage {
    fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Received => "received",
            IngestStage::TextExtracted => "text_extracted",
            IngestStage::GenerationRequested => "generation_requested",
            IngestStage::GenerationComplete => "generation_complete",
            IngestStage::Embedding => "embedding",
            IngestStage::Persisted => "persisted",
        }
    }
}

/// One ingestion request: a document plus the options that drive
/// generation.
#[derive(Debug, Clone)]
pub struct IngestionRequest {
    pub project_id: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub context_hint: String,
    pub credential: Option<String>,
}

/// Behavior knobs for the pipeline, taken from `[embedding]` config.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Embed generated items during ingestion (best-effort).
    pub inline_items: bool,
    /// Worker bound for the inline item-embedding fan-out.
    pub concurrency: usize,
    /// Credential for the embedding provider. Distinct from the generation
    /// credential on the request; the two may be different vendors.
    pub embedding_credential: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            inline_items: true,
            concurrency: 4,
            embedding_credential: None,
        }
    }
}

/// Result of a successful ingestion.
#[derive(Debug)]
pub struct IngestionReport {
    pub document_id: String,
    pub qa_count: usize,
    /// Items that received a vector inline; the rest embed lazily at
    /// query time.
    pub items_embedded: usize,
}

/// Run one ingestion request end to end.
///
/// Failure at any stage is terminal and persists nothing. A
/// [`EngineError::Persistence`] failure means generation cost was already
/// paid; callers must not retry generation in response.
pub async fn run_ingestion(
    store: &dyn Store,
    backend: &dyn GenerationBackend,
    embedder: &dyn Embedder,
    options: &PipelineOptions,
    request: IngestionRequest,
) -> Result<IngestionReport, EngineError> {
    log_stage(IngestStage::Received, &request.filename);

    // A blank hint fails before any collaborator is touched.
    if request.context_hint.trim().is_empty() {
        return Err(EngineError::MissingContext);
    }

    let text = extract::extract_text(&request.bytes, &request.content_type).map_err(|e| {
        EngineError::NoExtractableText {
            detail: e.to_string(),
        }
    })?;
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(EngineError::NoExtractableText {
            detail: "document is empty after extraction".to_string(),
        });
    }
    log_stage(IngestStage::TextExtracted, &request.filename);

    let gen_request = GenerationRequest {
        document_text: text.clone(),
        context_hint: request.context_hint.clone(),
        credential: request.credential.clone(),
    };
    log_stage(IngestStage::GenerationRequested, &request.filename);
    let pairs = generate_pairs(backend, &gen_request).await?;
    log_stage(IngestStage::GenerationComplete, &request.filename);

    // Whole-document embedding. Terminal on failure: no rows are persisted.
    log_stage(IngestStage::Embedding, &request.filename);
    let doc_vector = embed_text(
        embedder,
        &text,
        options.embedding_credential.as_deref(),
        false,
    )
    .await?;

    let now = chrono::Utc::now().timestamp();
    let document = Document {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: request.project_id.clone(),
        filename: request.filename.clone(),
        text,
        embedding: Some(doc_vector),
        status: ProcessingStatus::Completed,
        created_at: now,
    };

    let mut items: Vec<QaItem> = pairs
        .into_iter()
        .map(|pair| QaItem {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: request.project_id.clone(),
            document_id: document.id.clone(),
            question: pair.question,
            answer: pair.answer,
            embedding: None,
            generated: true,
            created_at: now,
        })
        .collect();

    let mut items_embedded = 0;
    if options.inline_items {
        items_embedded = embed_items_inline(embedder, options, &mut items).await;
    }

    store
        .create_document_with_items(&document, &items)
        .await
        .map_err(|e| EngineError::Persistence {
            detail: e.to_string(),
        })?;
    log_stage(IngestStage::Persisted, &request.filename);

    Ok(IngestionReport {
        document_id: document.id,
        qa_count: items.len(),
        items_embedded,
    })
}

/// Embed generated items with a bounded fan-out. Non-fatal: an item whose
/// embedding fails keeps `embedding = None` and is computed lazily at
/// first query.
async fn embed_items_inline(
    embedder: &dyn Embedder,
    options: &PipelineOptions,
    items: &mut [QaItem],
) -> usize {
    let credential = options.embedding_credential.as_deref();
    let results: Vec<(usize, Result<Vec<f32>, EngineError>)> =
        stream::iter(items.iter().enumerate().map(|(idx, item)| {
            let text = item.embedding_text();
            async move { (idx, embed_text(embedder, &text, credential, false).await) }
        }))
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    let mut embedded = 0;
    for (idx, result) in results {
        match result {
            Ok(vector) => {
                items[idx].embedding = Some(vector);
                embedded += 1;
            }
            Err(e) => {
                warn!(item = %items[idx].id, error = %e, "inline item embedding failed; deferring to query time");
            }
        }
    }
    embedded
}

fn log_stage(stage: IngestStage, filename: &str) {
    info!(stage = stage.as_str(), filename, "ingest");
}
