//! Query-time retrieval and answer selection.
//!
//! Given a chat query and a project, the engine embeds the query, finds the
//! most similar document, and returns the best-matching stored answer, or
//! a modeled decline. [`answer`] never returns an `Err`: every path is a
//! typed [`AnswerOutcome`], so callers can tell "system broken"
//! ([`AnswerOutcome::Failed`]) apart from "nothing relevant found"
//! ([`AnswerOutcome::NoConfidentMatch`] / [`AnswerOutcome::NoKnowledgeBase`]).
//!
//! # Selection policy
//!
//! 1. Embed the query; embedding failure is an infrastructure failure,
//!    never a fabricated answer.
//! 2. Score the query against every document of the project; the highest
//!    cosine similarity wins, ties broken by lowest document id. Zero-norm
//!    or absent vectors score the similarity floor (−1) and can never win.
//! 3. If the winning similarity is below the confidence threshold, decline
//!    with the canned message. This happens before any Q&A items are
//!    loaded, so a doomed query never pays for lazy item embedding.
//! 4. Items of the winning document lacking a cached vector are embedded
//!    now (`question + " " + answer`) with a bounded fan-out and written
//!    back to the store; an item that fails to embed is excluded from this
//!    request (logged, not fatal).
//! 5. The highest-scoring item's answer is returned; a document with no
//!    scorable items falls back to its raw text.
//!
//! Dropping the returned future cancels outstanding embedding calls; no
//! partial answer is produced for a cancelled request.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::embedding::{cosine_similarity, embed_text, Embedder, SIMILARITY_FLOOR};
use crate::error::EngineError;
use crate::models::{Document, QaItem};
use crate::store::Store;

/// Infrastructure failure during retrieval. Distinct from "no good match",
/// which is a normal outcome.
#[derive(Debug)]
pub enum RetrievalFailure {
    /// Query or item embedding infrastructure failed.
    Embedding { detail: String },
    /// The store could not be read.
    Store { detail: String },
    /// A stored vector's dimensionality differs from the query vector's.
    /// Mixing providers/models within one project is a contract violation
    /// and is never silently scored.
    DimensionMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for RetrievalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalFailure::Embedding { detail } => write!(f, "embedding failed: {}", detail),
            RetrievalFailure::Store { detail } => write!(f, "store read failed: {}", detail),
            RetrievalFailure::DimensionMismatch { expected, actual } => write!(
                f,
                "embedding dimensionality mismatch: query has {} dims, stored vector has {}",
                expected, actual
            ),
        }
    }
}

/// Where an answer came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerSource {
    /// A stored question/answer item.
    QaItem { item_id: String },
    /// Fallback: the document's raw text (document had no scorable items).
    DocumentText,
}

/// The result of answering a query. All outcomes are modeled; `answer`
/// never panics or errors for a well-formed non-empty query.
#[derive(Debug)]
pub enum AnswerOutcome {
    Answered {
        answer: String,
        document_id: String,
        similarity: f32,
        source: AnswerSource,
    },
    /// The project has no documents at all.
    NoKnowledgeBase,
    /// The best document similarity fell below the confidence threshold.
    NoConfidentMatch { message: String },
    /// Genuine infrastructure failure.
    Failed(RetrievalFailure),
}

/// Retrieval knobs, taken from `[retrieval]` and `[embedding]` config.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Minimum document-level similarity required to answer.
    pub threshold: f32,
    /// Canned response for declined queries.
    pub decline_message: String,
    /// Worker bound for the lazy item-embedding fan-out.
    pub concurrency: usize,
    /// Credential passed through to the embedding provider.
    pub credential: Option<String>,
}

/// Answer a chat query against a project's knowledge base.
pub async fn answer<'a>(
    store: &'a dyn Store,
    embedder: &'a dyn Embedder,
    options: &'a RetrievalOptions,
    query: &'a str,
    project_id: &'a str,
) -> AnswerOutcome {
    let query_vec =
        match embed_text(embedder, query, options.credential.as_deref(), true).await {
            Ok(v) => v,
            Err(e) => {
                return AnswerOutcome::Failed(RetrievalFailure::Embedding {
                    detail: e.to_string(),
                })
            }
        };

    let documents = match store.documents_by_project(project_id).await {
        Ok(d) => d,
        Err(e) => {
            return AnswerOutcome::Failed(RetrievalFailure::Store {
                detail: e.to_string(),
            })
        }
    };
    if documents.is_empty() {
        return AnswerOutcome::NoKnowledgeBase;
    }

    let (best_doc, best_sim) = match select_best_document(&query_vec, &documents) {
        Ok(best) => best,
        Err(failure) => return AnswerOutcome::Failed(failure),
    };

    if best_sim < options.threshold {
        return AnswerOutcome::NoConfidentMatch {
            message: options.decline_message.clone(),
        };
    }

    let items = match store.qa_items_by_document(&best_doc.id).await {
        Ok(items) => items,
        Err(e) => {
            return AnswerOutcome::Failed(RetrievalFailure::Store {
                detail: e.to_string(),
            })
        }
    };

    let lazy_vectors = materialize_missing_embeddings(store, embedder, options, &items).await;

    let mut best_item: Option<(&QaItem, f32)> = None;
    for item in &items {
        let vector = match &item.embedding {
            Some(v) => v,
            None => match lazy_vectors.get(&item.id) {
                Some(v) => v,
                // Failed to embed this request; excluded from scoring.
                None => continue,
            },
        };
        if vector.len() != query_vec.len() {
            return AnswerOutcome::Failed(RetrievalFailure::DimensionMismatch {
                expected: query_vec.len(),
                actual: vector.len(),
            });
        }
        let sim = cosine_similarity(&query_vec, vector);
        best_item = match best_item {
            None => Some((item, sim)),
            Some((current, current_sim)) => {
                if sim > current_sim || (sim == current_sim && item.id < current.id) {
                    Some((item, sim))
                } else {
                    Some((current, current_sim))
                }
            }
        };
    }

    match best_item {
        Some((item, sim)) => AnswerOutcome::Answered {
            answer: item.answer.clone(),
            document_id: best_doc.id.clone(),
            similarity: sim,
            source: AnswerSource::QaItem {
                item_id: item.id.clone(),
            },
        },
        None => AnswerOutcome::Answered {
            answer: best_doc.text.clone(),
            document_id: best_doc.id.clone(),
            similarity: best_sim,
            source: AnswerSource::DocumentText,
        },
    }
}

/// Score every document and pick the winner (max similarity, ties broken
/// by lowest id). Documents without a vector score the floor and can never
/// win; a dimensionality mismatch aborts the query.
fn select_best_document<'a>(
    query_vec: &[f32],
    documents: &'a [Document],
) -> Result<(&'a Document, f32), RetrievalFailure> {
    let mut best: Option<(&Document, f32)> = None;
    for doc in documents {
        let sim = match &doc.embedding {
            Some(vector) => {
                if vector.len() != query_vec.len() {
                    return Err(RetrievalFailure::DimensionMismatch {
                        expected: query_vec.len(),
                        actual: vector.len(),
                    });
                }
                cosine_similarity(query_vec, vector)
            }
            None => SIMILARITY_FLOOR,
        };
        best = match best {
            None => Some((doc, sim)),
            Some((current, current_sim)) => {
                if sim > current_sim || (sim == current_sim && doc.id < current.id) {
                    Some((doc, sim))
                } else {
                    Some((current, current_sim))
                }
            }
        };
    }
    best.ok_or(RetrievalFailure::Store {
        detail: "no documents to score".to_string(),
    })
}

/// Embed items that lack a cached vector, bounded by `options.concurrency`,
/// and write successes back to the store. An embedding failure excludes
/// that item for this request; a cache-write failure still serves the
/// vector from memory. Both are logged, neither is fatal.
async fn materialize_missing_embeddings<'a>(
    store: &'a dyn Store,
    embedder: &'a dyn Embedder,
    options: &'a RetrievalOptions,
    items: &'a [QaItem],
) -> HashMap<String, Vec<f32>> {
    let missing: Vec<&QaItem> = items.iter().filter(|i| i.embedding.is_none()).collect();
    if missing.is_empty() {
        return HashMap::new();
    }

    let credential = options.credential.as_deref();
    let jobs: Vec<(String, String)> = missing
        .into_iter()
        .map(|item| (item.id.clone(), item.embedding_text()))
        .collect();
    let results: Vec<(String, Result<Vec<f32>, EngineError>)> =
        stream::iter(jobs.into_iter().map(|(id, text)| async move {
            (id, embed_text(embedder, &text, credential, false).await)
        }))
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    let mut vectors = HashMap::new();
    for (item_id, result) in results {
        match result {
            Ok(vector) => {
                if let Err(e) = store.update_qa_item_embedding(&item_id, &vector).await {
                    warn!(item = %item_id, error = %e, "failed to cache item embedding");
                }
                vectors.insert(item_id, vector);
            }
            Err(e) => {
                warn!(item = %item_id, error = %e, "item embedding failed; excluded from this request");
            }
        }
    }
    vectors
}
