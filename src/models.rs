//! Core data models for the ingestion and retrieval engine.
//!
//! These types represent the documents and question/answer items that flow
//! through the pipeline and are persisted by the [`crate::store::Store`].

use serde::Serialize;

/// Processing state of an ingested document.
///
/// Transitions `Pending → Completed | Failed` exactly once. Because
/// ingestion is all-or-nothing, rows created by the pipeline reach the
/// store already `Completed`; the other states exist for externally
/// created rows and status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessingStatus::Pending),
            "completed" => Some(ProcessingStatus::Completed),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }
}

/// An ingested document with its whole-document embedding.
///
/// `text` is immutable once the row exists; the embedding is therefore
/// valid for the lifetime of the row and never invalidated.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub filename: String,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub status: ProcessingStatus,
    pub created_at: i64,
}

/// A question/answer item derived from (or manually added to) a document.
///
/// `embedding` may be `None` until lazily computed at query time:
/// machine-generated items are usually embedded inline during ingestion,
/// manually authored items start without a vector.
#[derive(Debug, Clone)]
pub struct QaItem {
    pub id: String,
    pub project_id: String,
    pub document_id: String,
    pub question: String,
    pub answer: String,
    pub embedding: Option<Vec<f32>>,
    /// `true` for machine-generated items, `false` for manually authored.
    pub generated: bool,
    pub created_at: i64,
}

impl QaItem {
    /// The text that gets embedded for this item: question and answer
    /// joined by a single space, so a query can match either side.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.question, self.answer)
    }
}

/// A question/answer pair as produced by a generation backend, before it
/// is assigned identity and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(ProcessingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProcessingStatus::parse("bogus"), None);
    }

    #[test]
    fn embedding_text_joins_question_and_answer() {
        let item = QaItem {
            id: "i1".into(),
            project_id: "p1".into(),
            document_id: "d1".into(),
            question: "What is the return window?".into(),
            answer: "30 days".into(),
            embedding: None,
            generated: true,
            created_at: 0,
        };
        assert_eq!(item.embedding_text(), "What is the return window? 30 days");
    }
}
