//! Storage abstraction for documents and Q&A items.
//!
//! The [`Store`] trait defines the persistence operations the ingestion
//! pipeline and retrieval engine need, enabling pluggable backends
//! (SQLite for production, in-memory for tests). The engine treats the
//! store as externally transactional: `create_document_with_items` is a
//! single logical batch, and the engine never holds partial state across
//! store calls.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, QaItem};

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_document_with_items`](Store::create_document_with_items) | Persist a document and its generated items atomically |
/// | [`create_qa_items`](Store::create_qa_items) | Insert manually authored items |
/// | [`documents_by_project`](Store::documents_by_project) | All documents of a project |
/// | [`qa_items_by_document`](Store::qa_items_by_document) | All items of a document |
/// | [`update_qa_item_embedding`](Store::update_qa_item_embedding) | Cache a lazily computed item vector |
/// | [`get_document`](Store::get_document) | Fetch one document by id |
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a document and its generated items as one logical batch.
    /// Either everything lands or nothing does.
    async fn create_document_with_items(&self, doc: &Document, items: &[QaItem]) -> Result<()>;

    /// Insert standalone Q&A items (the manual-authoring path).
    async fn create_qa_items(&self, items: &[QaItem]) -> Result<()>;

    /// All documents belonging to a project.
    async fn documents_by_project(&self, project_id: &str) -> Result<Vec<Document>>;

    /// All Q&A items belonging to a document.
    async fn qa_items_by_document(&self, document_id: &str) -> Result<Vec<QaItem>>;

    /// Write back a lazily computed embedding for an item.
    async fn update_qa_item_embedding(&self, item_id: &str, vector: &[f32]) -> Result<()>;

    /// Fetch one document by id.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;
}
