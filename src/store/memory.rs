//! In-memory [`Store`] implementation for tests.
//!
//! Uses `Vec`s behind `std::sync::RwLock` for thread safety. Lock sections
//! are short and never held across awaits.

use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Document, QaItem};

use super::Store;

/// In-memory store for testing.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<Vec<Document>>,
    items: RwLock<Vec<QaItem>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents (test assertions).
    pub fn document_count(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    /// Number of stored Q&A items (test assertions).
    pub fn item_count(&self) -> usize {
        self.items.read().unwrap().len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_document_with_items(&self, doc: &Document, items: &[QaItem]) -> Result<()> {
        {
            let docs = self.docs.read().unwrap();
            if docs.iter().any(|d| d.id == doc.id) {
                bail!("duplicate document id: {}", doc.id);
            }
        }
        self.docs.write().unwrap().push(doc.clone());
        self.items.write().unwrap().extend(items.iter().cloned());
        Ok(())
    }

    async fn create_qa_items(&self, items: &[QaItem]) -> Result<()> {
        self.items.write().unwrap().extend(items.iter().cloned());
        Ok(())
    }

    async fn documents_by_project(&self, project_id: &str) -> Result<Vec<Document>> {
        Ok(self
            .docs
            .read()
            .unwrap()
            .iter()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn qa_items_by_document(&self, document_id: &str) -> Result<Vec<QaItem>> {
        Ok(self
            .items
            .read()
            .unwrap()
            .iter()
            .filter(|i| i.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn update_qa_item_embedding(&self, item_id: &str, vector: &[f32]) -> Result<()> {
        let mut items = self.items.write().unwrap();
        match items.iter_mut().find(|i| i.id == item_id) {
            Some(item) => {
                item.embedding = Some(vector.to_vec());
                Ok(())
            }
            None => bail!("qa item not found: {}", item_id),
        }
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self
            .docs
            .read()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }
}
