//! SQLite [`Store`] implementation.
//!
//! Vectors are stored as little-endian f32 BLOBs (see
//! [`crate::embedding::vec_to_blob`]). The document/items batch insert runs
//! in one transaction so ingestion stays all-or-nothing.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Document, ProcessingStatus, QaItem};

use super::Store;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let status: String = row.get("status");
    let status = ProcessingStatus::parse(&status)
        .ok_or_else(|| anyhow::anyhow!("unknown document status: {}", status))?;
    let embedding: Option<Vec<u8>> = row.get("embedding");
    Ok(Document {
        id: row.get("id"),
        project_id: row.get("project_id"),
        filename: row.get("filename"),
        text: row.get("text"),
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        status,
        created_at: row.get("created_at"),
    })
}

fn row_to_qa_item(row: &sqlx::sqlite::SqliteRow) -> QaItem {
    let embedding: Option<Vec<u8>> = row.get("embedding");
    QaItem {
        id: row.get("id"),
        project_id: row.get("project_id"),
        document_id: row.get("document_id"),
        question: row.get("question"),
        answer: row.get("answer"),
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        generated: row.get("generated"),
        created_at: row.get("created_at"),
    }
}

async fn insert_qa_item<'e, E>(executor: E, item: &QaItem) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO qa_items (id, project_id, document_id, question, answer, embedding, generated, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.id)
    .bind(&item.project_id)
    .bind(&item.document_id)
    .bind(&item.question)
    .bind(&item.answer)
    .bind(item.embedding.as_deref().map(vec_to_blob))
    .bind(item.generated)
    .bind(item.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_document_with_items(&self, doc: &Document, items: &[QaItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, project_id, filename, text, embedding, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.project_id)
        .bind(&doc.filename)
        .bind(&doc.text)
        .bind(doc.embedding.as_deref().map(vec_to_blob))
        .bind(doc.status.as_str())
        .bind(doc.created_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            insert_qa_item(&mut *tx, item).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_qa_items(&self, items: &[QaItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            insert_qa_item(&mut *tx, item).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn documents_by_project(&self, project_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, filename, text, embedding, status, created_at
            FROM documents
            WHERE project_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn qa_items_by_document(&self, document_id: &str) -> Result<Vec<QaItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, document_id, question, answer, embedding, generated, created_at
            FROM qa_items
            WHERE document_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_qa_item).collect())
    }

    async fn update_qa_item_embedding(&self, item_id: &str, vector: &[f32]) -> Result<()> {
        sqlx::query("UPDATE qa_items SET embedding = ? WHERE id = ?")
            .bind(vec_to_blob(vector))
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, filename, text, embedding, status, created_at
            FROM documents
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }
}
