//! Document queries and derived-status filtering
//!
//! The derived properties (`has_linesegments`, `is_transcribed`,
//! `is_verified`) are not stored. List filters load every matching document
//! with its segment statuses and filter in memory, then paginate.

use crate::db::models::{Document, DocumentStatus, SegmentStatus, VerifiedState};
use crate::Result;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

const DOCUMENT_SELECT: &str = "SELECT d.id, d.file, d.notebook_id, d.page, n.name AS notebook_name
     FROM documents d LEFT JOIN notebooks n ON n.id = d.notebook_id";

/// Document list filters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    pub has_linesegments: Option<bool>,
    pub is_transcribed: Option<bool>,
    pub verification: Option<VerifiedState>,
    pub notebook_id: Option<i64>,
}

impl DocumentFilter {
    /// Apply the derived-status filters to one document
    pub fn matches(&self, status: &DocumentStatus) -> bool {
        if let Some(want) = self.has_linesegments {
            if status.has_linesegments() != want {
                return false;
            }
        }
        if let Some(want) = self.is_transcribed {
            if status.is_transcribed() != want {
                return false;
            }
        }
        if let Some(state) = self.verification {
            if !status.matches_verification(state) {
                return false;
            }
        }
        true
    }
}

/// A document with its derived status
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub document: Document,
    pub status: DocumentStatus,
}

pub async fn insert_document(
    pool: &SqlitePool,
    file: Option<&str>,
    notebook_id: Option<i64>,
    page: Option<i64>,
) -> Result<i64> {
    let id = sqlx::query("INSERT INTO documents (file, notebook_id, page) VALUES (?, ?, ?)")
        .bind(file)
        .bind(notebook_id)
        .bind(page)
        .execute(pool)
        .await?
        .last_insert_rowid();
    Ok(id)
}

pub async fn update_document(
    pool: &SqlitePool,
    id: i64,
    notebook_id: Option<i64>,
    page: Option<i64>,
) -> Result<bool> {
    let affected = sqlx::query("UPDATE documents SET notebook_id = ?, page = ? WHERE id = ?")
        .bind(notebook_id)
        .bind(page)
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

pub async fn get_document(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
    let sql = format!("{} WHERE d.id = ?", DOCUMENT_SELECT);
    let doc = sqlx::query_as::<_, Document>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(doc)
}

pub async fn get_documents(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<Document>> {
    let mut docs = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(doc) = get_document(pool, *id).await? {
            docs.push(doc);
        }
    }
    Ok(docs)
}

/// Documents of one notebook, ordered by page
pub async fn documents_for_notebook(pool: &SqlitePool, notebook_id: i64) -> Result<Vec<Document>> {
    let sql = format!(
        "{} WHERE d.notebook_id = ? ORDER BY d.page, d.id",
        DOCUMENT_SELECT
    );
    let docs = sqlx::query_as::<_, Document>(&sql)
        .bind(notebook_id)
        .fetch_all(pool)
        .await?;
    Ok(docs)
}

/// Segment statuses of one document
pub async fn document_status(pool: &SqlitePool, document_id: i64) -> Result<DocumentStatus> {
    let rows = sqlx::query(
        "SELECT transcribed, verification FROM line_segments WHERE document_id = ?",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    Ok(DocumentStatus::new(rows.iter().map(row_status).collect()))
}

fn row_status(row: &sqlx::sqlite::SqliteRow) -> SegmentStatus {
    SegmentStatus {
        transcribed: row.get::<bool, _>("transcribed"),
        verification: VerifiedState::from_i64(row.get::<i64, _>("verification"))
            .unwrap_or(VerifiedState::Unchecked),
    }
}

/// All documents matching `filter`, in id order, with derived status
pub async fn filtered_documents(pool: &SqlitePool, filter: &DocumentFilter) -> Result<Vec<DocumentRow>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(DOCUMENT_SELECT);
    if let Some(notebook_id) = filter.notebook_id {
        qb.push(" WHERE d.notebook_id = ").push_bind(notebook_id);
    }
    qb.push(" ORDER BY d.id");

    let docs = qb.build_query_as::<Document>().fetch_all(pool).await?;

    let status_rows = sqlx::query("SELECT document_id, transcribed, verification FROM line_segments")
        .fetch_all(pool)
        .await?;
    let mut statuses: HashMap<i64, Vec<SegmentStatus>> = HashMap::new();
    for row in &status_rows {
        statuses
            .entry(row.get::<i64, _>("document_id"))
            .or_default()
            .push(row_status(row));
    }

    Ok(docs
        .into_iter()
        .map(|document| {
            let status = DocumentStatus::new(statuses.remove(&document.id).unwrap_or_default());
            DocumentRow { document, status }
        })
        .filter(|row| filter.matches(&row.status))
        .collect())
}

pub async fn delete_document(pool: &SqlitePool, id: i64) -> Result<bool> {
    let affected = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(affected > 0)
}
