//! Line segment queries
//!
//! `transcribed` is recomputed from the transcription on every write; no
//! query in this module sets it from caller input.

use crate::db::models::{is_transcribed_text, LineSegment, VerifiedState};
use crate::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashSet;

const SEGMENT_COLUMNS: &str = "s.id, s.file, s.line_order, s.document_id, s.transcription, s.transcribed, \
     s.verification, s.last_transcribed_by, s.last_verified_by";

/// Segment list filters; also the scope of "save and next"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentFilter {
    pub document_id: Option<i64>,
    pub transcribed: Option<bool>,
    pub verification: Option<VerifiedState>,
}

impl SegmentFilter {
    pub fn is_empty(&self) -> bool {
        self.document_id.is_none() && self.transcribed.is_none() && self.verification.is_none()
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(document_id) = self.document_id {
            qb.push(" AND s.document_id = ").push_bind(document_id);
        }
        if let Some(transcribed) = self.transcribed {
            qb.push(" AND s.transcribed = ").push_bind(transcribed);
        }
        if let Some(state) = self.verification {
            qb.push(" AND s.verification = ").push_bind(state.as_i64());
        }
    }
}

/// Sort keys of the segment list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSort {
    Transcribed,
    Verification,
    Document,
    Order,
}

impl SegmentSort {
    fn column(self) -> &'static str {
        match self {
            SegmentSort::Transcribed => "s.transcribed",
            SegmentSort::Verification => "s.verification",
            SegmentSort::Document => "s.document_id",
            SegmentSort::Order => "s.line_order",
        }
    }
}

/// What "save and next" looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextKind {
    /// Not yet transcribed
    Untranscribed,
    /// Transcribed but still unchecked
    Unverified,
}

/// A list row: segment plus its document label
#[derive(Debug, Clone)]
pub struct SegmentRow {
    pub segment: LineSegment,
    pub document_label: String,
}

/// Operator edit from the change form
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEdit {
    pub transcription: String,
    pub verification: VerifiedState,
}

/// Apply an edit, attributing changed fields to `user_id`
pub fn apply_edit(current: &LineSegment, edit: &SegmentEdit, user_id: Option<i64>) -> LineSegment {
    let mut updated = current.clone();

    if current.transcription != edit.transcription {
        updated.transcription = edit.transcription.clone();
        updated.last_transcribed_by = user_id;
    }
    if current.verification != edit.verification {
        updated.verification = edit.verification;
        updated.last_verified_by = user_id;
    }
    updated.transcribed = is_transcribed_text(&updated.transcription);
    updated
}

fn segment_from_row(row: &SqliteRow) -> LineSegment {
    LineSegment {
        id: row.get("id"),
        file: row.get("file"),
        order: row.get("line_order"),
        document_id: row.get("document_id"),
        transcription: row.get("transcription"),
        transcribed: row.get("transcribed"),
        verification: VerifiedState::from_i64(row.get::<i64, _>("verification"))
            .unwrap_or(VerifiedState::Unchecked),
        last_transcribed_by: row.get("last_transcribed_by"),
        last_verified_by: row.get("last_verified_by"),
    }
}

fn document_label(row: &SqliteRow) -> String {
    let document_id: i64 = row.get("document_id");
    let notebook: Option<String> = row.get("notebook_name");
    let page: Option<i64> = row.get("page");
    match (notebook, page) {
        (Some(name), Some(page)) => format!("{} p{}", name, page),
        (Some(name), None) => format!("{} p?", name),
        _ => format!("Document ({})", document_id),
    }
}

pub async fn insert_segment(pool: &SqlitePool, document_id: i64, file: &str, order: i64) -> Result<i64> {
    let id = sqlx::query(
        "INSERT INTO line_segments (file, line_order, document_id, transcription, transcribed, verification)
         VALUES (?, ?, ?, '', 0, 0)",
    )
    .bind(file)
    .bind(order)
    .bind(document_id)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Orders already present for a document
pub async fn existing_orders(pool: &SqlitePool, document_id: i64) -> Result<HashSet<i64>> {
    let orders: Vec<i64> = sqlx::query_scalar("SELECT line_order FROM line_segments WHERE document_id = ?")
        .bind(document_id)
        .fetch_all(pool)
        .await?;
    Ok(orders.into_iter().collect())
}

pub async fn get_segment(pool: &SqlitePool, id: i64) -> Result<Option<LineSegment>> {
    let sql = format!("SELECT {} FROM line_segments s WHERE s.id = ?", SEGMENT_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(segment_from_row))
}

/// Segments of a document in line order
pub async fn segments_for_document(pool: &SqlitePool, document_id: i64) -> Result<Vec<LineSegment>> {
    let sql = format!(
        "SELECT {} FROM line_segments s WHERE s.document_id = ? ORDER BY s.line_order, s.id",
        SEGMENT_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(document_id).fetch_all(pool).await?;
    Ok(rows.iter().map(segment_from_row).collect())
}

pub async fn count_segments(pool: &SqlitePool, filter: &SegmentFilter) -> Result<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM line_segments s");
    filter.push_where(&mut qb);
    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count)
}

/// One page of segments in the given sort order
pub async fn list_segments(
    pool: &SqlitePool,
    filter: &SegmentFilter,
    sort: &[SegmentSort],
    limit: i64,
    offset: i64,
) -> Result<Vec<SegmentRow>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {}, n.name AS notebook_name, d.page AS page
         FROM line_segments s
         JOIN documents d ON d.id = s.document_id
         LEFT JOIN notebooks n ON n.id = d.notebook_id",
        SEGMENT_COLUMNS
    ));
    filter.push_where(&mut qb);

    qb.push(" ORDER BY ");
    for key in sort {
        qb.push(key.column()).push(", ");
    }
    qb.push("s.id LIMIT ").push_bind(limit).push(" OFFSET ").push_bind(offset);

    let rows = qb.build().fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| SegmentRow {
            segment: segment_from_row(row),
            document_label: document_label(row),
        })
        .collect())
}

/// Persist an edited segment (transcribed recomputed)
pub async fn save_segment(pool: &SqlitePool, segment: &LineSegment) -> Result<()> {
    sqlx::query(
        "UPDATE line_segments
         SET transcription = ?, transcribed = ?, verification = ?,
             last_transcribed_by = ?, last_verified_by = ?
         WHERE id = ?",
    )
    .bind(&segment.transcription)
    .bind(is_transcribed_text(&segment.transcription))
    .bind(segment.verification.as_i64())
    .bind(segment.last_transcribed_by)
    .bind(segment.last_verified_by)
    .bind(segment.id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace a transcription without touching attribution
pub async fn update_transcription(pool: &SqlitePool, id: i64, transcription: &str) -> Result<()> {
    sqlx::query("UPDATE line_segments SET transcription = ?, transcribed = ? WHERE id = ?")
        .bind(transcription)
        .bind(is_transcribed_text(transcription))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Reset verification of the given segments; returns rows changed
pub async fn mark_unchecked(pool: &SqlitePool, ids: &[i64]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("UPDATE line_segments SET verification = 0 WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let affected = qb.build().execute(pool).await?.rows_affected();
    Ok(affected)
}

pub async fn get_segments(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<LineSegment>> {
    let mut segments = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(seg) = get_segment(pool, *id).await? {
            segments.push(seg);
        }
    }
    Ok(segments)
}

/// Next segment in scope needing work, by (document, order)
///
/// An empty scope (the list was not filtered) has no next segment.
pub async fn next_segment(
    pool: &SqlitePool,
    scope: &SegmentFilter,
    exclude_id: i64,
    kind: NextKind,
) -> Result<Option<i64>> {
    if scope.is_empty() {
        return Ok(None);
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT s.id FROM line_segments s");
    scope.push_where(&mut qb);
    qb.push(" AND s.id <> ").push_bind(exclude_id);
    match kind {
        NextKind::Untranscribed => {
            qb.push(" AND s.transcribed = 0");
        }
        NextKind::Unverified => {
            qb.push(" AND s.transcribed = 1 AND s.verification = ")
                .push_bind(VerifiedState::Unchecked.as_i64());
        }
    }
    qb.push(" ORDER BY s.document_id, s.line_order, s.id LIMIT 1");

    let id: Option<i64> = qb.build_query_scalar().fetch_optional(pool).await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> LineSegment {
        LineSegment {
            id: 1,
            file: "p1_validated/1.png".to_string(),
            order: 1,
            document_id: 1,
            transcription: String::new(),
            transcribed: false,
            verification: VerifiedState::Unchecked,
            last_transcribed_by: None,
            last_verified_by: None,
        }
    }

    #[test]
    fn edit_attributes_only_changed_fields() {
        let current = segment();
        let edit = SegmentEdit {
            transcription: "line text".to_string(),
            verification: VerifiedState::Unchecked,
        };
        let updated = apply_edit(&current, &edit, Some(5));
        assert!(updated.transcribed);
        assert_eq!(updated.last_transcribed_by, Some(5));
        assert_eq!(updated.last_verified_by, None);

        let verify = SegmentEdit {
            transcription: "line text".to_string(),
            verification: VerifiedState::Accepted,
        };
        let verified = apply_edit(&updated, &verify, Some(9));
        assert_eq!(verified.last_transcribed_by, Some(5));
        assert_eq!(verified.last_verified_by, Some(9));
    }

    #[test]
    fn clearing_transcription_resets_transcribed() {
        let mut current = segment();
        current.transcription = "x".to_string();
        current.transcribed = true;
        let edit = SegmentEdit {
            transcription: "   ".to_string(),
            verification: VerifiedState::Unchecked,
        };
        assert!(!apply_edit(&current, &edit, None).transcribed);
    }
}
