//! Role-based column visibility and segment ordering

use crate::db::models::{Role, User};
use crate::db::segments::SegmentSort;

/// Columns of the document list, in canonical display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentColumn {
    Id,
    Notebook,
    Page,
    Compare,
    Segments,
    Segment,
    Finalize,
    HasLinesegments,
    IsTranscribed,
    IsVerified,
    /// Only shown to users without a role
    DisplayName,
}

impl DocumentColumn {
    pub const CANONICAL: [DocumentColumn; 10] = [
        DocumentColumn::Id,
        DocumentColumn::Notebook,
        DocumentColumn::Page,
        DocumentColumn::Compare,
        DocumentColumn::Segments,
        DocumentColumn::Segment,
        DocumentColumn::Finalize,
        DocumentColumn::HasLinesegments,
        DocumentColumn::IsTranscribed,
        DocumentColumn::IsVerified,
    ];

    pub fn header(self) -> &'static str {
        match self {
            DocumentColumn::Id => "ID",
            DocumentColumn::Notebook => "Notebook",
            DocumentColumn::Page => "Page",
            DocumentColumn::Compare => "Compare",
            DocumentColumn::Segments => "Segments",
            DocumentColumn::Segment => "Segment",
            DocumentColumn::Finalize => "Finalize",
            DocumentColumn::HasLinesegments => "Has line segments",
            DocumentColumn::IsTranscribed => "Transcribed",
            DocumentColumn::IsVerified => "Verified",
            DocumentColumn::DisplayName => "Document",
        }
    }
}

fn role_columns(role: Role) -> &'static [DocumentColumn] {
    use DocumentColumn::*;
    match role {
        Role::Segmenter => &[Id, Notebook, Page, Compare, Segment, Finalize, HasLinesegments],
        Role::Transcriber => &[Id, Notebook, Page, Segments, HasLinesegments, IsTranscribed],
        Role::Verifier => &[
            Id,
            Notebook,
            Page,
            Segments,
            HasLinesegments,
            IsTranscribed,
            IsVerified,
        ],
    }
}

/// Visible document-list columns for a user
pub fn columns_for(user: &User) -> Vec<DocumentColumn> {
    if user.is_superuser {
        return DocumentColumn::CANONICAL.to_vec();
    }
    if user.roles.is_empty() {
        return vec![DocumentColumn::Id, DocumentColumn::DisplayName];
    }

    DocumentColumn::CANONICAL
        .into_iter()
        .filter(|col| user.roles.iter().any(|role| role_columns(*role).contains(col)))
        .collect()
}

/// Segment list ordering for a user
pub fn segment_ordering(user: &User) -> Vec<SegmentSort> {
    let verifier = user.has_role(Role::Verifier);
    let transcriber = user.has_role(Role::Transcriber);

    match (verifier, transcriber) {
        (true, false) => vec![SegmentSort::Verification, SegmentSort::Document, SegmentSort::Order],
        (false, true) => vec![SegmentSort::Transcribed, SegmentSort::Document, SegmentSort::Order],
        _ => vec![
            SegmentSort::Transcribed,
            SegmentSort::Verification,
            SegmentSort::Document,
            SegmentSort::Order,
        ],
    }
}
