//! Database models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::Path;

/// A scanned manuscript notebook (usually a PDF)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notebook {
    pub id: i64,
    pub name: String,
    pub file: Option<String>,
}

/// A single page image
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub file: Option<String>,
    pub notebook_id: Option<i64>,
    pub page: Option<i64>,
    /// Joined from notebooks; not a column of `documents`
    #[sqlx(default)]
    pub notebook_name: Option<String>,
}

impl Document {
    /// File stem of the page image; names every per-document folder
    pub fn basename(&self) -> Option<String> {
        self.file.as_deref().and_then(file_stem)
    }

    /// Human-readable label, e.g. `Notebook 3 p12`
    pub fn display_name(&self) -> String {
        match &self.notebook_name {
            Some(name) => match self.page {
                Some(page) => format!("{} p{}", name, page),
                None => format!("{} p?", name),
            },
            None => format!("Document ({})", self.id),
        }
    }
}

/// File stem of a relative media path (`a/b/page_01.jpg` -> `page_01`)
pub fn file_stem(path: &str) -> Option<String> {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
}

/// Verification judgment of a line segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifiedState {
    Unchecked = 0,
    Accepted = 1,
    Rejected = 2,
}

impl VerifiedState {
    pub const ALL: [VerifiedState; 3] = [
        VerifiedState::Unchecked,
        VerifiedState::Accepted,
        VerifiedState::Rejected,
    ];

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(VerifiedState::Unchecked),
            1 => Some(VerifiedState::Accepted),
            2 => Some(VerifiedState::Rejected),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Query-string key (`unchecked`, `accepted`, `rejected`)
    pub fn key(self) -> &'static str {
        match self {
            VerifiedState::Unchecked => "unchecked",
            VerifiedState::Accepted => "accepted",
            VerifiedState::Rejected => "rejected",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }

    pub fn label(self) -> &'static str {
        match self {
            VerifiedState::Unchecked => "Unchecked",
            VerifiedState::Accepted => "Accepted",
            VerifiedState::Rejected => "Rejected",
        }
    }
}

/// One line image of a document, with its transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSegment {
    pub id: i64,
    pub file: String,
    pub order: i64,
    pub document_id: i64,
    pub transcription: String,
    pub transcribed: bool,
    pub verification: VerifiedState,
    pub last_transcribed_by: Option<i64>,
    pub last_verified_by: Option<i64>,
}

/// `transcribed` is derived from the transcription text on every save
pub fn is_transcribed_text(transcription: &str) -> bool {
    !transcription.trim().is_empty()
}

/// Per-segment status used to derive document status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentStatus {
    pub transcribed: bool,
    pub verification: VerifiedState,
}

/// Derived status of a document, computed from its segments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStatus {
    segments: Vec<SegmentStatus>,
}

impl DocumentStatus {
    pub fn new(segments: Vec<SegmentStatus>) -> Self {
        Self { segments }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn has_linesegments(&self) -> bool {
        !self.segments.is_empty()
    }

    pub fn is_transcribed(&self) -> bool {
        self.has_linesegments() && self.segments.iter().all(|s| s.transcribed)
    }

    pub fn is_verified(&self) -> bool {
        self.has_linesegments()
            && self
                .segments
                .iter()
                .all(|s| s.verification == VerifiedState::Accepted)
    }

    pub fn has_state(&self, state: VerifiedState) -> bool {
        self.segments.iter().any(|s| s.verification == state)
    }

    /// Verification filter semantics of the document list
    pub fn matches_verification(&self, state: VerifiedState) -> bool {
        match state {
            VerifiedState::Accepted => self.is_verified(),
            other => self.has_state(other),
        }
    }
}

/// A workflow role, granted through group membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Segmenter,
    Transcriber,
    Verifier,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Segmenter, Role::Transcriber, Role::Verifier];

    pub fn group_name(self) -> &'static str {
        match self {
            Role::Segmenter => "segmenter",
            Role::Transcriber => "transcriber",
            Role::Verifier => "verifier",
        }
    }

    pub fn from_group_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.group_name() == name)
    }
}

/// An operator account
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_superuser: bool,
    pub roles: Vec<Role>,
}

impl User {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}
