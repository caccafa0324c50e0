//! Comparison/accept wizard and finalisation
//!
//! The wizard keeps no server state: every step is described by the two
//! model names and two indices carried in the request.

use crate::db::models::Document;
use crate::db::segments;
use crate::media;
use crate::{Error, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_MODEL1: &str = "blla";
pub const DEFAULT_MODEL2: &str = "muharaf";

/// Clamp a requested index into `[0, len - 1]`; 0 for an empty list
pub fn clamp_index(idx: i64, len: usize) -> usize {
    if len == 0 || idx <= 0 {
        return 0;
    }
    (idx as u64).min(len as u64 - 1) as usize
}

/// Index after accepting a line: one further, held at the last entry
pub fn advance_index(idx: usize, len: usize) -> usize {
    clamp_index(idx as i64 + 1, len)
}

/// Which side of the comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
}

/// Everything the compare page renders
#[derive(Debug, Clone)]
pub struct CompareView {
    pub basename: String,
    pub model1: String,
    pub model2: String,
    pub files1: Vec<String>,
    pub files2: Vec<String>,
    pub idx1: usize,
    pub idx2: usize,
    pub validated_count: usize,
}

impl CompareView {
    /// Load both candidate folders and clamp the requested indices
    pub fn load(
        media_root: &Path,
        basename: &str,
        model1: &str,
        model2: &str,
        idx1: i64,
        idx2: i64,
    ) -> Result<Self> {
        let files1 = media::list_files(&media::candidate_dir(media_root, basename, model1))?;
        let files2 = media::list_files(&media::candidate_dir(media_root, basename, model2))?;
        let validated_count = media::count_entries(&media::validated_dir(media_root, basename))?;

        Ok(Self {
            basename: basename.to_string(),
            model1: model1.to_string(),
            model2: model2.to_string(),
            idx1: clamp_index(idx1, files1.len()),
            idx2: clamp_index(idx2, files2.len()),
            files1,
            files2,
            validated_count,
        })
    }

    /// Current candidate file name on one side
    pub fn current(&self, side: Side) -> Option<&str> {
        match side {
            Side::First => self.files1.get(self.idx1).map(String::as_str),
            Side::Second => self.files2.get(self.idx2).map(String::as_str),
        }
    }

    /// Relative media path of the current candidate on one side
    pub fn current_path(&self, side: Side) -> Option<String> {
        let model = match side {
            Side::First => &self.model1,
            Side::Second => &self.model2,
        };
        self.current(side)
            .map(|f| format!("{}/{}", media::candidate_folder_name(&self.basename, model), f))
    }

    /// Indices to show after an accept
    pub fn advanced(&self) -> (usize, usize) {
        (
            advance_index(self.idx1, self.files1.len()),
            advance_index(self.idx2, self.files2.len()),
        )
    }

    /// Copy the current candidate of `side` into the validated folder
    pub fn accept(&self, media_root: &Path, side: Side) -> Result<PathBuf> {
        let model = match side {
            Side::First => &self.model1,
            Side::Second => &self.model2,
        };
        let file = self
            .current(side)
            .ok_or_else(|| Error::NotFound(format!("No candidate lines for model '{}'", model)))?;

        accept_candidate(media_root, &self.basename, model, file)
    }
}

/// Copy a candidate line to `{b}_validated/{count+1}.{ext}`
pub fn accept_candidate(media_root: &Path, basename: &str, model: &str, file: &str) -> Result<PathBuf> {
    let src = media::candidate_dir(media_root, basename, model).join(file);
    let validated = media::validated_dir(media_root, basename);
    std::fs::create_dir_all(&validated)?;

    let count = media::count_entries(&validated)?;
    let dst_name = match Path::new(file).extension() {
        Some(ext) => format!("{}.{}", count + 1, ext.to_string_lossy()),
        None => (count + 1).to_string(),
    };
    let dst = validated.join(dst_name);
    std::fs::copy(&src, &dst)?;

    debug!(src = %src.display(), dst = %dst.display(), "Accepted candidate line");
    Ok(dst)
}

/// Result of turning validated files into line segments
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    pub created: usize,
    /// Orders already present for the document
    pub existing: usize,
    /// Files whose stem is not an integer
    pub ignored: usize,
}

/// Create a line segment for every `{n}.{ext}` in the validated folder
///
/// Running it twice creates nothing the second time.
pub async fn finalize_document(
    pool: &SqlitePool,
    media_root: &Path,
    document: &Document,
) -> Result<FinalizeReport> {
    let basename = document
        .basename()
        .ok_or_else(|| Error::InvalidInput(format!("Document {} has no file", document.id)))?;
    let folder = media::validated_folder_name(&basename);
    let files = media::list_files(&media_root.join(&folder))?;
    let mut existing = segments::existing_orders(pool, document.id).await?;

    let mut report = FinalizeReport::default();
    for name in files {
        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Ok(order) = stem.parse::<i64>() else {
            report.ignored += 1;
            continue;
        };
        if !existing.insert(order) {
            report.existing += 1;
            continue;
        }
        segments::insert_segment(pool, document.id, &format!("{}/{}", folder, name), order).await?;
        report.created += 1;
    }

    info!(
        document_id = document.id,
        created = report.created,
        existing = report.existing,
        ignored = report.ignored,
        "Finalized validated lines"
    );
    Ok(report)
}
