//! Remote sync of validated folders with rsync

use crate::db::models::Document;
use crate::media;
use crate::segmenter::run_command;
use std::path::Path;
use tracing::warn;

/// Counts reported after a sync batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub ok: usize,
    pub missing: usize,
    pub errors: usize,
}

impl SyncReport {
    pub fn message(&self) -> String {
        format!(
            "Sync complete: {} successful, {} missing folders, {} errors.",
            self.ok, self.missing, self.errors
        )
    }
}

/// `rsync -avz {media}/{b}_validated {target}` for each document
///
/// Documents without a file count as errors.
pub async fn sync_validated(media_root: &Path, target: &str, documents: &[Document]) -> SyncReport {
    let mut report = SyncReport::default();

    for document in documents {
        let Some(basename) = document.basename() else {
            report.errors += 1;
            continue;
        };
        let source = media::validated_dir(media_root, &basename);
        if !source.exists() {
            report.missing += 1;
            continue;
        }

        let argv = vec![
            "rsync".to_string(),
            "-avz".to_string(),
            source.display().to_string(),
            target.to_string(),
        ];
        match run_command(argv).await {
            Ok(()) => report.ok += 1,
            Err(e) => {
                warn!(document_id = document.id, "rsync failed: {}", e);
                report.errors += 1;
            }
        }
    }
    report
}
