//! Dataset export
//!
//! Rebuilds `{media}/output/` from the finished (transcribed and verified)
//! documents of the selected notebooks:
//!
//! ```text
//! output/{page image}
//! output/{notebook}_{page}/{line image}
//! output/output.csv
//! ```

use crate::db::documents;
use crate::db::models::{Document, Notebook};
use crate::db::segments;
use crate::media::OUTPUT_DIR;
use crate::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};

pub const CSV_FILE: &str = "output.csv";

/// One line of `output.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub line_segment_path: String,
    pub notebook_name: String,
    pub page_number: Option<i64>,
    pub transcription: String,
    /// Sort key only; not written
    #[serde(skip)]
    pub order: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub segments: usize,
    pub notebooks: usize,
}

impl ExportReport {
    pub fn message(&self) -> String {
        format!(
            "Export complete: {} line segments from {} notebook(s).",
            self.segments, self.notebooks
        )
    }
}

/// Sort rows by (notebook name, page, order)
pub fn sort_rows(rows: &mut [ExportRow]) {
    rows.sort_by(|a, b| {
        a.notebook_name
            .cmp(&b.notebook_name)
            .then(a.page_number.cmp(&b.page_number))
            .then(a.order.cmp(&b.order))
    });
}

/// Write rows with the fixed header; UTF-8, standard quoting
pub fn write_csv(path: &Path, rows: &[ExportRow]) -> Result<()> {
    // Header written explicitly so an empty export still has one
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(["line_segment_path", "notebook_name", "page_number", "transcription"])?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Output folder for one page: `{notebook}_{page}` as a single path component
///
/// Path separators and control characters in the notebook name become `_`.
pub fn page_dir_name(notebook: &str, page: Option<i64>) -> String {
    let safe: String = notebook
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    let page_label = page.map(|p| p.to_string()).unwrap_or_else(|| "None".to_string());
    format!("{}_{}", safe, page_label)
}

fn copy_best_effort(src: &Path, dst: &Path) -> bool {
    match std::fs::copy(src, dst) {
        Ok(_) => true,
        Err(e) => {
            warn!("Export copy {} -> {} failed: {}", src.display(), dst.display(), e);
            false
        }
    }
}

async fn export_document(
    pool: &SqlitePool,
    media_root: &Path,
    output: &Path,
    notebook: &Notebook,
    document: &Document,
    rows: &mut Vec<ExportRow>,
) -> Result<()> {
    if let Some(file) = &document.file {
        let src = media_root.join(file);
        if let (true, Some(name)) = (src.is_file(), src.file_name()) {
            copy_best_effort(&src, &output.join(name));
        }
    }

    let dir_name = page_dir_name(&notebook.name, document.page);
    std::fs::create_dir_all(output.join(&dir_name))?;

    for segment in segments::segments_for_document(pool, document.id).await? {
        let src = media_root.join(&segment.file);
        let Some(name) = src.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if !src.is_file() {
            continue;
        }
        let rel = format!("{}/{}", dir_name, name);
        if copy_best_effort(&src, &output.join(&rel)) {
            rows.push(ExportRow {
                line_segment_path: rel,
                notebook_name: notebook.name.clone(),
                page_number: document.page,
                transcription: segment.transcription.clone(),
                order: segment.order,
            });
        }
    }
    Ok(())
}

/// Export the finished documents of `notebooks` into `{media}/output`
pub async fn export_notebooks(
    pool: &SqlitePool,
    media_root: &Path,
    notebooks: &[Notebook],
) -> Result<ExportReport> {
    let output = media_root.join(OUTPUT_DIR);
    if output.exists() {
        std::fs::remove_dir_all(&output)?;
    }
    std::fs::create_dir_all(&output)?;

    let mut rows = Vec::new();
    for notebook in notebooks {
        for document in documents::documents_for_notebook(pool, notebook.id).await? {
            let status = documents::document_status(pool, document.id).await?;
            if !(status.is_transcribed() && status.is_verified()) {
                continue;
            }
            export_document(pool, media_root, &output, notebook, &document, &mut rows).await?;
        }
    }

    sort_rows(&mut rows);
    write_csv(&output.join(CSV_FILE), &rows)?;

    let report = ExportReport {
        segments: rows.len(),
        notebooks: notebooks.len(),
    };
    info!(segments = report.segments, notebooks = report.notebooks, "Dataset exported");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(nb: &str, page: i64, order: i64, text: &str) -> ExportRow {
        ExportRow {
            line_segment_path: format!("{}_{}/{}.png", nb, page, order),
            notebook_name: nb.to_string(),
            page_number: Some(page),
            transcription: text.to_string(),
            order,
        }
    }

    #[test]
    fn rows_sort_by_notebook_page_order() {
        let mut rows = vec![row("B", 1, 1, ""), row("A", 2, 1, ""), row("A", 1, 10, ""), row("A", 1, 2, "")];
        sort_rows(&mut rows);
        let keys: Vec<(String, i64)> = rows
            .iter()
            .map(|r| (r.notebook_name.clone(), r.order))
            .collect();
        assert_eq!(
            keys,
            vec![("A".into(), 2), ("A".into(), 10), ("A".into(), 1), ("B".into(), 1)]
        );
    }

    #[test]
    fn page_dir_is_one_component() {
        assert_eq!(page_dir_name("Diary", Some(3)), "Diary_3");
        assert_eq!(page_dir_name("Diary", None), "Diary_None");
        assert_eq!(page_dir_name("../../escaped", Some(1)), ".._.._escaped_1");
        assert_eq!(page_dir_name("a\\b\n", Some(1)), "a_b__1");
        assert_eq!(Path::new(&page_dir_name("../x", Some(1))).components().count(), 1);
    }

    #[test]
    fn csv_quotes_and_omits_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CSV_FILE);
        write_csv(&path, &[row("Nb", 3, 7, "say \"hi\", then ←")]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("line_segment_path,notebook_name,page_number,transcription")
        );
        assert_eq!(lines.next(), Some("Nb_3/7.png,Nb,3,\"say \"\"hi\"\", then ←\""));
    }
}
