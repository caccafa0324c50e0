//! Notebook rasterisation into page documents
//!
//! The notebook file (usually a PDF) is rendered by an external command into
//! a scratch folder. Generated images are taken in natural order, moved into
//! the media root as `{stem}_p{page}.{ext}` and registered as documents.

use crate::db::documents;
use crate::db::models::{file_stem, Notebook};
use crate::media;
use crate::segmenter::{run_command, substitute};
use crate::{Error, Result};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Render a notebook into page documents; returns the number created
pub async fn convert_notebook(
    pool: &SqlitePool,
    media_root: &Path,
    notebook: &Notebook,
    command: &[String],
) -> Result<usize> {
    let file = notebook
        .file
        .as_deref()
        .ok_or_else(|| Error::InvalidInput(format!("Notebook '{}' has no file", notebook.name)))?;
    let source = media_root.join(file);
    if !source.is_file() {
        return Err(Error::NotFound(format!("Notebook file {}", source.display())));
    }

    let stem = file_stem(file).unwrap_or_else(|| format!("notebook{}", notebook.id));
    let scratch = media_root.join(format!(".rasterize-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&scratch)?;

    let result = render_pages(pool, media_root, notebook, command, &source, &scratch, &stem).await;

    if let Err(e) = std::fs::remove_dir_all(&scratch) {
        warn!("Failed to remove {}: {}", scratch.display(), e);
    }
    result
}

async fn render_pages(
    pool: &SqlitePool,
    media_root: &Path,
    notebook: &Notebook,
    command: &[String],
    source: &Path,
    scratch: &Path,
    stem: &str,
) -> Result<usize> {
    let output_prefix = scratch.join("page");
    let argv = substitute(command, |key| match key {
        "pdf" => Some(source.display().to_string()),
        "output_prefix" => Some(output_prefix.display().to_string()),
        _ => None,
    });
    if argv.is_empty() {
        return Err(Error::Config("Rasterize command is empty".to_string()));
    }
    run_command(argv).await?;

    let pages = media::list_files(scratch)?;
    let mut created = 0;
    for (index, generated) in pages.iter().enumerate() {
        let page = index as i64 + 1;
        let ext = media::extension_of(Path::new(generated));
        let name = media::available_name(media_root, &format!("{}_p{}.{}", stem, page, ext));
        std::fs::rename(scratch.join(generated), media_root.join(&name))?;

        documents::insert_document(pool, Some(&name), Some(notebook.id), Some(page)).await?;
        created += 1;
    }

    info!(notebook_id = notebook.id, pages = created, "Notebook rasterised");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_database;

    fn notebook(file: Option<&str>) -> Notebook {
        Notebook {
            id: 1,
            name: "Diary".to_string(),
            file: file.map(str::to_string),
        }
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pages_become_documents_in_natural_order() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir_all(&media).unwrap();
        std::fs::write(media.join("diary.pdf"), b"%PDF").unwrap();
        let pool = init_database(&dir.path().join("htrsel.db")).await.unwrap();
        let nb = crate::db::notebooks::insert_notebook(&pool, "Diary", Some("diary.pdf"))
            .await
            .unwrap();
        let notebook = crate::db::notebooks::get_notebook(&pool, nb).await.unwrap().unwrap();

        // One page per digit, written out of order
        let command = strings(&[
            "sh",
            "-c",
            "for i in 10 2 1; do echo $i > \"$1-$i.png\"; done",
            "{pdf}",
            "{output_prefix}",
        ]);
        let created = convert_notebook(&pool, &media, &notebook, &command).await.unwrap();
        assert_eq!(created, 3);

        let docs = documents::documents_for_notebook(&pool, nb).await.unwrap();
        let pages: Vec<(Option<i64>, Option<String>)> = docs.iter().map(|d| (d.page, d.file.clone())).collect();
        assert_eq!(
            pages,
            vec![
                (Some(1), Some("diary_p1.png".to_string())),
                (Some(2), Some("diary_p2.png".to_string())),
                (Some(3), Some("diary_p3.png".to_string())),
            ]
        );
        assert_eq!(std::fs::read_to_string(media.join("diary_p3.png")).unwrap().trim(), "10");

        // Scratch folders are gone
        let leftovers: Vec<_> = std::fs::read_dir(&media)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".rasterize-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn notebook_without_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("htrsel.db")).await.unwrap();
        let err = convert_notebook(&pool, dir.path(), &notebook(None), &strings(&["true"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = convert_notebook(&pool, dir.path(), &notebook(Some("missing.pdf")), &strings(&["true"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_render_cleans_scratch_and_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("diary.pdf"), b"%PDF").unwrap();
        let pool = init_database(&dir.path().join("htrsel.db")).await.unwrap();

        let command = strings(&["sh", "-c", "echo broken pdf >&2; exit 1"]);
        let err = convert_notebook(&pool, dir.path(), &notebook(Some("diary.pdf")), &command)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Process(ref msg) if msg.contains("broken pdf")));

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(".rasterize-"))
            .collect();
        assert!(names.is_empty());
    }
}
