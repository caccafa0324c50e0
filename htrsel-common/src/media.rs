//! Media folder layout
//!
//! Everything lives flat under the media root:
//!
//! ```text
//! {b}.{ext}                the uploaded page image
//! {b}_{model}/{model}_{i}.{ext}   candidate lines, i from 0
//! {b}_validated/{n}.{ext}         accepted lines, n from 1
//! output/                         dataset export
//! ```
//!
//! `b` is the basename (file stem) of the document's page image.

use crate::db::models::Document;
use crate::{Error, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Page image extensions, in lookup order
pub const PAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Suffix of the accepted-lines folder
pub const VALIDATED_SUFFIX: &str = "validated";

/// Export folder name under the media root
pub const OUTPUT_DIR: &str = "output";

/// Folder of candidate lines written by `model`
pub fn candidate_folder_name(basename: &str, model: &str) -> String {
    format!("{}_{}", basename, model)
}

pub fn validated_folder_name(basename: &str) -> String {
    format!("{}_{}", basename, VALIDATED_SUFFIX)
}

pub fn candidate_dir(media_root: &Path, basename: &str, model: &str) -> PathBuf {
    media_root.join(candidate_folder_name(basename, model))
}

pub fn validated_dir(media_root: &Path, basename: &str) -> PathBuf {
    media_root.join(validated_folder_name(basename))
}

/// Locate `{b}.jpg|.jpeg|.png`, first match wins
pub fn find_page_image(media_root: &Path, basename: &str) -> Option<PathBuf> {
    PAGE_EXTENSIONS
        .iter()
        .map(|ext| media_root.join(format!("{}.{}", basename, ext)))
        .find(|p| p.is_file())
}

/// A document's page image: its stored file, else `{b}.jpg|.jpeg|.png`
pub fn page_image(media_root: &Path, doc: &Document) -> Option<PathBuf> {
    doc.file
        .as_deref()
        .map(|f| media_root.join(f))
        .filter(|p| p.is_file())
        .or_else(|| doc.basename().and_then(|b| find_page_image(media_root, &b)))
}

/// Extension of a path without the dot; `png` when absent
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "png".to_string())
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;

    for (i, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != digit => {
                out.push(if prev { Chunk::Digits(&s[start..i]) } else { Chunk::Text(&s[start..i]) });
                start = i;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }
    if let Some(prev) = in_digits {
        out.push(if prev { Chunk::Digits(&s[start..]) } else { Chunk::Text(&s[start..]) });
    }
    out
}

/// Compare digit runs by value without parsing (no overflow)
fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Natural ordering: digit runs numerically, text runs case-insensitively
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x, y) {
            (Chunk::Digits(x), Chunk::Digits(y)) => cmp_digits(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            // Digit runs sort before text runs
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len()).then_with(|| a.cmp(b))
}

/// Regular files of a directory in natural order; missing directory is empty
pub fn list_files(dir: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort_by(|a, b| natural_cmp(a, b));
    Ok(names)
}

/// Number of entries (of any kind) in a directory; 0 when missing
pub fn count_entries(dir: &Path) -> Result<usize> {
    match std::fs::read_dir(dir) {
        Ok(entries) => Ok(entries.count()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Candidate/validated folder names under the media root
pub fn segment_folders(media_root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(media_root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() && name != OUTPUT_DIR && name.contains('_') {
            names.push(name);
        }
    }
    names.sort_by(|a, b| natural_cmp(a, b));
    Ok(names)
}

/// Best-effort removal of a document's page image and its segment folders
///
/// Only `{b}_{model}` for the given models and `{b}_validated` are touched;
/// other documents may share the `{b}_` prefix. Returns the number of paths
/// removed; failures are logged.
pub fn cleanup_document_files(media_root: &Path, doc: &Document, models: &[&str]) -> usize {
    let mut removed = 0;

    if let Some(file) = doc.file.as_deref() {
        let path = media_root.join(file);
        if path.is_file() {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }

    let Some(basename) = doc.basename() else {
        return removed;
    };
    let folders = models
        .iter()
        .map(|model| candidate_dir(media_root, &basename, model))
        .chain(std::iter::once(validated_dir(media_root, &basename)));
    for dir in folders {
        if !dir.is_dir() {
            continue;
        }
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
        }
    }

    debug!(document_id = doc.id, basename = %basename, removed, "Cleaned document files");
    removed
}

/// Reduce a client-supplied file name to its final component
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}

/// A name not yet taken in `dir`
///
/// An existing name gets a random suffix before the extension.
pub fn available_name(dir: &Path, name: &str) -> String {
    let mut candidate = name.to_string();
    while dir.join(&candidate).exists() {
        let path = Path::new(name);
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(7)
            .map(char::from)
            .collect();
        candidate = match path.extension() {
            Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
            None => format!("{}_{}", stem, suffix),
        };
    }
    candidate
}

/// Store an upload in the media root, returning its relative path
pub fn save_upload(media_root: &Path, file_name: &str, bytes: &[u8]) -> Result<String> {
    let name = sanitize_file_name(file_name)
        .ok_or_else(|| Error::InvalidInput(format!("Invalid file name: {:?}", file_name)))?;
    std::fs::create_dir_all(media_root)?;

    let stored = available_name(media_root, &name);
    std::fs::write(media_root.join(&stored), bytes)?;
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut v: Vec<&str>) -> Vec<&str> {
        v.sort_by(|a, b| natural_cmp(a, b));
        v
    }

    #[test]
    fn natural_order_compares_numbers_by_value() {
        assert_eq!(
            sorted(vec!["blla_10.png", "blla_2.png", "blla_1.png"]),
            vec!["blla_1.png", "blla_2.png", "blla_10.png"]
        );
        assert_eq!(sorted(vec!["10.png", "9.png", "100.png"]), vec!["9.png", "10.png", "100.png"]);
    }

    #[test]
    fn natural_order_ignores_case() {
        assert_eq!(sorted(vec!["b1", "A2", "a1"]), vec!["a1", "A2", "b1"]);
    }

    #[test]
    fn folder_names() {
        assert_eq!(candidate_folder_name("nb_p3", "blla"), "nb_p3_blla");
        assert_eq!(validated_folder_name("nb_p3"), "nb_p3_validated");
    }

    #[test]
    fn missing_folder_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_files(&dir.path().join("nope")).unwrap().is_empty());
        assert_eq!(count_entries(&dir.path().join("nope")).unwrap(), 0);
    }

    #[test]
    fn page_image_lookup_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p.png"), b"png").unwrap();
        assert_eq!(find_page_image(dir.path(), "p"), Some(dir.path().join("p.png")));
        std::fs::write(dir.path().join("p.jpg"), b"jpg").unwrap();
        assert_eq!(find_page_image(dir.path(), "p"), Some(dir.path().join("p.jpg")));
        assert_eq!(find_page_image(dir.path(), "q"), None);
    }

    fn doc(id: i64, file: &str) -> Document {
        Document {
            id,
            file: Some(file.to_string()),
            notebook_id: None,
            page: None,
            notebook_name: None,
        }
    }

    #[test]
    fn page_image_prefers_stored_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan.JPG"), b"jpg").unwrap();
        assert_eq!(page_image(dir.path(), &doc(1, "scan.JPG")), Some(dir.path().join("scan.JPG")));

        std::fs::write(dir.path().join("old.png"), b"png").unwrap();
        assert_eq!(page_image(dir.path(), &doc(2, "old.tif")), Some(dir.path().join("old.png")));
        assert_eq!(page_image(dir.path(), &doc(3, "gone.tif")), None);
    }

    #[test]
    fn cleanup_removes_image_and_own_folders() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path();
        std::fs::write(media.join("p1.jpg"), b"x").unwrap();
        std::fs::create_dir(media.join("p1_blla")).unwrap();
        std::fs::write(media.join("p1_blla/blla_0.jpg"), b"x").unwrap();
        std::fs::create_dir(media.join("p1_validated")).unwrap();
        std::fs::create_dir(media.join("p2_blla")).unwrap();

        assert_eq!(cleanup_document_files(media, &doc(1, "p1.jpg"), &["blla", "muharaf"]), 3);
        assert!(!media.join("p1.jpg").exists());
        assert!(!media.join("p1_blla").exists());
        assert!(!media.join("p1_validated").exists());
        assert!(media.join("p2_blla").exists());
    }

    #[test]
    fn cleanup_spares_documents_sharing_the_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path();
        let first = save_upload(media, "page.jpg", b"a").unwrap();
        let second = save_upload(media, "page.jpg", b"b").unwrap();
        let second_doc = doc(2, &second);
        let second_base = second_doc.basename().unwrap();
        assert!(second_base.starts_with("page_"));
        std::fs::create_dir(validated_dir(media, &second_base)).unwrap();
        std::fs::create_dir(candidate_dir(media, &second_base, "blla")).unwrap();
        std::fs::create_dir(media.join("page_validated")).unwrap();

        cleanup_document_files(media, &doc(1, &first), &["blla"]);
        assert!(!media.join("page.jpg").exists());
        assert!(!media.join("page_validated").exists());
        assert!(media.join(&second).exists());
        assert!(validated_dir(media, &second_base).is_dir());
        assert!(candidate_dir(media, &second_base, "blla").is_dir());
    }

    #[test]
    fn upload_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let first = save_upload(dir.path(), "../etc/page.jpg", b"a").unwrap();
        let second = save_upload(dir.path(), "page.jpg", b"b").unwrap();
        assert_eq!(first, "page.jpg");
        assert_ne!(first, second);
        assert!(second.starts_with("page_") && second.ends_with(".jpg"));
        assert!(sanitize_file_name("..").is_none());
    }
}
