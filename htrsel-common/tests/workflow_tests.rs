//! Finalize and export against a real media folder

use htrsel_common::db::documents;
use htrsel_common::db::init::init_database;
use htrsel_common::db::models::VerifiedState;
use htrsel_common::db::{notebooks, segments};
use htrsel_common::export::{export_notebooks, CSV_FILE};
use htrsel_common::media;
use htrsel_common::wizard::finalize_document;
use std::fs;

#[tokio::test]
async fn test_finalize_is_idempotent_and_skips_non_numeric() {
    let dir = tempfile::tempdir().unwrap();
    let media_root = dir.path().join("media");
    let pool = init_database(&dir.path().join("htrsel.db")).await.unwrap();

    let validated = media::validated_dir(&media_root, "page1");
    fs::create_dir_all(&validated).unwrap();
    for name in ["1.png", "2.png", "10.png", "notes.txt"] {
        fs::write(validated.join(name), b"x").unwrap();
    }
    let id = documents::insert_document(&pool, Some("page1.jpg"), None, None).await.unwrap();
    let document = documents::get_document(&pool, id).await.unwrap().unwrap();

    let first = finalize_document(&pool, &media_root, &document).await.unwrap();
    assert_eq!((first.created, first.ignored), (3, 1));

    let lines = segments::segments_for_document(&pool, id).await.unwrap();
    let orders: Vec<i64> = lines.iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![1, 2, 10]);
    assert_eq!(lines[2].file, "page1_validated/10.png");

    let second = finalize_document(&pool, &media_root, &document).await.unwrap();
    assert_eq!((second.created, second.existing), (0, 3));
}

#[tokio::test]
async fn test_export_writes_finished_documents_only() {
    let dir = tempfile::tempdir().unwrap();
    let media_root = dir.path().join("media");
    fs::create_dir_all(media_root.join("p1_validated")).unwrap();
    fs::create_dir_all(media_root.join("p2_validated")).unwrap();
    fs::write(media_root.join("p1.jpg"), b"page").unwrap();
    fs::write(media_root.join("p1_validated/1.png"), b"l1").unwrap();
    fs::write(media_root.join("p1_validated/2.png"), b"l2").unwrap();
    fs::write(media_root.join("p2_validated/1.png"), b"l").unwrap();
    // Stale output is replaced
    fs::create_dir_all(media_root.join("output")).unwrap();
    fs::write(media_root.join("output/stale.txt"), b"old").unwrap();

    let pool = init_database(&dir.path().join("htrsel.db")).await.unwrap();
    let nb = notebooks::insert_notebook(&pool, "Diary", None).await.unwrap();
    let finished = documents::insert_document(&pool, Some("p1.jpg"), Some(nb), Some(1)).await.unwrap();
    let pending = documents::insert_document(&pool, Some("p2.jpg"), Some(nb), Some(2)).await.unwrap();

    for (order, text) in [(2, "second"), (1, "first")] {
        let id = segments::insert_segment(&pool, finished, &format!("p1_validated/{}.png", order), order)
            .await
            .unwrap();
        let mut seg = segments::get_segment(&pool, id).await.unwrap().unwrap();
        seg.transcription = text.to_string();
        seg.verification = VerifiedState::Accepted;
        segments::save_segment(&pool, &seg).await.unwrap();
    }
    segments::insert_segment(&pool, pending, "p2_validated/1.png", 1).await.unwrap();

    let notebook = notebooks::get_notebook(&pool, nb).await.unwrap().unwrap();
    let report = export_notebooks(&pool, &media_root, &[notebook]).await.unwrap();
    assert_eq!(report.message(), "Export complete: 2 line segments from 1 notebook(s).");

    let output = media_root.join("output");
    assert!(!output.join("stale.txt").exists());
    assert!(output.join("p1.jpg").is_file());
    assert!(output.join("Diary_1/1.png").is_file());
    assert!(!output.join("Diary_2").exists());

    let csv = fs::read_to_string(output.join(CSV_FILE)).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines,
        vec![
            "line_segment_path,notebook_name,page_number,transcription",
            "Diary_1/1.png,Diary,1,first",
            "Diary_1/2.png,Diary,1,second",
        ]
    );
}

#[tokio::test]
async fn test_export_keeps_hostile_notebook_names_inside_output() {
    let dir = tempfile::tempdir().unwrap();
    let media_root = dir.path().join("media");
    fs::create_dir_all(media_root.join("p1_validated")).unwrap();
    fs::write(media_root.join("p1_validated/1.png"), b"l1").unwrap();

    let pool = init_database(&dir.path().join("htrsel.db")).await.unwrap();
    let nb = notebooks::insert_notebook(&pool, "../../escaped", None).await.unwrap();
    let doc = documents::insert_document(&pool, Some("p1.jpg"), Some(nb), Some(1)).await.unwrap();
    let id = segments::insert_segment(&pool, doc, "p1_validated/1.png", 1).await.unwrap();
    let mut seg = segments::get_segment(&pool, id).await.unwrap().unwrap();
    seg.transcription = "line".to_string();
    seg.verification = VerifiedState::Accepted;
    segments::save_segment(&pool, &seg).await.unwrap();

    let notebook = notebooks::get_notebook(&pool, nb).await.unwrap().unwrap();
    let report = export_notebooks(&pool, &media_root, &[notebook]).await.unwrap();
    assert_eq!(report.segments, 1);

    assert!(!dir.path().join("escaped_1").exists());
    assert!(media_root.join("output/.._.._escaped_1/1.png").is_file());
    let csv = fs::read_to_string(media_root.join("output").join(CSV_FILE)).unwrap();
    assert!(csv.contains(".._.._escaped_1/1.png,../../escaped,1,line"));
}
