//! End-to-end indexer scenarios against the deterministic stub embedder.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use sift_core::test_utils::{FailingEmbedder, HashEmbedder};
use sift_core::{AddOutcome, CancelToken, Index, IndexError};
use tempfile::TempDir;

fn open_index(index_dir: &Path) -> Index {
    Index::open(index_dir, Arc::new(HashEmbedder::new()), 512).unwrap()
}

fn scratch() -> (TempDir, TempDir) {
    (TempDir::new().unwrap(), TempDir::new().unwrap())
}

#[test]
fn test_single_file_round_trip() {
    let (root, idx_dir) = scratch();
    let file = root.path().join("a.md");
    fs::write(&file, "hello world ".repeat(50)).unwrap();

    let index = open_index(idx_dir.path());
    let token = CancelToken::new();
    index.index_dir(&token, root.path(), None).unwrap();

    let results = index.search("hello world", 10).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].meta.path, file);
    assert!(results[0].score >= 0.5, "score was {}", results[0].score);
    assert_eq!(results[0].meta.line_num, 1);
}

#[test]
fn test_hidden_directory_skipped() {
    let (root, idx_dir) = scratch();
    fs::write(root.path().join("visible.md"), "alpha").unwrap();
    let hidden = root.path().join(".hidden");
    fs::create_dir(&hidden).unwrap();
    fs::write(hidden.join("secret.md"), "beta").unwrap();

    let index = open_index(idx_dir.path());
    index.index_dir(&CancelToken::new(), root.path(), None).unwrap();
    index.flush().unwrap();

    let meta = fs::read_to_string(idx_dir.path().join("meta.json")).unwrap();
    assert!(meta.contains("visible.md"));
    assert!(!meta.contains("secret.md"));
}

#[test]
fn test_mtime_skip_cache() {
    let (root, idx_dir) = scratch();
    let file = root.path().join("a.md");
    fs::write(&file, "hello world ".repeat(50)).unwrap();

    let index = open_index(idx_dir.path());
    let token = CancelToken::new();
    assert_eq!(index.add_file(&token, &file).unwrap(), AddOutcome::Added);
    let chunks_before = index.stats().unwrap().num_chunks;

    assert_eq!(index.add_file(&token, &file).unwrap(), AddOutcome::Skipped);
    assert_eq!(index.stats().unwrap().num_chunks, chunks_before);
}

#[test]
fn test_rebuild_wipes_and_reingests() {
    let (root, idx_dir) = scratch();
    fs::write(root.path().join("a.md"), "hello world ".repeat(50)).unwrap();

    let index = open_index(idx_dir.path());
    let token = CancelToken::new();
    index.index_dir(&token, root.path(), None).unwrap();
    let first_chunks = index.stats().unwrap().num_chunks;

    fs::write(root.path().join("b.md"), "gamma").unwrap();
    index.rebuild_from_dir(&token, root.path(), None).unwrap();

    let stats = index.stats().unwrap();
    assert_eq!(stats.num_files, 2);
    assert_eq!(stats.num_chunks, first_chunks + 1);
}

#[test]
fn test_binary_sniff_blocks_txt_extension() {
    let (root, idx_dir) = scratch();
    fs::write(root.path().join("c.bin.txt"), [0x00, b'x', b'y']).unwrap();

    let index = open_index(idx_dir.path());
    index.index_dir(&CancelToken::new(), root.path(), None).unwrap();

    assert_eq!(index.stats().unwrap().num_chunks, 0);
}

#[test]
fn test_dedup_one_result_per_file() {
    let (root, idx_dir) = scratch();
    // Large enough for several chunks, every chunk matching the query.
    fs::write(
        root.path().join("repeat.md"),
        "alpha beta gamma delta ".repeat(200),
    )
    .unwrap();
    fs::write(root.path().join("other.md"), "unrelated content entirely").unwrap();

    let index = open_index(idx_dir.path());
    index.index_dir(&CancelToken::new(), root.path(), None).unwrap();
    assert!(
        index.stats().unwrap().num_chunks > 2,
        "test needs multiple chunks from repeat.md"
    );

    let results = index.search("alpha beta gamma", 3).unwrap();
    let repeats = results
        .iter()
        .filter(|r| r.meta.path.ends_with("repeat.md"))
        .count();
    assert_eq!(repeats, 1, "at most one result per source file");
}

#[test]
fn test_dedup_keeps_boosted_order() {
    let (root, idx_dir) = scratch();
    fs::write(root.path().join("match.md"), "kangaroo wallaby ".repeat(80)).unwrap();
    fs::write(root.path().join("noise.md"), "completely different words here").unwrap();

    let index = open_index(idx_dir.path());
    index.index_dir(&CancelToken::new(), root.path(), None).unwrap();

    let results = index.search("kangaroo wallaby", 2).unwrap();
    assert!(!results.is_empty());
    assert!(results[0].meta.path.ends_with("match.md"));
}

#[test]
fn test_cancelled_token_stops_walk() {
    let (root, idx_dir) = scratch();
    for i in 0..5 {
        fs::write(root.path().join(format!("f{i}.md")), "hello").unwrap();
    }

    let index = open_index(idx_dir.path());
    let token = CancelToken::new();
    token.cancel();

    let err = index.index_dir(&token, root.path(), None).unwrap_err();
    assert!(err.is_cancelled(), "got {err:?}");
    assert_eq!(index.stats().unwrap().num_chunks, 0);
}

#[test]
fn test_embed_failure_skips_file() {
    let (root, idx_dir) = scratch();
    fs::write(root.path().join("a.md"), "some words").unwrap();

    let index = Index::open(idx_dir.path(), Arc::new(FailingEmbedder), 512).unwrap();
    let outcome = index
        .add_file(&CancelToken::new(), &root.path().join("a.md"))
        .unwrap();
    assert_eq!(outcome, AddOutcome::Skipped);
    assert_eq!(index.stats().unwrap().num_chunks, 0);
}

#[test]
fn test_oversized_file_skipped() {
    let (root, idx_dir) = scratch();
    let file = root.path().join("big.md");
    fs::write(&file, "a ".repeat(4096)).unwrap(); // 8 KiB

    let index = Index::open(idx_dir.path(), Arc::new(HashEmbedder::new()), 4).unwrap();
    let outcome = index.add_file(&CancelToken::new(), &file).unwrap();
    assert_eq!(outcome, AddOutcome::Skipped);
}

#[test]
fn test_flush_and_reopen() {
    let (root, idx_dir) = scratch();
    fs::write(root.path().join("a.md"), "persistent searchable text here").unwrap();

    {
        let index = open_index(idx_dir.path());
        index.index_dir(&CancelToken::new(), root.path(), None).unwrap();
        index.close().unwrap();
    }

    let reopened = open_index(idx_dir.path());
    let stats = reopened.stats().unwrap();
    assert_eq!(stats.num_files, 1);
    assert!(stats.index_size_kb > 0);

    let results = reopened.search("persistent searchable text", 5).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].meta.path.ends_with("a.md"));
}

#[test]
fn test_open_rejects_count_mismatch() {
    let (_root, idx_dir) = scratch();
    // meta.json claims one chunk; there is no hnsw.bin, so the graph is empty.
    fs::write(
        idx_dir.path().join("meta.json"),
        r#"[{"path":"/tmp/a.md","line_num":1,"start_byte":0,"end_byte":5,"chunk_index":0,"text":"hello","mtime":0}]"#,
    )
    .unwrap();

    let err = Index::open(idx_dir.path(), Arc::new(HashEmbedder::new()), 512).unwrap_err();
    assert!(matches!(err, IndexError::CorruptIndex(_)), "got {err:?}");
}

#[test]
fn test_open_rejects_garbage_meta() {
    let (_root, idx_dir) = scratch();
    fs::write(idx_dir.path().join("meta.json"), "not json at all").unwrap();

    let err = Index::open(idx_dir.path(), Arc::new(HashEmbedder::new()), 512).unwrap_err();
    assert!(matches!(err, IndexError::CorruptIndex(_)));
}

#[test]
fn test_search_empty_index() {
    let (_root, idx_dir) = scratch();
    let index = open_index(idx_dir.path());
    let results = index.search("anything", 10).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_modified_file_reindexed() {
    let (root, idx_dir) = scratch();
    let file = root.path().join("a.md");
    fs::write(&file, "original words").unwrap();

    let index = open_index(idx_dir.path());
    let token = CancelToken::new();
    assert_eq!(index.add_file(&token, &file).unwrap(), AddOutcome::Added);

    // Rewrite with a different mtime. Filesystem mtime granularity can be
    // coarse, so force a visibly different timestamp.
    fs::write(&file, "replacement words").unwrap();
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
    let file_handle = fs::File::options().write(true).open(&file).unwrap();
    file_handle.set_modified(later).unwrap();
    drop(file_handle);

    assert_eq!(index.add_file(&token, &file).unwrap(), AddOutcome::Added);
    // Append-only: both versions' chunks are in the graph.
    assert_eq!(index.stats().unwrap().num_chunks, 2);
    assert_eq!(index.stats().unwrap().num_files, 1);
}

#[test]
fn test_progress_callback_reports_every_file() {
    use std::sync::Mutex;

    let (root, idx_dir) = scratch();
    for i in 0..3 {
        fs::write(root.path().join(format!("f{i}.md")), "words here").unwrap();
    }

    let index = open_index(idx_dir.path());
    let seen: Mutex<Vec<(usize, usize, bool)>> = Mutex::new(Vec::new());
    index
        .index_dir(
            &CancelToken::new(),
            root.path(),
            Some(&|done, total, _path: &Path, skipped| {
                seen.lock().unwrap().push((done, total, skipped));
            }),
        )
        .unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|(_, total, _)| *total == 3));
    assert_eq!(seen.last().unwrap().0, 3);
    assert!(seen.iter().all(|(_, _, skipped)| !skipped));
}

#[test]
fn test_concurrent_search_during_ingest() {
    let (root, idx_dir) = scratch();
    for i in 0..10 {
        fs::write(
            root.path().join(format!("doc{i}.md")),
            format!("document number {i} with shared vocabulary ").repeat(30),
        )
        .unwrap();
    }

    let index = Arc::new(open_index(idx_dir.path()));
    let searcher = {
        let index = Arc::clone(&index);
        std::thread::spawn(move || {
            for _ in 0..50 {
                let _ = index.search("shared vocabulary", 5).unwrap();
            }
        })
    };

    index.index_dir(&CancelToken::new(), root.path(), None).unwrap();
    searcher.join().unwrap();

    let results = index.search("shared vocabulary", 5).unwrap();
    assert_eq!(results.len(), 5);
}
