//! Drives `hashing::run` directly, below the `TorrentCreate` builder
//! layer, to check cancellation and progress reporting.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tmeta::hashing::{self, Cancellation, HashMode, PipelineConfig};

fn fixture() -> (tempfile::TempDir, Vec<PathBuf>) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("one.bin"), vec![7u8; 100_000]).unwrap();
    let files = vec![PathBuf::from("one.bin")];
    (dir, files)
}

#[test]
fn v1_pipeline_reports_progress_up_to_the_total_size() {
    let (dir, files) = fixture();
    let seen = AtomicU64::new(0);
    let mut progress = |done: u64, _total: u64| {
        seen.store(done, Ordering::SeqCst);
    };

    let output = hashing::run(PipelineConfig {
        path_root: dir.path().to_path_buf(),
        relative_paths: files,
        mode: HashMode::V1 { piece_length: 16 * 1024 },
        workers: 2,
        memory_limit: None,
        progress: Some(&mut progress),
        cancellation: None,
    })
    .unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 100_000);
    let pieces = output.v1_pieces.unwrap();
    assert_eq!(pieces.len(), (100_000f64 / (16.0 * 1024.0)).ceil() as usize);
}

#[test]
fn a_pre_cancelled_token_stops_the_pipeline_before_any_work() {
    let (dir, files) = fixture();
    let cancellation = Cancellation::new();
    cancellation.cancel();

    let err = hashing::run(PipelineConfig {
        path_root: dir.path().to_path_buf(),
        relative_paths: files,
        mode: HashMode::V1 { piece_length: 16 * 1024 },
        workers: 2,
        memory_limit: None,
        progress: None,
        cancellation: Some(cancellation),
    })
    .unwrap_err();

    assert!(matches!(err, tmeta::Error::Worker(tmeta::WorkerError::Cancelled)));
}

#[test]
fn v2_pipeline_builds_one_merkle_tree_per_file() {
    let (dir, files) = fixture();
    let output = hashing::run(PipelineConfig {
        path_root: dir.path().to_path_buf(),
        relative_paths: files.clone(),
        mode: HashMode::V2 { piece_length: 16 * 1024 },
        workers: 3,
        memory_limit: None,
        progress: None,
        cancellation: None,
    })
    .unwrap();

    let trees = output.v2_file_trees.unwrap();
    assert_eq!(trees.len(), files.len());
    let tree = &trees[&files[0]];
    assert_eq!(tree.piece_hashes.len(), (100_000f64 / (16.0 * 1024.0)).ceil() as usize);
}
