//! Metadata-file observer integration tests.
//!
//! These run on the real clock: the observer reads the file system on a
//! blocking thread and compares real modification times.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use mirror_scenes::config::FileObserverConfig;
use mirror_scenes::observers::{FileObserver, SignalObserver};
use mirror_scenes::scene::ActivityState;

use crate::fixtures::{activity, Pipeline, HOME};

fn observer_config(path: &Path) -> FileObserverConfig {
    FileObserverConfig {
        path: path.to_path_buf(),
        check_interval_ms: 20,
        slow_factor: 3,
        startup_delay_ms: 0,
        valid_pattern: "Title:".to_string(),
        invalid_pattern: "no data".to_string(),
        watch: false,
        read_timeout_ms: 1_000,
    }
}

/// Collect PLAYs until `want` arrived or the deadline passes.
async fn wait_for_plays(p: &mut Pipeline, want: usize) -> Vec<String> {
    let mut plays = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while plays.len() < want && tokio::time::Instant::now() < deadline {
        plays.extend(p.recorder.plays());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    plays
}

/// Test: Track metadata claims, missing file returns at once
/// Given a music activity with a 30 s hold watching a metadata file
/// When a track is written and the file then disappears
/// Then PLAY(target) follows the write and PLAY(return) follows the removal
/// without waiting for the hold
#[tokio::test]
async fn test_metadata_file_drives_music_activity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.txt");

    let mut p = Pipeline::new(&[activity("music", "music_page_paused", 30_000)]);
    let cancel = CancellationToken::new();
    let observer = FileObserver::new("music", &observer_config(&path)).unwrap();
    let handle = Box::new(observer).spawn(p.router.sink(), cancel.clone());

    // Coarse file-system clocks may lag the observer's start time.
    tokio::time::sleep(Duration::from_millis(50)).await;
    std::fs::write(&path, "Title: Song\nArtist: Band\n").unwrap();

    assert_eq!(wait_for_plays(&mut p, 1).await, vec!["music_page_paused"]);
    assert_eq!(p.router.sink().state("music"), Some(ActivityState::Active));

    std::fs::remove_file(&path).unwrap();
    assert_eq!(wait_for_plays(&mut p, 1).await, vec![HOME]);
    assert_eq!(p.router.sink().state("music"), Some(ActivityState::Inactive));

    handle.shutdown();
    p.shutdown();
}

/// Test: Metadata left over from before startup is ignored
/// Given a metadata file written before the observer started
/// When the observer polls it
/// Then no activity is claimed
#[tokio::test]
async fn test_leftover_metadata_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.txt");
    std::fs::write(&path, "Title: Yesterday\n").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut p = Pipeline::new(&[activity("music", "music_page_paused", 30_000)]);
    let cancel = CancellationToken::new();
    let observer = FileObserver::new("music", &observer_config(&path)).unwrap();
    let handle = Box::new(observer).spawn(p.router.sink(), cancel);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(p.recorder.plays().is_empty());
    assert_eq!(p.router.sink().state("music"), Some(ActivityState::Inactive));

    handle.shutdown();
    p.shutdown();
}
