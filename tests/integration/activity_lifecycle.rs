//! Activity lifecycle integration tests.
//!
//! Signals enter through the router's sink and come out as PLAY commands
//! at the scene player.

use std::time::Duration;

use mirror_scenes::scene::{ActivityState, SignalKind};

use crate::fixtures::{activity, advance, settle, Pipeline, HOME};

/// Test: Graceful deactivation returns only after the hold
/// Given an active music activity with a 30 s hold
/// When its signal goes stale
/// Then PLAY(return) is sent once, and only after 30 s
#[tokio::test(start_paused = true)]
async fn test_stale_signal_returns_after_hold() {
    let mut p = Pipeline::new(&[activity("music", "music_page_paused", 30_000)]);
    let sink = p.router.sink();

    sink.emit("music", SignalKind::Activate);
    settle().await;
    assert_eq!(p.recorder.plays(), vec!["music_page_paused"]);

    sink.emit("music", SignalKind::Deactivate);
    settle().await;
    assert_eq!(sink.state("music"), Some(ActivityState::Releasing));

    advance(Duration::from_secs(29)).await;
    assert!(p.recorder.plays().is_empty(), "returned before the hold elapsed");

    advance(Duration::from_millis(1_010)).await;
    assert_eq!(p.recorder.plays(), vec![HOME]);
    assert_eq!(sink.state("music"), Some(ActivityState::Inactive));

    advance(Duration::from_secs(120)).await;
    assert!(p.recorder.plays().is_empty());
    p.shutdown();
}

/// Test: Reactivation inside the hold cancels the pending return
/// Given a releasing activity
/// When it activates again before the hold elapses
/// Then no PLAY is sent at all
#[tokio::test(start_paused = true)]
async fn test_reactivation_cancels_return() {
    let mut p = Pipeline::new(&[activity("music", "music_page_paused", 30_000)]);
    let sink = p.router.sink();

    sink.emit("music", SignalKind::Activate);
    settle().await;
    p.recorder.plays();

    sink.emit("music", SignalKind::Deactivate);
    settle().await;
    advance(Duration::from_secs(10)).await;
    sink.emit("music", SignalKind::Activate);
    settle().await;

    advance(Duration::from_secs(60)).await;
    assert!(p.recorder.plays().is_empty());
    assert_eq!(sink.state("music"), Some(ActivityState::Active));
    p.shutdown();
}

/// Test: Stop skips the hold
/// Given an active activity
/// When the source reports stop
/// Then PLAY(return) is sent immediately and exactly once
#[tokio::test(start_paused = true)]
async fn test_stop_returns_immediately_once() {
    let mut p = Pipeline::new(&[activity("music", "music_page_paused", 30_000)]);
    let sink = p.router.sink();

    sink.emit("music", SignalKind::Activate);
    settle().await;
    p.recorder.plays();

    sink.emit("music", SignalKind::Stop);
    sink.emit("music", SignalKind::Stop);
    settle().await;
    assert_eq!(p.recorder.plays(), vec![HOME]);

    advance(Duration::from_secs(60)).await;
    assert!(p.recorder.plays().is_empty());
    p.shutdown();
}

/// Test: Repeated activation claims once
/// Given an inactive activity
/// When activate arrives three times
/// Then exactly one PLAY(target) is sent
#[tokio::test(start_paused = true)]
async fn test_repeated_activation_claims_once() {
    let mut p = Pipeline::new(&[activity("clown", "fantasy_page", 0)]);
    let sink = p.router.sink();
    for _ in 0..3 {
        sink.emit("clown", SignalKind::Activate);
    }
    settle().await;
    assert_eq!(p.recorder.plays(), vec!["fantasy_page"]);
    p.shutdown();
}

/// Test: Two activities, last intent wins
/// Given music and voice activities
/// When both activate in turn and music then stops
/// Then the player sees every PLAY in order, the latest one deciding the scene
#[tokio::test(start_paused = true)]
async fn test_last_intent_wins_across_activities() {
    let mut p = Pipeline::new(&[
        activity("music", "music_page_paused", 0),
        activity("voice", "voice_page", 0),
    ]);
    let sink = p.router.sink();

    sink.emit("music", SignalKind::Activate);
    settle().await;
    sink.emit("voice", SignalKind::Activate);
    settle().await;
    sink.emit("music", SignalKind::Stop);
    settle().await;

    assert_eq!(
        p.recorder.plays(),
        vec!["music_page_paused", "voice_page", HOME]
    );
    assert_eq!(sink.state("voice"), Some(ActivityState::Active));
    p.shutdown();
}

/// Test: Signals for unknown activities are dropped
#[tokio::test(start_paused = true)]
async fn test_unknown_activity_signal_dropped() {
    let mut p = Pipeline::new(&[activity("music", "music_page_paused", 0)]);
    p.router.sink().emit("ghost", SignalKind::Activate);
    settle().await;
    assert!(p.recorder.plays().is_empty());
    p.shutdown();
}
