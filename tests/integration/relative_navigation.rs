//! NEXT/PREV against the reference scene player.

use std::time::Duration;

use mirror_scenes::actors::{CoordinatorHandle, PlayerHandle, SceneCoordinator, ScenePlayer};
use mirror_scenes::scene::{Direction, Intent, Origin};

use crate::fixtures::{advance, order, settle};

fn start(player: ScenePlayer) -> (PlayerHandle, CoordinatorHandle) {
    let player = player.spawn();
    let coordinator = SceneCoordinator::new(order(), player.sender())
        .with_query_timeout(Duration::from_millis(1_000))
        .spawn();
    (player, coordinator)
}

fn scene(player: &PlayerHandle) -> Option<String> {
    player.status().scene
}

/// Test: NEXT and PREV step through the linear order with wrap-around
#[tokio::test(start_paused = true)]
async fn test_next_and_prev_wrap() {
    let (player, coordinator) = start(ScenePlayer::new(order()));

    coordinator.submit(Origin::Manual, Intent::Relative(Direction::Next)).unwrap();
    settle().await;
    assert_eq!(scene(&player).as_deref(), Some("jokes_and_facts_page"));

    coordinator.submit(Origin::Manual, Intent::Relative(Direction::Prev)).unwrap();
    settle().await;
    coordinator.submit(Origin::Manual, Intent::Relative(Direction::Prev)).unwrap();
    settle().await;
    assert_eq!(scene(&player).as_deref(), Some("football_page"));

    coordinator.submit(Origin::Manual, Intent::Relative(Direction::Next)).unwrap();
    settle().await;
    assert_eq!(scene(&player).as_deref(), Some("homepage_page"));
}

/// Test: A scene outside the order counts as "before the first"
/// Given the player showing an activity scene
/// When NEXT is requested
/// Then the first scene of the order is played
#[tokio::test(start_paused = true)]
async fn test_next_from_activity_scene_lands_on_first() {
    let (player, coordinator) =
        start(ScenePlayer::new(order()).with_initial_scene("music_page_paused"));

    coordinator.submit(Origin::Manual, Intent::Relative(Direction::Next)).unwrap();
    settle().await;
    assert_eq!(scene(&player).as_deref(), Some("homepage_page"));
}

/// Test: Unanswered query falls back to the first scene
/// Given a player that never answers scene queries
/// When NEXT is requested
/// Then nothing happens before the timeout and PLAY(order[0]) after it
#[tokio::test(start_paused = true)]
async fn test_query_timeout_falls_back_to_first() {
    let (player, coordinator) =
        start(ScenePlayer::new(order()).with_initial_scene("fantasy_page").unresponsive());

    coordinator.submit(Origin::Manual, Intent::Relative(Direction::Next)).unwrap();
    settle().await;
    advance(Duration::from_millis(990)).await;
    assert_eq!(scene(&player).as_deref(), Some("fantasy_page"));

    advance(Duration::from_millis(20)).await;
    assert_eq!(scene(&player).as_deref(), Some("homepage_page"));
}

/// Test: Rapid relative requests collapse
/// Given three NEXT requests sent back to back
/// When the first one is still waiting for its query
/// Then the last two collapse into one, moving two scenes in total
#[tokio::test(start_paused = true)]
async fn test_rapid_next_collapses() {
    let (player, coordinator) = start(ScenePlayer::new(order()));

    for _ in 0..3 {
        coordinator.submit(Origin::Manual, Intent::Relative(Direction::Next)).unwrap();
    }
    settle().await;
    assert_eq!(scene(&player).as_deref(), Some("fantasy_page"));
}

/// Test: Commands behind a pending query keep their order
/// Given a NEXT waiting on an unresponsive player
/// When an absolute PLAY follows it
/// Then the PLAY applies after the NEXT resolved, so it is the final scene
#[tokio::test(start_paused = true)]
async fn test_play_after_pending_next_applies_last() {
    let (player, coordinator) = start(ScenePlayer::new(order()).unresponsive());

    coordinator.submit(Origin::Manual, Intent::Relative(Direction::Next)).unwrap();
    coordinator.submit(Origin::Manual, Intent::play("football_page")).unwrap();
    settle().await;
    assert_eq!(scene(&player).as_deref(), Some("homepage_page"));

    advance(Duration::from_millis(1_010)).await;
    assert_eq!(scene(&player).as_deref(), Some("football_page"));
}
