//! Extension/hold policy integration tests.
//!
//! A manual scene change pauses rotation for the extended window; further
//! interactions restart the window.

use std::time::Duration;

use mirror_scenes::actors::{
    CoordinatorHandle, HoldHandle, HoldPhase, HoldPolicy, PlayerHandle, SceneCoordinator,
    ScenePlayer,
};
use mirror_scenes::bus::{Notification, NotificationBus};
use mirror_scenes::config::HoldConfig;
use mirror_scenes::scene::{
    notifications, Direction, Intent, Origin, PlayerCommand, SceneQueryResponse,
};
use tokio::sync::broadcast::error::TryRecvError;

use crate::fixtures::{advance, order, settle, Recorder};

struct Stack {
    bus: NotificationBus,
    player: PlayerHandle,
    coordinator: CoordinatorHandle,
    hold: HoldHandle,
}

fn start() -> Stack {
    let bus = NotificationBus::default();
    let player = ScenePlayer::new(order())
        .with_rotation(Duration::from_secs(30))
        .with_bus(bus.clone())
        .spawn();
    let coordinator = SceneCoordinator::new(order(), player.sender())
        .with_bus(bus.clone())
        .spawn();
    let hold = HoldPolicy::new(&HoldConfig::default(), bus.clone(), coordinator.sender()).spawn();
    Stack {
        bus,
        player,
        coordinator,
        hold,
    }
}

async fn settle_chain() {
    settle().await;
    settle().await;
}

/// Test: Manual NEXT pauses rotation after the scene changed
/// Given a rotating player and the default hold policy
/// When the user presses NEXT
/// Then the player shows the next scene and rotation stays paused
#[tokio::test(start_paused = true)]
async fn test_manual_next_pauses_rotation() {
    let s = start();
    s.coordinator
        .submit(Origin::Manual, Intent::Relative(Direction::Next))
        .unwrap();
    settle_chain().await;

    assert_eq!(s.player.status().scene.as_deref(), Some("jokes_and_facts_page"));
    assert!(s.player.status().paused);
    assert_eq!(s.hold.phase(), HoldPhase::Extended);

    advance(Duration::from_secs(120)).await;
    assert_eq!(s.player.status().scene.as_deref(), Some("jokes_and_facts_page"));
}

/// Test: The hold is armed only once the scene change applied
/// Given a player that holds back its PLAY acknowledgment
/// When the user presses NEXT
/// Then no SCENES_NEXT is announced and rotation is not paused until the ack
#[tokio::test(start_paused = true)]
async fn test_hold_waits_for_play_ack() {
    let bus = NotificationBus::default();
    let (player_tx, mut recorder) = Recorder::new();
    let coordinator = SceneCoordinator::new(order(), player_tx)
        .with_bus(bus.clone())
        .with_ack_timeout(Duration::from_secs(60))
        .spawn();
    let hold = HoldPolicy::new(&HoldConfig::default(), bus.clone(), coordinator.sender()).spawn();
    let mut notes = bus.subscribe();

    coordinator
        .submit(Origin::Manual, Intent::Relative(Direction::Next))
        .unwrap();
    settle_chain().await;
    match recorder.commands().pop() {
        Some(PlayerCommand::Query { reply }) => {
            reply.send(SceneQueryResponse::named("homepage_page")).unwrap();
        }
        other => panic!("expected a scene query, got {:?}", other),
    }
    settle_chain().await;

    let ack = match recorder.commands().pop() {
        Some(PlayerCommand::Play { scene, ack }) => {
            assert_eq!(scene, "jokes_and_facts_page");
            ack.expect("manual PLAY carries an ack")
        }
        other => panic!("expected PLAY, got {:?}", other),
    };

    // Scene change still pending: nothing announced, nothing paused.
    advance(Duration::from_secs(5)).await;
    assert_eq!(hold.phase(), HoldPhase::Normal);
    assert!(matches!(notes.try_recv(), Err(TryRecvError::Empty)));
    assert!(recorder.commands().is_empty());

    ack.fire();
    settle_chain().await;
    assert_eq!(notes.try_recv().unwrap().name, notifications::SCENES_NEXT);
    assert_eq!(hold.phase(), HoldPhase::Extended);
    assert!(matches!(
        recorder.commands().as_slice(),
        [PlayerCommand::Pause]
    ));
}

/// Test: A second interaction extends the hold
/// Given an interaction at 0 s and another at 100 s
/// When the clock passes 300 s
/// Then rotation is still paused, and it resumes only after 400 s
#[tokio::test(start_paused = true)]
async fn test_interaction_restarts_window() {
    let s = start();
    s.bus.publish(Notification::new(notifications::USER_PRESENCE));
    settle_chain().await;
    assert!(s.player.status().paused);

    advance(Duration::from_secs(100)).await;
    s.bus.publish(Notification::new(notifications::VOLUME_UP));
    settle_chain().await;

    advance(Duration::from_secs(250)).await;
    assert!(s.player.status().paused, "resumed at 350 s");
    assert_eq!(s.hold.phase(), HoldPhase::Extended);

    advance(Duration::from_secs(51)).await;
    settle().await;
    assert!(!s.player.status().paused);
    assert_eq!(s.hold.phase(), HoldPhase::Normal);
    assert_eq!(s.player.status().scene.as_deref(), Some("homepage_page"));

    // Rotation restarts from the resume.
    advance(Duration::from_millis(30_010)).await;
    assert_eq!(s.player.status().scene.as_deref(), Some("jokes_and_facts_page"));
}

/// Test: Activity scene changes do not count as interactions
/// Given the hold policy listening on the bus
/// When an activity PLAY reaches the player
/// Then the hold stays in its normal phase
#[tokio::test(start_paused = true)]
async fn test_activity_play_is_not_an_interaction() {
    let s = start();
    s.coordinator
        .submit(Origin::Activity("music".to_string()), Intent::play("fantasy_page"))
        .unwrap();
    settle_chain().await;

    assert_eq!(s.player.status().scene.as_deref(), Some("fantasy_page"));
    assert_eq!(s.hold.phase(), HoldPhase::Normal);
    assert!(!s.player.status().paused);
}

/// Test: Notifications outside the allow-list are ignored
#[tokio::test(start_paused = true)]
async fn test_unlisted_notification_ignored() {
    let s = start();
    s.bus.publish(Notification::new(notifications::SCENE_CHANGED));
    s.bus.publish(Notification::new("WEATHER_UPDATED"));
    settle_chain().await;
    assert_eq!(s.hold.phase(), HoldPhase::Normal);
}
