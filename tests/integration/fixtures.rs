//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Building activity configurations
//! - Recording what the coordinator sends to the scene player
//! - Letting spawned actors run on the paused clock

use std::time::Duration;

use tokio::sync::mpsc;

use mirror_scenes::actors::{CoordinatorHandle, IntentEmitter, SceneCoordinator, SignalRouter};
use mirror_scenes::bus::NotificationBus;
use mirror_scenes::config::{ActivityConfig, ObserverConfig};
use mirror_scenes::scene::PlayerCommand;

pub const HOME: &str = "homepage_page";

/// The default linear order.
pub fn order() -> Vec<String> {
    [
        "homepage_page",
        "jokes_and_facts_page",
        "fantasy_page",
        "football_page",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn activity(name: &str, target: &str, hold_ms: u64) -> ActivityConfig {
    ActivityConfig {
        name: name.to_string(),
        target_scene: target.to_string(),
        return_scene: HOME.to_string(),
        hold_duration_ms: hold_ms,
        announce: None,
        observer: ObserverConfig::Http,
    }
}

/// Yield enough times for every actor to handle what is queued.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock, then let actors react.
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

/// Stand-in scene player that records every command.
pub struct Recorder {
    rx: mpsc::UnboundedReceiver<PlayerCommand>,
}

impl Recorder {
    pub fn new() -> (mpsc::UnboundedSender<PlayerCommand>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Every command received so far, with acks left unfired.
    pub fn commands(&mut self) -> Vec<PlayerCommand> {
        let mut commands = Vec::new();
        while let Ok(cmd) = self.rx.try_recv() {
            commands.push(cmd);
        }
        commands
    }

    /// Scenes of every PLAY received so far, acknowledging each one.
    pub fn plays(&mut self) -> Vec<String> {
        let mut scenes = Vec::new();
        while let Ok(cmd) = self.rx.try_recv() {
            if let PlayerCommand::Play { scene, ack } = cmd {
                if let Some(ack) = ack {
                    ack.fire();
                }
                scenes.push(scene);
            }
        }
        scenes
    }
}

/// Emitters, router and coordinator over a [`Recorder`].
pub struct Pipeline {
    pub coordinator: CoordinatorHandle,
    pub router: SignalRouter,
    pub recorder: Recorder,
    pub bus: NotificationBus,
}

impl Pipeline {
    pub fn new(activities: &[ActivityConfig]) -> Self {
        let bus = NotificationBus::default();
        let (player_tx, recorder) = Recorder::new();
        let coordinator = SceneCoordinator::new(order(), player_tx)
            .with_bus(bus.clone())
            .spawn();
        let router = SignalRouter::new(
            activities
                .iter()
                .map(|a| IntentEmitter::new(a, coordinator.sender()).spawn()),
        );
        Self {
            coordinator,
            router,
            recorder,
            bus,
        }
    }

    pub fn shutdown(&self) {
        self.router.shutdown();
        self.coordinator.shutdown();
    }
}
