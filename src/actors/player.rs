//! Reference scene player.
//!
//! The real player belongs to the host application; this one lets the
//! binary run standalone and gives tests something honest to talk to. It
//! rotates through the linear order on a fixed period unless paused, applies
//! PLAY commands, acknowledges them and answers current-scene queries.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bus::{Notification, NotificationBus};
use crate::config::Config;
use crate::scene::{notifications, resolve_relative, Direction, PlayerCommand, SceneQueryResponse};
use crate::{mlog, mlog_debug, mlog_warn};

use super::{sleep_until_deadline, ActorHandle, Timer};

/// What the player currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    pub scene: Option<String>,
    pub paused: bool,
}

pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<PlayerCommand>,
    status: watch::Receiver<PlayerStatus>,
    actor: ActorHandle,
}

impl PlayerHandle {
    pub fn sender(&self) -> mpsc::UnboundedSender<PlayerCommand> {
        self.tx.clone()
    }

    pub fn status(&self) -> PlayerStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<PlayerStatus> {
        self.status.clone()
    }

    pub fn shutdown(&self) {
        self.actor.shutdown();
    }
}

pub struct ScenePlayer {
    order: Vec<String>,
    known: HashSet<String>,
    rotation: Duration,
    answer_queries: bool,
    status: PlayerStatus,
    bus: Option<NotificationBus>,
}

impl ScenePlayer {
    pub fn new(order: Vec<String>) -> Self {
        let initial = order.first().cloned();
        Self {
            order,
            known: HashSet::new(),
            rotation: Duration::ZERO,
            answer_queries: true,
            status: PlayerStatus {
                scene: initial,
                paused: false,
            },
            bus: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut player = Self::new(config.linear_order.clone())
            .with_known_scenes(config.known_scenes())
            .with_rotation(Duration::from_millis(config.player.rotation_interval_ms));
        if let Some(initial) = &config.player.initial_scene {
            player = player.with_initial_scene(initial.clone());
        }
        player
    }

    pub fn with_known_scenes(mut self, known: HashSet<String>) -> Self {
        self.known = known;
        self
    }

    /// Rotation period; zero disables automatic rotation.
    pub fn with_rotation(mut self, period: Duration) -> Self {
        self.rotation = period;
        self
    }

    pub fn with_initial_scene(mut self, scene: impl Into<String>) -> Self {
        self.status.scene = Some(scene.into());
        self
    }

    pub fn with_bus(mut self, bus: NotificationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Never answer current-scene queries.
    pub fn unresponsive(mut self) -> Self {
        self.answer_queries = false;
        self
    }

    pub fn spawn(self) -> PlayerHandle {
        self.spawn_with_token(CancellationToken::new())
    }

    pub fn spawn_with_token(mut self, cancel: CancellationToken) -> PlayerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<PlayerCommand>();
        let (status_tx, status_rx) = watch::channel(self.status.clone());
        let cancel_clone = cancel.clone();

        mlog_debug!(
            "ScenePlayer::spawn initial={:?} rotation={:?}",
            self.status.scene,
            self.rotation
        );

        tokio::spawn(async move {
            let mut rotation = Timer::default();
            self.arm_rotation(&mut rotation);
            // An unresponsive player keeps only the latest query open.
            let mut held_query = None;

            loop {
                let deadline = rotation.deadline();
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        mlog_debug!("ScenePlayer cancelled");
                        break;
                    }
                    cmd = rx.recv() => {
                        let Some(cmd) = cmd else {
                            mlog_debug!("ScenePlayer: command channel closed");
                            break;
                        };
                        match cmd {
                            PlayerCommand::Play { scene, ack } => {
                                if !self.known.is_empty() && !self.known.contains(&scene) {
                                    mlog_warn!("ScenePlayer: no such scene {}", scene);
                                    continue;
                                }
                                self.show(scene);
                                self.arm_rotation(&mut rotation);
                                if let Some(ack) = ack {
                                    ack.fire();
                                }
                            }
                            PlayerCommand::Pause => {
                                if !self.status.paused {
                                    mlog!("ScenePlayer: rotation paused");
                                }
                                self.status.paused = true;
                                rotation.cancel();
                            }
                            PlayerCommand::Resume => {
                                if self.status.paused {
                                    mlog!("ScenePlayer: rotation resumed");
                                }
                                self.status.paused = false;
                                self.arm_rotation(&mut rotation);
                            }
                            PlayerCommand::Query { reply } => {
                                if self.answer_queries {
                                    let resp = match &self.status.scene {
                                        Some(name) => SceneQueryResponse::named(name.clone()),
                                        None => SceneQueryResponse::default(),
                                    };
                                    let _ = reply.send(resp);
                                } else {
                                    if held_query.replace(reply).is_some() {
                                        mlog_debug!("ScenePlayer: dropping an older unanswered query");
                                    }
                                }
                            }
                        }
                    }
                    _ = sleep_until_deadline(deadline) => {
                        if let Some(next) =
                            resolve_relative(&self.order, self.status.scene.as_deref(), Direction::Next)
                        {
                            self.show(next);
                        }
                        self.arm_rotation(&mut rotation);
                    }
                }

                status_tx.send_replace(self.status.clone());
            }
        });

        PlayerHandle {
            tx,
            status: status_rx,
            actor: ActorHandle::new(cancel),
        }
    }

    fn arm_rotation(&self, rotation: &mut Timer) {
        rotation.cancel();
        if !self.status.paused && !self.rotation.is_zero() && !self.order.is_empty() {
            rotation.arm(Instant::now(), self.rotation);
        }
    }

    fn show(&mut self, scene: String) {
        if self.status.scene.as_deref() == Some(scene.as_str()) {
            mlog_debug!("ScenePlayer: already showing {}", scene);
            return;
        }
        mlog!("ScenePlayer: showing {}", scene);
        self.status.scene = Some(scene.clone());
        if let Some(bus) = &self.bus {
            bus.publish(
                Notification::new(notifications::SCENE_CHANGED)
                    .with_payload(json!({ "scene": scene }))
                    .from_sender("player"),
            );
        }
    }
}
