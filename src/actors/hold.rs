//! Extension/hold policy.
//!
//! Any interaction notification from the allow-list pauses automatic
//! rotation for `extended_duration`; further interactions restart that
//! window without pausing again. When the window runs out, rotation resumes.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bus::NotificationBus;
use crate::config::HoldConfig;
use crate::scene::{Command, Intent, Origin};
use crate::{mlog, mlog_debug, mlog_error, mlog_trace, mlog_warn};

use super::{sleep_until_deadline, ActorHandle, Timer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HoldPhase {
    #[default]
    Normal,
    Extended,
}

/// Pure hold state machine.
#[derive(Debug)]
pub struct HoldTracker {
    phase: HoldPhase,
    timer: Timer,
    extended: Duration,
    interactions: u64,
}

impl HoldTracker {
    pub fn new(extended: Duration) -> Self {
        Self {
            phase: HoldPhase::Normal,
            timer: Timer::default(),
            extended,
            interactions: 0,
        }
    }

    pub fn phase(&self) -> HoldPhase {
        self.phase
    }

    pub fn resume_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn interactions(&self) -> u64 {
        self.interactions
    }

    /// Returns `Pause` only on the Normal -> Extended edge.
    pub fn on_interaction(&mut self, now: Instant) -> Option<Intent> {
        self.interactions += 1;
        self.timer.cancel();
        self.timer.arm(now, self.extended);
        match self.phase {
            HoldPhase::Extended => None,
            HoldPhase::Normal => {
                self.phase = HoldPhase::Extended;
                Some(Intent::Pause)
            }
        }
    }

    pub fn on_timer(&mut self, now: Instant) -> Option<Intent> {
        if !self.timer.has_expired(now) {
            return None;
        }
        self.timer.cancel();
        match self.phase {
            HoldPhase::Normal => None,
            HoldPhase::Extended => {
                self.phase = HoldPhase::Normal;
                Some(Intent::Resume)
            }
        }
    }
}

pub struct HoldHandle {
    phase: watch::Receiver<HoldPhase>,
    actor: ActorHandle,
}

impl HoldHandle {
    pub fn phase(&self) -> HoldPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<HoldPhase> {
        self.phase.clone()
    }

    pub fn shutdown(&self) {
        self.actor.shutdown();
    }
}

/// Actor listening on the bus for interactions.
pub struct HoldPolicy {
    allow: HashSet<String>,
    tracker: HoldTracker,
    bus: NotificationBus,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl HoldPolicy {
    pub fn new(
        config: &HoldConfig,
        bus: NotificationBus,
        command_tx: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            allow: config.interactions.iter().cloned().collect(),
            tracker: HoldTracker::new(Duration::from_millis(config.extended_duration_ms)),
            bus,
            command_tx,
        }
    }

    pub fn is_interaction(&self, name: &str) -> bool {
        self.allow.contains(name)
    }

    pub fn spawn(self) -> HoldHandle {
        self.spawn_with_token(CancellationToken::new())
    }

    pub fn spawn_with_token(mut self, cancel: CancellationToken) -> HoldHandle {
        // Subscribe before returning so nothing published after spawn is missed.
        let mut bus_rx = self.bus.subscribe();
        let (phase_tx, phase_rx) = watch::channel(HoldPhase::Normal);
        let cancel_clone = cancel.clone();

        mlog_debug!("HoldPolicy::spawn allow={:?}", self.allow);

        tokio::spawn(async move {
            loop {
                let deadline = self.tracker.resume_deadline();
                let intent = tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        mlog_debug!("HoldPolicy cancelled");
                        break;
                    }
                    received = bus_rx.recv() => match received {
                        Ok(notification) => {
                            if !self.is_interaction(&notification.name) {
                                mlog_trace!("HoldPolicy: ignoring {}", notification.name);
                                continue;
                            }
                            let intent = self.tracker.on_interaction(Instant::now());
                            mlog!(
                                "HoldPolicy: interaction {} (#{}), {}",
                                notification.name,
                                self.tracker.interactions(),
                                if intent.is_some() { "extending scene" } else { "resetting hold timer" }
                            );
                            intent
                        }
                        Err(RecvError::Lagged(missed)) => {
                            mlog_warn!("HoldPolicy: bus lagged, {} notifications missed", missed);
                            continue;
                        }
                        Err(RecvError::Closed) => {
                            mlog_debug!("HoldPolicy: bus closed");
                            break;
                        }
                    },
                    _ = sleep_until_deadline(deadline) => {
                        let intent = self.tracker.on_timer(Instant::now());
                        if intent.is_some() {
                            mlog!("HoldPolicy: hold expired, resuming rotation");
                        }
                        intent
                    }
                };

                phase_tx.send_replace(self.tracker.phase());

                if let Some(intent) = intent {
                    if self.command_tx.send(Command::new(Origin::Hold, intent)).is_err() {
                        mlog_error!("HoldPolicy: coordinator channel closed");
                        break;
                    }
                }
            }
        });

        HoldHandle {
            phase: phase_rx,
            actor: ActorHandle::new(cancel),
        }
    }
}
