//! Intent emitter: one per activity.
//!
//! Turns an observer's activate/deactivate/stop signals into at most one
//! `PLAY(target)` per activation and at most one `PLAY(return)` per release.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ActivityConfig;
use crate::scene::{ActivityState, Command, Intent, Origin, SignalKind};
use crate::{mlog, mlog_debug, mlog_error};

use super::{sleep_until_deadline, ActorHandle, Timer};

/// An ownership change the emitter has to announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Inactive -> Active: play the target scene.
    Claimed,
    /// Releasing/Active -> Inactive: play the return scene.
    Released,
}

/// Pure per-activity state machine with its release timer.
///
/// Every handler cancels the armed timer before doing anything else, then
/// re-arms it only when the new state needs one.
#[derive(Debug)]
pub struct ActivityTracker {
    state: ActivityState,
    release: Timer,
    hold: Duration,
}

impl ActivityTracker {
    pub fn new(hold: Duration) -> Self {
        Self {
            state: ActivityState::Inactive,
            release: Timer::default(),
            hold,
        }
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    pub fn release_deadline(&self) -> Option<Instant> {
        self.release.deadline()
    }

    pub fn on_signal(&mut self, kind: SignalKind, now: Instant) -> Option<Transition> {
        match kind {
            SignalKind::Activate => self.activate(),
            SignalKind::Deactivate => self.deactivate(now),
            SignalKind::Stop => self.stop(),
        }
    }

    fn activate(&mut self) -> Option<Transition> {
        self.release.cancel();
        match self.state {
            ActivityState::Inactive => {
                self.state = ActivityState::Active;
                Some(Transition::Claimed)
            }
            // Signal came back within the grace window: still owning.
            ActivityState::Releasing => {
                self.state = ActivityState::Active;
                None
            }
            ActivityState::Active => None,
        }
    }

    fn deactivate(&mut self, now: Instant) -> Option<Transition> {
        self.release.cancel();
        match self.state {
            ActivityState::Inactive => None,
            ActivityState::Active | ActivityState::Releasing => {
                if self.hold.is_zero() {
                    self.state = ActivityState::Inactive;
                    return Some(Transition::Released);
                }
                self.state = ActivityState::Releasing;
                self.release.arm(now, self.hold);
                None
            }
        }
    }

    fn stop(&mut self) -> Option<Transition> {
        self.release.cancel();
        match self.state {
            ActivityState::Inactive => None,
            ActivityState::Active | ActivityState::Releasing => {
                self.state = ActivityState::Inactive;
                Some(Transition::Released)
            }
        }
    }

    /// Called when the release deadline passes.
    pub fn on_timer(&mut self, now: Instant) -> Option<Transition> {
        if !self.release.has_expired(now) {
            return None;
        }
        self.release.cancel();
        if self.state == ActivityState::Releasing {
            self.state = ActivityState::Inactive;
            return Some(Transition::Released);
        }
        None
    }
}

/// Handle returned by [`IntentEmitter::spawn`].
pub struct EmitterHandle {
    pub activity: String,
    signals: mpsc::UnboundedSender<SignalKind>,
    state: watch::Receiver<ActivityState>,
    actor: ActorHandle,
}

impl EmitterHandle {
    /// Deliver a signal. Returns false when the emitter is gone.
    pub fn signal(&self, kind: SignalKind) -> bool {
        self.signals.send(kind).is_ok()
    }

    pub fn state(&self) -> ActivityState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ActivityState> {
        self.state.clone()
    }

    pub fn shutdown(&self) {
        self.actor.shutdown();
    }
}

/// Actor that owns one activity's tracker and speaks to the coordinator.
pub struct IntentEmitter {
    activity: String,
    target_scene: String,
    return_scene: String,
    tracker: ActivityTracker,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl IntentEmitter {
    pub fn new(config: &ActivityConfig, command_tx: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            activity: config.name.clone(),
            target_scene: config.target_scene.clone(),
            return_scene: config.return_scene.clone(),
            tracker: ActivityTracker::new(config.hold_duration()),
            command_tx,
        }
    }

    pub fn spawn(self) -> EmitterHandle {
        self.spawn_with_token(CancellationToken::new())
    }

    pub fn spawn_with_token(mut self, cancel: CancellationToken) -> EmitterHandle {
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<SignalKind>();
        let (state_tx, state_rx) = watch::channel(ActivityState::Inactive);
        let activity = self.activity.clone();
        let cancel_clone = cancel.clone();

        mlog_debug!("IntentEmitter::spawn activity={}", activity);

        tokio::spawn(async move {
            loop {
                let deadline = self.tracker.release_deadline();
                let transition = tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        mlog_debug!("IntentEmitter[{}] cancelled", self.activity);
                        break;
                    }
                    signal = signal_rx.recv() => {
                        let Some(kind) = signal else {
                            mlog_debug!("IntentEmitter[{}]: signal channel closed", self.activity);
                            break;
                        };
                        let before = self.tracker.state();
                        let transition = self.tracker.on_signal(kind, Instant::now());
                        mlog_debug!(
                            "IntentEmitter[{}]: {:?} {} -> {}",
                            self.activity, kind, before, self.tracker.state()
                        );
                        transition
                    }
                    _ = sleep_until_deadline(deadline) => {
                        mlog_debug!("IntentEmitter[{}]: release timer fired", self.activity);
                        self.tracker.on_timer(Instant::now())
                    }
                };

                state_tx.send_replace(self.tracker.state());

                if let Some(transition) = transition {
                    if !self.emit(transition) {
                        mlog_error!("IntentEmitter[{}]: coordinator channel closed", self.activity);
                        break;
                    }
                }
            }
        });

        EmitterHandle {
            activity,
            signals: signal_tx,
            state: state_rx,
            actor: ActorHandle::new(cancel),
        }
    }

    fn emit(&self, transition: Transition) -> bool {
        let scene = match transition {
            Transition::Claimed => &self.target_scene,
            Transition::Released => &self.return_scene,
        };
        mlog!(
            "{}: {:?}, requesting PLAY({})",
            self.activity,
            transition,
            scene
        );
        self.command_tx
            .send(Command::new(
                Origin::Activity(self.activity.clone()),
                Intent::play(scene.clone()),
            ))
            .is_ok()
    }
}
