//! Actor system for scene coordination.
//!
//! Each actor is an independent tokio task that talks to the others via
//! message passing:
//! - `IntentEmitter`: one per activity, turns signals into PLAY intents
//! - `SceneCoordinator`: single funnel to the scene player
//! - `HoldPolicy`: pauses rotation while someone interacts
//! - `ScenePlayer`: reference player for standalone runs
//! - `SignalRouter`: not a task; hands observers a sink that reaches the owning emitter
//!
//! Timers live inside the actor that owns them as a [`Timer`] deadline, so
//! arming, re-arming and cancelling are plain state mutations on one task.

pub mod coordinator;
pub mod emitter;
pub mod hold;
pub mod player;
pub mod router;

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use coordinator::{CoordinatorHandle, SceneCoordinator};
pub use emitter::{ActivityTracker, EmitterHandle, IntentEmitter, Transition};
pub use hold::{HoldHandle, HoldPhase, HoldPolicy, HoldTracker};
pub use player::{PlayerHandle, PlayerStatus, ScenePlayer};
pub use router::{SignalRouter, SignalSink};

/// Handle to a running actor, used for graceful shutdown.
#[derive(Clone)]
pub struct ActorHandle {
    cancel: CancellationToken,
}

impl ActorHandle {
    /// Create a new actor handle with a cancellation token.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Signal the actor to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// A cancellable one-shot deadline owned by a single actor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    /// Arm (or re-arm) the timer. Any previous deadline is discarded.
    pub fn arm(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    /// Cancel the timer. Returns whether it was armed.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

/// Sleep until `deadline`, or forever when there is none.
///
/// Takes the deadline by value so a `select!` loop can mutate the owning
/// timer in any branch.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
