//! Shared vocabulary for scene coordination.
//!
//! Observers produce [`ActivitySignal`]s, emitters and manual controls turn
//! them into [`Command`]s for the coordinator, and the coordinator speaks
//! [`PlayerCommand`] to whatever actually switches scenes.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Direction for relative navigation through the linear order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Prev,
}

impl Direction {
    fn step(self) -> isize {
        match self {
            Direction::Next => 1,
            Direction::Prev => -1,
        }
    }

    /// Bus notification name used for manual relative navigation.
    pub fn notification(self) -> &'static str {
        match self {
            Direction::Next => notifications::SCENES_NEXT,
            Direction::Prev => notifications::SCENES_PREV,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Next => write!(f, "next"),
            Direction::Prev => write!(f, "prev"),
        }
    }
}

/// Acknowledgment callback attached to a PLAY.
///
/// Fired by the scene player once the scene switch has been applied.
#[derive(Debug)]
pub struct Ack(oneshot::Sender<()>);

impl Ack {
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Signal completion. A dropped receiver is not an error.
    pub fn fire(self) {
        let _ = self.0.send(());
    }
}

/// A scene-control intent.
#[derive(Debug)]
pub enum Intent {
    Play { scene: String, ack: Option<Ack> },
    Pause,
    Resume,
    Relative(Direction),
}

impl Intent {
    pub fn play(scene: impl Into<String>) -> Self {
        Intent::Play {
            scene: scene.into(),
            ack: None,
        }
    }

    /// PLAY with an acknowledgment receiver.
    pub fn play_acked(scene: impl Into<String>) -> (Self, oneshot::Receiver<()>) {
        let (ack, rx) = Ack::channel();
        (
            Intent::Play {
                scene: scene.into(),
                ack: Some(ack),
            },
            rx,
        )
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, Intent::Relative(_))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Play { scene, .. } => write!(f, "PLAY({})", scene),
            Intent::Pause => write!(f, "PAUSE"),
            Intent::Resume => write!(f, "RESUME"),
            Intent::Relative(dir) => write!(f, "{}", dir.to_string().to_uppercase()),
        }
    }
}

/// Who asked for a command. Recorded so arbitration can grow beyond
/// last-writer-wins without touching the producers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// An activity's intent emitter.
    Activity(String),
    /// A person: HTTP control endpoint, voice command, remote.
    Manual,
    /// The extension/hold policy.
    Hold,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Activity(name) => write!(f, "activity:{}", name),
            Origin::Manual => write!(f, "manual"),
            Origin::Hold => write!(f, "hold"),
        }
    }
}

/// An intent plus its origin, as delivered to the coordinator.
#[derive(Debug)]
pub struct Command {
    pub origin: Origin,
    pub intent: Intent,
}

impl Command {
    pub fn new(origin: Origin, intent: Intent) -> Self {
        Self { origin, intent }
    }
}

/// `{name}` part of a scene-query response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRef {
    pub name: String,
}

/// Response to a current-scene query: `{"currentScene": {"name": ...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneQueryResponse {
    #[serde(default)]
    pub current_scene: Option<SceneRef>,
}

impl SceneQueryResponse {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            current_scene: Some(SceneRef { name: name.into() }),
        }
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current_scene.as_ref().map(|s| s.name.as_str())
    }
}

/// Outbound commands consumed by the scene player.
#[derive(Debug)]
pub enum PlayerCommand {
    Play { scene: String, ack: Option<Ack> },
    Pause,
    Resume,
    /// Current-scene query; expects exactly one reply.
    Query {
        reply: oneshot::Sender<SceneQueryResponse>,
    },
}

/// Kind of activity signal an observer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Ownership conditions confirmed.
    Activate,
    /// Signal lost; the release grace timer applies.
    Deactivate,
    /// Clean stop or unreadable source; release without grace.
    Stop,
}

/// `{type: "activate"|"deactivate"|"stop", activity: "<name>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySignal {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub activity: String,
}

impl ActivitySignal {
    pub fn new(activity: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            kind,
            activity: activity.into(),
        }
    }
}

/// Per-activity ownership state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    #[default]
    Inactive,
    Active,
    Releasing,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityState::Inactive => write!(f, "inactive"),
            ActivityState::Active => write!(f, "active"),
            ActivityState::Releasing => write!(f, "releasing"),
        }
    }
}

/// Compute the scene a relative step lands on.
///
/// A current scene absent from `order` counts as index -1, so NEXT lands on
/// `order[0]`. Returns `None` only when `order` is empty.
pub fn resolve_relative(order: &[String], current: Option<&str>, dir: Direction) -> Option<String> {
    if order.is_empty() {
        return None;
    }
    let len = order.len() as isize;
    let idx = current
        .and_then(|name| order.iter().position(|s| s == name))
        .map(|i| i as isize)
        .unwrap_or(-1);
    let next = (idx + dir.step() + len).rem_euclid(len);
    order.get(next as usize).cloned()
}

/// Notification names shared with the host bus.
pub mod notifications {
    pub const SCENES_PLAY: &str = "SCENES_PLAY";
    pub const SCENES_NEXT: &str = "SCENES_NEXT";
    pub const SCENES_PREV: &str = "SCENES_PREV";
    pub const SCENES_PAUSE: &str = "SCENES_PAUSE";
    pub const SCENES_RESUME: &str = "SCENES_RESUME";
    pub const SCENE_CHANGED: &str = "SCENE_CHANGED";
    pub const CLOWN_MODE_CHANGED: &str = "CLOWN_MODE_CHANGED";
    pub const VOLUME_UP: &str = "VOLUME_UP";
    pub const VOLUME_DOWN: &str = "VOLUME_DOWN";
    pub const USER_PRESENCE: &str = "USER_PRESENCE";
}
