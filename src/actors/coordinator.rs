//! Scene coordinator: the single funnel between intent producers and the
//! scene player.
//!
//! Absolute intents (PLAY/PAUSE/RESUME) are forwarded as-is. Relative
//! intents ask the player for the current scene, wait a bounded time for
//! the answer and then PLAY the neighbour in the linear order. Only one
//! query is in flight at a time; commands arriving meanwhile are held back
//! in arrival order, with consecutive relative requests collapsed to the
//! latest one.
//!
//! Manual commands are echoed on the notification bus once applied (scene
//! changes only after the player acknowledged them), which is what the
//! hold policy keys its timer on.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::bus::{Notification, NotificationBus};
use crate::config::Config;
use crate::scene::{
    notifications, resolve_relative, Ack, Command, Direction, Intent, Origin, PlayerCommand,
};
use crate::{mlog, mlog_debug, mlog_error, mlog_warn, Error, Result};

use super::ActorHandle;

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(1000);
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(1000);

/// How a current-scene query ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum QueryAnswer {
    Answered(Option<String>),
    TimedOut,
    Unanswered,
}

struct RelativeOutcome {
    origin: Origin,
    direction: Direction,
    answer: QueryAnswer,
}

type InFlight = BoxFuture<'static, RelativeOutcome>;

/// Handle to the running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Command>,
    actor: ActorHandle,
}

impl CoordinatorHandle {
    pub fn submit(&self, origin: Origin, intent: Intent) -> Result<()> {
        self.tx
            .send(Command::new(origin, intent))
            .map_err(|_| Error::ChannelClosed("coordinator"))
    }

    /// Raw command sender for emitters and the hold policy.
    pub fn sender(&self) -> mpsc::UnboundedSender<Command> {
        self.tx.clone()
    }

    pub fn shutdown(&self) {
        self.actor.shutdown();
    }
}

pub struct SceneCoordinator {
    order: Vec<String>,
    known: HashSet<String>,
    query_timeout: Duration,
    ack_timeout: Duration,
    player_tx: mpsc::UnboundedSender<PlayerCommand>,
    bus: Option<NotificationBus>,
}

impl SceneCoordinator {
    pub fn new(order: Vec<String>, player_tx: mpsc::UnboundedSender<PlayerCommand>) -> Self {
        Self {
            order,
            known: HashSet::new(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            player_tx,
            bus: None,
        }
    }

    pub fn from_config(config: &Config, player_tx: mpsc::UnboundedSender<PlayerCommand>) -> Self {
        Self::new(config.linear_order.clone(), player_tx)
            .with_known_scenes(config.known_scenes())
            .with_query_timeout(config.query_timeout())
            .with_ack_timeout(config.ack_timeout())
    }

    /// Restrict PLAY to these scenes. Empty accepts anything.
    pub fn with_known_scenes(mut self, known: HashSet<String>) -> Self {
        self.known = known;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_bus(mut self, bus: NotificationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn spawn(self) -> CoordinatorHandle {
        self.spawn_with_token(CancellationToken::new())
    }

    pub fn spawn_with_token(self, cancel: CancellationToken) -> CoordinatorHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let cancel_clone = cancel.clone();

        mlog_debug!(
            "SceneCoordinator::spawn order={:?} known={} query_timeout={:?}",
            self.order,
            self.known.len(),
            self.query_timeout
        );

        tokio::spawn(async move {
            let mut inflight: Option<InFlight> = None;
            let mut backlog: VecDeque<Command> = VecDeque::new();

            loop {
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        mlog_debug!("SceneCoordinator cancelled");
                        break;
                    }
                    cmd = rx.recv() => {
                        let Some(cmd) = cmd else {
                            mlog_debug!("SceneCoordinator: command channel closed");
                            break;
                        };
                        if inflight.is_some() {
                            enqueue(&mut backlog, cmd);
                        } else {
                            inflight = self.dispatch(cmd);
                        }
                    }
                    outcome = await_inflight(&mut inflight), if inflight.is_some() => {
                        inflight = None;
                        self.finish_relative(outcome);
                        while let Some(cmd) = backlog.pop_front() {
                            if let Some(next) = self.dispatch(cmd) {
                                inflight = Some(next);
                                break;
                            }
                        }
                    }
                }
            }
        });

        CoordinatorHandle {
            tx,
            actor: ActorHandle::new(cancel),
        }
    }

    /// Apply one command. Returns the pending query for relative intents.
    fn dispatch(&self, cmd: Command) -> Option<InFlight> {
        let Command { origin, intent } = cmd;
        match intent {
            Intent::Play { scene, ack } => {
                self.play(origin, scene, ack, notifications::SCENES_PLAY);
                None
            }
            Intent::Pause => {
                mlog!("PAUSE from {}", origin);
                self.forward(PlayerCommand::Pause);
                if origin == Origin::Manual {
                    self.publish(Notification::new(notifications::SCENES_PAUSE));
                }
                None
            }
            Intent::Resume => {
                mlog!("RESUME from {}", origin);
                self.forward(PlayerCommand::Resume);
                if origin == Origin::Manual {
                    self.publish(Notification::new(notifications::SCENES_RESUME));
                }
                None
            }
            Intent::Relative(direction) => self.start_query(origin, direction),
        }
    }

    fn start_query(&self, origin: Origin, direction: Direction) -> Option<InFlight> {
        if self.order.is_empty() {
            mlog_warn!("{} from {} dropped: no linear order configured", direction, origin);
            return None;
        }
        mlog_debug!("{} from {}: querying current scene", direction, origin);

        let (reply_tx, reply_rx) = oneshot::channel();
        self.forward(PlayerCommand::Query { reply: reply_tx });

        let timeout = self.query_timeout;
        Some(Box::pin(async move {
            let answer = match tokio::time::timeout(timeout, reply_rx).await {
                Ok(Ok(resp)) => QueryAnswer::Answered(resp.current_name().map(String::from)),
                Ok(Err(_)) => QueryAnswer::Unanswered,
                Err(_) => QueryAnswer::TimedOut,
            };
            RelativeOutcome {
                origin,
                direction,
                answer,
            }
        }))
    }

    fn finish_relative(&self, outcome: RelativeOutcome) {
        let RelativeOutcome {
            origin,
            direction,
            answer,
        } = outcome;

        let target = match &answer {
            QueryAnswer::Answered(current) => {
                resolve_relative(&self.order, current.as_deref(), direction)
            }
            QueryAnswer::TimedOut => {
                mlog_warn!(
                    "{}: scene query timed out after {:?}, falling back to first scene",
                    direction,
                    self.query_timeout
                );
                self.order.first().cloned()
            }
            QueryAnswer::Unanswered => {
                mlog_warn!("{}: scene query dropped by player, falling back to first scene", direction);
                self.order.first().cloned()
            }
        };

        if let Some(scene) = target {
            mlog!("{} from {} resolved to {}", direction, origin, scene);
            self.play(origin, scene, None, direction.notification());
        }
    }

    fn play(&self, origin: Origin, scene: String, ack: Option<Ack>, notification: &'static str) {
        if !self.known.is_empty() && !self.known.contains(&scene) {
            mlog_warn!("PLAY({}) from {} dropped: {}", scene, origin, Error::UnknownScene(scene.clone()));
            return;
        }
        mlog!("PLAY({}) from {}", scene, origin);

        if origin != Origin::Manual {
            self.forward(PlayerCommand::Play { scene, ack });
            return;
        }

        // Manual changes are announced only once the player applied them.
        let (own_ack, applied) = Ack::channel();
        self.forward(PlayerCommand::Play {
            scene: scene.clone(),
            ack: Some(own_ack),
        });

        let bus = self.bus.clone();
        let ack_timeout = self.ack_timeout;
        tokio::spawn(async move {
            if tokio::time::timeout(ack_timeout, applied).await.is_err() {
                mlog_warn!("PLAY({}) not acknowledged within {:?}", scene, ack_timeout);
            }
            if let Some(ack) = ack {
                ack.fire();
            }
            if let Some(bus) = bus {
                bus.publish(
                    Notification::new(notification)
                        .with_payload(json!({ "scene": scene }))
                        .from_sender("coordinator"),
                );
            }
        });
    }

    fn forward(&self, cmd: PlayerCommand) {
        if self.player_tx.send(cmd).is_err() {
            mlog_error!("SceneCoordinator: scene player channel closed, command lost");
        }
    }

    fn publish(&self, notification: Notification) {
        if let Some(bus) = &self.bus {
            bus.publish(notification.from_sender("coordinator"));
        }
    }
}

/// Queue a command behind an in-flight query; a relative request replaces a
/// relative request directly ahead of it.
fn enqueue(backlog: &mut VecDeque<Command>, cmd: Command) {
    if cmd.intent.is_relative() {
        if let Some(last) = backlog.back_mut() {
            if last.intent.is_relative() {
                mlog_debug!("{} supersedes queued {}", cmd.intent, last.intent);
                *last = cmd;
                return;
            }
        }
    }
    backlog.push_back(cmd);
}

async fn await_inflight(inflight: &mut Option<InFlight>) -> RelativeOutcome {
    match inflight {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}
