//! Wiring of every component into one running system.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actors::{
    ActorHandle, CoordinatorHandle, HoldHandle, HoldPhase, HoldPolicy, IntentEmitter, PlayerHandle,
    PlayerStatus, SceneCoordinator, ScenePlayer, SignalRouter, SignalSink,
};
use crate::bus::NotificationBus;
use crate::config::Config;
use crate::http::{self, HttpState};
use crate::observers;
use crate::{mlog, mlog_debug, mlog_error, Result};

/// All running actors plus the handles needed to talk to them.
pub struct SceneSystem {
    bus: NotificationBus,
    cancel: CancellationToken,
    player: PlayerHandle,
    coordinator: CoordinatorHandle,
    router: SignalRouter,
    hold: Option<HoldHandle>,
    observers: Vec<ActorHandle>,
    http_addr: Option<SocketAddr>,
    http_task: Option<JoinHandle<Result<()>>>,
}

impl SceneSystem {
    /// Start with the reference scene player.
    pub async fn start(config: Config, bus: NotificationBus) -> Result<Self> {
        let player = ScenePlayer::from_config(&config);
        Self::start_with_player(config, bus, player).await
    }

    pub async fn start_with_player(
        config: Config,
        bus: NotificationBus,
        player: ScenePlayer,
    ) -> Result<Self> {
        config.validate()?;
        let cancel = CancellationToken::new();
        // Everything spawned below stops again if a later step fails.
        let guard = cancel.clone().drop_guard();

        mlog_debug!(
            "SceneSystem::start activities={} order={:?}",
            config.activities.len(),
            config.linear_order
        );

        let player = player.with_bus(bus.clone()).spawn_with_token(cancel.child_token());

        let coordinator = SceneCoordinator::from_config(&config, player.sender())
            .with_bus(bus.clone())
            .spawn_with_token(cancel.child_token());

        let router = SignalRouter::new(config.activities.iter().map(|activity| {
            IntentEmitter::new(activity, coordinator.sender()).spawn_with_token(cancel.child_token())
        }));

        let hold = config.hold.enabled.then(|| {
            HoldPolicy::new(&config.hold, bus.clone(), coordinator.sender())
                .spawn_with_token(cancel.child_token())
        });

        let mut observer_handles = Vec::new();
        for activity in &config.activities {
            if let Some(observer) = observers::build(activity, &bus)? {
                mlog_debug!("Starting observer for {}", observer.activity());
                observer_handles.push(observer.spawn(router.sink(), cancel.child_token()));
            }
        }

        let (http_addr, http_task) = if config.http.enabled {
            let listener = TcpListener::bind(config.bind_addr()?).await?;
            let addr = listener.local_addr()?;
            let state = HttpState::new(coordinator.clone(), router.sink(), bus.clone(), &config.activities)
                .with_known_scenes(config.known_scenes())
                .with_reply_timeout(config.ack_timeout() + config.query_timeout());
            let task = tokio::spawn(http::serve(listener, state, cancel.child_token()));
            (Some(addr), Some(task))
        } else {
            (None, None)
        };

        mlog!(
            "Scene system started: {} activities, {} observers, hold {}, http {}",
            config.activities.len(),
            observer_handles.len(),
            if hold.is_some() { "on" } else { "off" },
            http_addr.map_or_else(|| "off".to_string(), |a| a.to_string())
        );

        let cancel = guard.disarm();
        Ok(Self {
            bus,
            cancel,
            player,
            coordinator,
            router,
            hold,
            observers: observer_handles,
            http_addr,
            http_task,
        })
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn sink(&self) -> SignalSink {
        self.router.sink()
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    pub fn player(&self) -> &PlayerHandle {
        &self.player
    }

    pub fn player_status(&self) -> PlayerStatus {
        self.player.status()
    }

    pub fn hold_phase(&self) -> Option<HoldPhase> {
        self.hold.as_ref().map(HoldHandle::phase)
    }

    /// Address the HTTP endpoint actually bound (useful with port 0).
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Stop every actor and wait for the HTTP endpoint to drain.
    pub async fn shutdown(self) {
        mlog_debug!("Shutting down {} observers", self.observers.len());
        for observer in &self.observers {
            observer.shutdown();
        }
        self.router.shutdown();
        if let Some(hold) = &self.hold {
            hold.shutdown();
        }
        self.coordinator.shutdown();
        self.player.shutdown();
        self.cancel.cancel();

        if let Some(task) = self.http_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => mlog_error!("HTTP endpoint failed: {}", e),
                Err(e) => mlog_error!("HTTP endpoint task panicked: {}", e),
            }
        }
        mlog!("Scene system stopped");
    }
}
