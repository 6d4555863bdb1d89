//! HTTP control endpoint.
//!
//! Drives HTTP-kind activities, accepts manual scene commands and bridges
//! external notifications (voice assistant, MQTT relays) onto the bus.
//! Every reply is `{"success": bool, "message": string}`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::actors::{CoordinatorHandle, SignalSink};
use crate::bus::{Notification, NotificationBus};
use crate::config::{ActivityConfig, ObserverConfig};
use crate::scene::{ActivitySignal, ActivityState, Direction, Intent, Origin, SignalKind};
use crate::{mlog, mlog_debug, mlog_warn, Result};

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared context passed to every handler.
#[derive(Clone)]
pub struct HttpState {
    coordinator: CoordinatorHandle,
    sink: SignalSink,
    bus: NotificationBus,
    /// HTTP-driven activities and the notification each one announces.
    http_activities: Arc<HashMap<String, Option<String>>>,
    known_scenes: Arc<HashSet<String>>,
    /// The endpoint's own on/off view of each HTTP activity, for toggle.
    toggles: Arc<Mutex<HashMap<String, bool>>>,
    reply_timeout: Duration,
}

impl HttpState {
    pub fn new(
        coordinator: CoordinatorHandle,
        sink: SignalSink,
        bus: NotificationBus,
        activities: &[ActivityConfig],
    ) -> Self {
        let http_activities = activities
            .iter()
            .filter(|a| matches!(a.observer, ObserverConfig::Http))
            .map(|a| (a.name.clone(), a.announce.clone()))
            .collect();
        Self {
            coordinator,
            sink,
            bus,
            http_activities: Arc::new(http_activities),
            known_scenes: Arc::new(HashSet::new()),
            toggles: Arc::new(Mutex::new(HashMap::new())),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// Reject `/scenes/play` for scenes outside this set. Empty accepts all.
    pub fn with_known_scenes(mut self, known: HashSet<String>) -> Self {
        self.known_scenes = Arc::new(known);
        self
    }

    /// How long `/scenes/play` waits for the player before replying.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    fn set_view(&self, activity: &str, on: bool) {
        let mut toggles = self.toggles.lock().unwrap_or_else(|e| e.into_inner());
        toggles.insert(activity.to_string(), on);
    }

    fn flip_view(&self, activity: &str) -> bool {
        let mut toggles = self.toggles.lock().unwrap_or_else(|e| e.into_inner());
        let view = toggles.entry(activity.to_string()).or_insert(false);
        *view = !*view;
        *view
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Reply {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusReply {
    pub success: bool,
    pub message: String,
    pub activities: BTreeMap<String, ActivityState>,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub scene: String,
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

type ApiResponse = (StatusCode, Json<Reply>);

fn ok(message: impl Into<String>) -> ApiResponse {
    (
        StatusCode::OK,
        Json(Reply {
            success: true,
            message: message.into(),
        }),
    )
}

fn fail(status: StatusCode, message: impl Into<String>) -> ApiResponse {
    let message = message.into();
    mlog_warn!("HTTP {}: {}", status.as_u16(), message);
    (
        status,
        Json(Reply {
            success: false,
            message,
        }),
    )
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/activity/:name/:action", post(activity))
        .route("/scenes/play", post(play_scene))
        .route(
            "/scenes/pause",
            post(|State(state): State<HttpState>| async move { manual(&state, Intent::Pause) }),
        )
        .route(
            "/scenes/resume",
            post(|State(state): State<HttpState>| async move { manual(&state, Intent::Resume) }),
        )
        .route(
            "/scenes/next",
            post(|State(state): State<HttpState>| async move {
                manual(&state, Intent::Relative(Direction::Next))
            }),
        )
        .route(
            "/scenes/prev",
            post(|State(state): State<HttpState>| async move {
                manual(&state, Intent::Relative(Direction::Prev))
            }),
        )
        .route("/notify", post(notify))
        .with_state(state)
}

/// Serve on an already bound listener until `cancel` fires.
pub async fn serve(listener: TcpListener, state: HttpState, cancel: CancellationToken) -> Result<()> {
    mlog!("HTTP control endpoint listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    mlog_debug!("HTTP control endpoint stopped");
    Ok(())
}

async fn health() -> ApiResponse {
    ok(format!("mirror-scenes {}", env!("CARGO_PKG_VERSION")))
}

async fn status(State(state): State<HttpState>) -> Json<StatusReply> {
    let activities = state.sink.states();
    Json(StatusReply {
        success: true,
        message: format!("{} activities", activities.len()),
        activities,
    })
}

async fn activity(
    State(state): State<HttpState>,
    Path((name, action)): Path<(String, String)>,
) -> ApiResponse {
    if !state.sink.contains(&name) {
        return fail(StatusCode::NOT_FOUND, format!("unknown activity {}", name));
    }
    let Some(announce) = state.http_activities.get(&name) else {
        return fail(
            StatusCode::CONFLICT,
            format!("activity {} is not driven over HTTP", name),
        );
    };

    let (kind, active) = match action.as_str() {
        "on" => (SignalKind::Activate, true),
        "off" => (SignalKind::Deactivate, false),
        "stop" => (SignalKind::Stop, false),
        "toggle" => {
            if state.flip_view(&name) {
                (SignalKind::Activate, true)
            } else {
                (SignalKind::Deactivate, false)
            }
        }
        other => return fail(StatusCode::NOT_FOUND, format!("unknown action {}", other)),
    };
    state.set_view(&name, active);

    if let Err(e) = state.sink.send(ActivitySignal::new(&name, kind)) {
        return fail(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
    }
    if let Some(announce) = announce {
        state.bus.publish(
            Notification::new(announce)
                .with_payload(json!({ "activity": name, "active": active }))
                .from_sender("http"),
        );
    }
    ok(format!("{} {:?}", name, kind).to_lowercase())
}

async fn play_scene(State(state): State<HttpState>, Json(req): Json<PlayRequest>) -> ApiResponse {
    if !state.known_scenes.is_empty() && !state.known_scenes.contains(&req.scene) {
        return fail(StatusCode::BAD_REQUEST, format!("unknown scene {}", req.scene));
    }

    let (intent, applied) = Intent::play_acked(&req.scene);
    if let Err(e) = state.coordinator.submit(Origin::Manual, intent) {
        return fail(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
    }
    match tokio::time::timeout(state.reply_timeout, applied).await {
        Ok(Ok(())) => ok(format!("playing {}", req.scene)),
        Ok(Err(_)) => fail(StatusCode::BAD_REQUEST, format!("PLAY({}) dropped", req.scene)),
        // Still queued behind a scene query; it will apply.
        Err(_) => ok(format!("PLAY({}) accepted", req.scene)),
    }
}

fn manual(state: &HttpState, intent: Intent) -> ApiResponse {
    let label = intent.to_string();
    match state.coordinator.submit(Origin::Manual, intent) {
        Ok(()) => ok(format!("{} accepted", label)),
        Err(e) => fail(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn notify(State(state): State<HttpState>, Json(req): Json<NotifyRequest>) -> ApiResponse {
    if req.name.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "notification name is empty");
    }
    let delivered = state.bus.publish(
        Notification::new(&req.name)
            .with_payload(req.payload)
            .from_sender("http"),
    );
    ok(format!("{} delivered to {} subscribers", req.name, delivered))
}
