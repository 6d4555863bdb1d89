//! Pub/sub-topic observer.
//!
//! Maps notification names on the bus to activity signals, e.g. voice
//! assistant session topics forwarded through `POST /notify`, or a mode
//! toggle that carries `{active: bool}` in its payload.
//!
//! An end topic can get lost, so an activation only lasts `max_active_ms`
//! unless another activation renews it.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::actors::{sleep_until_deadline, ActorHandle, SignalSink, Timer};
use crate::bus::{Notification, NotificationBus};
use crate::config::BusObserverConfig;
use crate::scene::SignalKind;
use crate::{mlog, mlog_debug, mlog_warn};

use super::SignalObserver;

pub struct BusObserver {
    activity: String,
    activate_on: HashSet<String>,
    deactivate_on: HashSet<String>,
    stop_on: HashSet<String>,
    active_field: Option<String>,
    max_active: Duration,
    /// Subscribed on construction; the observer keeps no sender, so the
    /// bus closes once every publisher is gone.
    rx: broadcast::Receiver<Notification>,
}

impl BusObserver {
    pub fn new(activity: &str, config: &BusObserverConfig, bus: &NotificationBus) -> Self {
        Self {
            activity: activity.to_string(),
            activate_on: config.activate_on.iter().cloned().collect(),
            deactivate_on: config.deactivate_on.iter().cloned().collect(),
            stop_on: config.stop_on.iter().cloned().collect(),
            active_field: config.active_field.clone(),
            max_active: Duration::from_millis(config.max_active_ms),
            rx: bus.subscribe(),
        }
    }

    /// Which signal, if any, a notification stands for.
    pub fn classify(&self, notification: &Notification) -> Option<SignalKind> {
        let name = notification.name.as_str();
        if self.stop_on.contains(name) {
            return Some(SignalKind::Stop);
        }
        if self.deactivate_on.contains(name) {
            return Some(SignalKind::Deactivate);
        }
        if self.activate_on.contains(name) {
            return match &self.active_field {
                None => Some(SignalKind::Activate),
                Some(field) => match notification.bool_field(field) {
                    Some(true) => Some(SignalKind::Activate),
                    Some(false) => Some(SignalKind::Deactivate),
                    None => {
                        mlog_warn!(
                            "BusObserver[{}]: {} without boolean {:?}, ignored",
                            self.activity,
                            name,
                            field
                        );
                        None
                    }
                },
            };
        }
        None
    }
}

impl SignalObserver for BusObserver {
    fn activity(&self) -> &str {
        &self.activity
    }

    fn spawn(mut self: Box<Self>, sink: SignalSink, cancel: CancellationToken) -> ActorHandle {
        let cancel_clone = cancel.clone();

        mlog_debug!(
            "BusObserver::spawn activity={} max_active={:?}",
            self.activity,
            self.max_active
        );

        tokio::spawn(async move {
            let mut fallback = Timer::default();

            loop {
                let deadline = fallback.deadline();
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        mlog_debug!("BusObserver[{}] cancelled", self.activity);
                        break;
                    }
                    _ = sleep_until_deadline(deadline) => {
                        fallback.cancel();
                        mlog_warn!(
                            "BusObserver[{}]: no end notification within {:?}, deactivating",
                            self.activity,
                            self.max_active
                        );
                        sink.emit(&self.activity, SignalKind::Deactivate);
                    }
                    received = self.rx.recv() => match received {
                        Ok(notification) => {
                            let Some(kind) = self.classify(&notification) else { continue };
                            mlog!("BusObserver[{}]: {} -> {:?}", self.activity, notification.name, kind);
                            match kind {
                                SignalKind::Activate if !self.max_active.is_zero() => {
                                    fallback.arm(Instant::now(), self.max_active);
                                }
                                SignalKind::Activate => {}
                                SignalKind::Deactivate | SignalKind::Stop => {
                                    fallback.cancel();
                                }
                            }
                            sink.emit(&self.activity, kind);
                        }
                        Err(RecvError::Lagged(missed)) => {
                            mlog_warn!("BusObserver[{}]: lagged, {} notifications missed", self.activity, missed);
                        }
                        Err(RecvError::Closed) => {
                            mlog_warn!("BusObserver[{}]: bus closed, stopping activity", self.activity);
                            sink.emit(&self.activity, SignalKind::Stop);
                            break;
                        }
                    },
                }
            }
        });

        ActorHandle::new(cancel)
    }
}
