//! Signal observers.
//!
//! An observer watches one external condition and reports activate,
//! deactivate and stop transitions for one activity into a [`SignalSink`].
//! Observers never return errors to anyone: a source they cannot read is an
//! immediate `Stop`.
//!
//! - `FileObserver`: metadata file mtime and content (AirPlay receiver)
//! - `CommandObserver`: periodic shell probe
//! - `BusObserver`: notification names on the bus (voice assistant topics)
//!
//! Activities with the `http` observer kind are driven by the HTTP control
//! endpoint instead and have no observer task.

pub mod bus;
pub mod command;
pub mod file;

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::actors::{ActorHandle, SignalSink};
use crate::bus::NotificationBus;
use crate::config::{ActivityConfig, ObserverConfig};
use crate::scene::SignalKind;
use crate::Result;

pub use bus::BusObserver;
pub use command::CommandObserver;
pub use file::{FileObserver, FileProbe, FileSample};

/// Common capability of every observer variant.
pub trait SignalObserver: Send {
    /// Activity this observer reports for.
    fn activity(&self) -> &str;

    /// Start observing. Signals flow into `sink` until `cancel` fires.
    fn spawn(self: Box<Self>, sink: SignalSink, cancel: CancellationToken) -> ActorHandle;
}

/// Build the observer an activity is configured with.
///
/// Returns `None` for HTTP-driven activities.
pub fn build(
    activity: &ActivityConfig,
    bus: &NotificationBus,
) -> Result<Option<Box<dyn SignalObserver>>> {
    let observer: Box<dyn SignalObserver> = match &activity.observer {
        ObserverConfig::Http => return Ok(None),
        ObserverConfig::File(config) => Box::new(FileObserver::new(&activity.name, config)?),
        ObserverConfig::Command(config) => Box::new(CommandObserver::new(&activity.name, config)),
        ObserverConfig::Bus(config) => Box::new(BusObserver::new(&activity.name, config, bus)),
    };
    Ok(Some(observer))
}

/// Turns raw presence samples into debounced transitions.
///
/// `absent_for` is how long the condition must stay absent before a
/// deactivation is reported. `reactivation_guard` suppresses an activation
/// that follows the previous activation too closely.
#[derive(Debug, Clone)]
pub struct Debouncer {
    absent_for: Duration,
    reactivation_guard: Duration,
    active: bool,
    absent_since: Option<Instant>,
    last_activation: Option<Instant>,
}

impl Debouncer {
    pub fn new(absent_for: Duration, reactivation_guard: Duration) -> Self {
        Self {
            absent_for,
            reactivation_guard,
            active: false,
            absent_since: None,
            last_activation: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn sample(&mut self, present: bool, now: Instant) -> Option<SignalKind> {
        if present {
            self.absent_since = None;
            if self.active {
                return None;
            }
            if let Some(last) = self.last_activation {
                if !self.reactivation_guard.is_zero()
                    && now.saturating_duration_since(last) < self.reactivation_guard
                {
                    return None;
                }
            }
            self.active = true;
            self.last_activation = Some(now);
            return Some(SignalKind::Activate);
        }

        if !self.active {
            return None;
        }
        let since = *self.absent_since.get_or_insert(now);
        if now.saturating_duration_since(since) >= self.absent_for {
            self.active = false;
            self.absent_since = None;
            return Some(SignalKind::Deactivate);
        }
        None
    }

    /// The source could not be read: stop now, skipping the absence window.
    pub fn fail(&mut self) -> Option<SignalKind> {
        self.absent_since = None;
        if self.active {
            self.active = false;
            return Some(SignalKind::Stop);
        }
        None
    }
}
