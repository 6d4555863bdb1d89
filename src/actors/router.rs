//! Signal routing from observers to the emitter that owns each activity.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::scene::{ActivitySignal, ActivityState, SignalKind};
use crate::{mlog_trace, mlog_warn, Error, Result};

use super::EmitterHandle;

/// Owns every emitter handle; hands out cheap [`SignalSink`]s.
pub struct SignalRouter {
    emitters: Arc<HashMap<String, EmitterHandle>>,
}

impl SignalRouter {
    pub fn new(emitters: impl IntoIterator<Item = EmitterHandle>) -> Self {
        let emitters = emitters
            .into_iter()
            .map(|handle| (handle.activity.clone(), handle))
            .collect();
        Self {
            emitters: Arc::new(emitters),
        }
    }

    pub fn sink(&self) -> SignalSink {
        SignalSink {
            emitters: self.emitters.clone(),
        }
    }

    pub fn activities(&self) -> impl Iterator<Item = &str> {
        self.emitters.keys().map(String::as_str)
    }

    pub fn shutdown(&self) {
        for handle in self.emitters.values() {
            handle.shutdown();
        }
    }
}

/// Where observers deliver their signals.
#[derive(Clone)]
pub struct SignalSink {
    emitters: Arc<HashMap<String, EmitterHandle>>,
}

impl SignalSink {
    /// Deliver a signal. Unknown activities are reported, never fatal.
    pub fn send(&self, signal: ActivitySignal) -> Result<()> {
        let Some(handle) = self.emitters.get(&signal.activity) else {
            mlog_warn!("Dropping {:?} for unknown activity {}", signal.kind, signal.activity);
            return Err(Error::UnknownActivity(signal.activity));
        };
        mlog_trace!("signal {:?} -> {}", signal.kind, signal.activity);
        if !handle.signal(signal.kind) {
            return Err(Error::ChannelClosed("emitter"));
        }
        Ok(())
    }

    /// Shorthand for observers that only ever speak for one activity.
    pub fn emit(&self, activity: &str, kind: SignalKind) {
        // Errors are already logged; observers carry on.
        let _ = self.send(ActivitySignal::new(activity, kind));
    }

    pub fn contains(&self, activity: &str) -> bool {
        self.emitters.contains_key(activity)
    }

    pub fn state(&self, activity: &str) -> Option<ActivityState> {
        self.emitters.get(activity).map(EmitterHandle::state)
    }

    /// Snapshot of every activity's state, sorted by name.
    pub fn states(&self) -> BTreeMap<String, ActivityState> {
        self.emitters
            .iter()
            .map(|(name, handle)| (name.clone(), handle.state()))
            .collect()
    }
}
