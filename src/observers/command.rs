//! Shell-probe observer.
//!
//! Runs a command on a fixed interval. The condition is present when the
//! command exits successfully with something on stdout (e.g. a script that
//! prints the current now-playing track). A command that cannot be run or
//! overruns its timeout is a source error and stops the activity.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::actors::{ActorHandle, SignalSink};
use crate::config::CommandObserverConfig;
use crate::util::with_timeout;
use crate::{mlog, mlog_debug, mlog_trace, Error, Result};

use super::{Debouncer, SignalObserver};

pub struct CommandObserver {
    activity: String,
    command: String,
    interval: Duration,
    timeout: Duration,
    debouncer: Debouncer,
}

impl CommandObserver {
    pub fn new(activity: &str, config: &CommandObserverConfig) -> Self {
        Self {
            activity: activity.to_string(),
            command: config.command.clone(),
            interval: Duration::from_millis(config.interval_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            debouncer: Debouncer::new(
                Duration::from_millis(config.absent_ms),
                Duration::from_millis(config.reactivation_guard_ms),
            ),
        }
    }
}

/// Run the probe once. `Ok(true)` when the condition is present.
pub async fn probe(command: &str, timeout: Duration) -> Result<bool> {
    let output = with_timeout(timeout, async {
        Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(Error::from)
    })
    .await?;

    if output.status.code().is_none() {
        return Err(Error::Probe(format!("{:?} terminated by signal", command)));
    }
    if !output.status.success() {
        // A clean non-zero exit means "absent", not "broken".
        return Ok(false);
    }
    Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
}

impl SignalObserver for CommandObserver {
    fn activity(&self) -> &str {
        &self.activity
    }

    fn spawn(mut self: Box<Self>, sink: SignalSink, cancel: CancellationToken) -> ActorHandle {
        let cancel_clone = cancel.clone();

        mlog_debug!(
            "CommandObserver::spawn activity={} interval={:?} command={:?}",
            self.activity,
            self.interval,
            self.command
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        mlog_debug!("CommandObserver[{}] cancelled", self.activity);
                        break;
                    }
                    _ = interval.tick() => {
                        let transition = match probe(&self.command, self.timeout).await {
                            Ok(present) => {
                                mlog_trace!("CommandObserver[{}]: present={}", self.activity, present);
                                self.debouncer.sample(present, Instant::now())
                            }
                            Err(e) => {
                                mlog_debug!("CommandObserver[{}]: probe failed: {}", self.activity, e);
                                self.debouncer.fail()
                            }
                        };
                        if let Some(kind) = transition {
                            mlog!("CommandObserver[{}]: {:?}", self.activity, kind);
                            sink.emit(&self.activity, kind);
                        }
                    }
                }
            }
        });

        ActorHandle::new(cancel)
    }
}
