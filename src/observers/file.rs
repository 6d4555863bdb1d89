//! Metadata-file observer.
//!
//! Watches a file an AirPlay receiver rewrites while a track plays. Only
//! writes newer than the last one seen, and newer than the observer's own
//! start, count. A fresh write with valid track content activates; a fresh
//! write without it deactivates (release grace applies); a missing or
//! unreadable file stops the activity at once.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actors::{ActorHandle, SignalSink};
use crate::config::FileObserverConfig;
use crate::scene::SignalKind;
use crate::util::blocking_with_timeout;
use crate::{mlog, mlog_debug, mlog_trace, mlog_warn, Result};

use super::SignalObserver;

/// One read of the watched file.
#[derive(Debug, Clone)]
pub struct FileSample {
    pub modified: SystemTime,
    pub content: String,
}

/// Pure evaluation of successive file samples.
#[derive(Debug)]
pub struct FileProbe {
    valid: Regex,
    invalid: Regex,
    epoch: SystemTime,
    last_modified: Option<SystemTime>,
    has_track: bool,
}

impl FileProbe {
    pub fn new(valid: Regex, invalid: Regex, epoch: SystemTime) -> Self {
        Self {
            valid,
            invalid,
            epoch,
            last_modified: None,
            has_track: false,
        }
    }

    pub fn has_track(&self) -> bool {
        self.has_track
    }

    pub fn is_valid(&self, content: &str) -> bool {
        let content = content.trim();
        !content.is_empty() && self.valid.is_match(content) && !self.invalid.is_match(content)
    }

    /// Feed one sample; `Err` means the file could not be read.
    pub fn evaluate(&mut self, sample: Result<FileSample>) -> Option<SignalKind> {
        let sample = match sample {
            Ok(sample) => sample,
            Err(e) => {
                mlog_trace!("FileProbe: unreadable ({})", e);
                if self.has_track {
                    self.has_track = false;
                    return Some(SignalKind::Stop);
                }
                return None;
            }
        };

        let newer = self.last_modified.map_or(true, |last| sample.modified > last);
        if !newer {
            return None;
        }
        self.last_modified = Some(sample.modified);

        if sample.modified <= self.epoch {
            mlog_debug!("FileProbe: ignoring metadata written before startup");
            return None;
        }

        let valid = self.is_valid(&sample.content);
        match (self.has_track, valid) {
            (false, true) => {
                self.has_track = true;
                Some(SignalKind::Activate)
            }
            (true, false) => {
                self.has_track = false;
                Some(SignalKind::Deactivate)
            }
            _ => None,
        }
    }
}

pub struct FileObserver {
    activity: String,
    path: PathBuf,
    fast: Duration,
    slow: Duration,
    startup_delay: Duration,
    read_timeout: Duration,
    watch: bool,
    probe: FileProbe,
}

impl FileObserver {
    pub fn new(activity: &str, config: &FileObserverConfig) -> Result<Self> {
        let fast = Duration::from_millis(config.check_interval_ms);
        Ok(Self {
            activity: activity.to_string(),
            path: config.path.clone(),
            fast,
            slow: fast * config.slow_factor.max(1),
            startup_delay: Duration::from_millis(config.startup_delay_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            watch: config.watch,
            probe: FileProbe::new(
                Regex::new(&config.valid_pattern)?,
                Regex::new(&config.invalid_pattern)?,
                SystemTime::now(),
            ),
        })
    }

    /// Treat writes after `epoch` as fresh instead of the observer's start.
    pub fn with_epoch(mut self, epoch: SystemTime) -> Self {
        self.probe.epoch = epoch;
        self
    }

    /// Poll slower while a track is playing.
    pub fn current_interval(&self) -> Duration {
        if self.probe.has_track() {
            self.slow
        } else {
            self.fast
        }
    }

    fn start_watcher(&self, wake: mpsc::UnboundedSender<()>) -> Result<RecommendedWatcher> {
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let Ok(event) = res else { return };
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if ours {
                    let _ = wake.send(());
                }
            },
            NotifyConfig::default(),
        )?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}

async fn read_sample(path: PathBuf, timeout: Duration) -> Result<FileSample> {
    blocking_with_timeout(timeout, move || {
        let modified = std::fs::metadata(&path)?.modified()?;
        // Tag text is not guaranteed UTF-8, and a read can race a rewrite.
        let content = String::from_utf8_lossy(&std::fs::read(&path)?).into_owned();
        Ok(FileSample { modified, content })
    })
    .await
}

impl SignalObserver for FileObserver {
    fn activity(&self) -> &str {
        &self.activity
    }

    fn spawn(mut self: Box<Self>, sink: SignalSink, cancel: CancellationToken) -> ActorHandle {
        let cancel_clone = cancel.clone();

        mlog_debug!(
            "FileObserver::spawn activity={} path={} fast={:?} slow={:?}",
            self.activity,
            self.path.display(),
            self.fast,
            self.slow
        );

        tokio::spawn(async move {
            if !self.startup_delay.is_zero() {
                mlog!(
                    "FileObserver[{}]: waiting {:?} before monitoring",
                    self.activity,
                    self.startup_delay
                );
                tokio::select! {
                    _ = cancel_clone.cancelled() => return,
                    _ = tokio::time::sleep(self.startup_delay) => {}
                }
            }

            let (wake_tx, mut wake_rx) = mpsc::unbounded_channel();
            let _watcher = if self.watch {
                match self.start_watcher(wake_tx) {
                    Ok(watcher) => Some(watcher),
                    Err(e) => {
                        mlog_warn!("FileObserver[{}]: watch failed, polling only: {}", self.activity, e);
                        None
                    }
                }
            } else {
                None
            };

            mlog!("FileObserver[{}]: monitoring {}", self.activity, self.path.display());

            loop {
                let sample = read_sample(self.path.clone(), self.read_timeout).await;
                let before = self.current_interval();
                if let Some(kind) = self.probe.evaluate(sample) {
                    mlog!("FileObserver[{}]: {:?}", self.activity, kind);
                    sink.emit(&self.activity, kind);
                }
                let interval = self.current_interval();
                if interval != before {
                    mlog_debug!(
                        "FileObserver[{}]: polling {:?} -> {:?}",
                        self.activity,
                        before,
                        interval
                    );
                }

                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        mlog_debug!("FileObserver[{}] cancelled", self.activity);
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                    Some(()) = wake_rx.recv() => {
                        while wake_rx.try_recv().is_ok() {}
                    }
                }
            }
        });

        ActorHandle::new(cancel)
    }
}
