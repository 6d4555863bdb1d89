use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scene::notifications;
use crate::{mlog_debug, Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Fixed ordering used for NEXT/PREV.
    #[serde(default = "default_linear_order")]
    pub linear_order: Vec<String>,
    /// Scenes accepted by PLAY beyond the linear order and activity scenes.
    #[serde(default)]
    pub extra_scenes: Vec<String>,
    /// Bounded wait for a current-scene reply before falling back.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Bounded wait for a PLAY acknowledgment on manual scene changes.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default)]
    pub hold: HoldConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default, rename = "activity")]
    pub activities: Vec<ActivityConfig>,
}

/// One activity that can claim the display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    pub name: String,
    pub target_scene: String,
    pub return_scene: String,
    /// Release grace after a graceful deactivation.
    #[serde(default = "default_hold_duration_ms")]
    pub hold_duration_ms: u64,
    /// Notification the HTTP endpoint publishes after switching this
    /// activity, with `{activity, active}` as payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce: Option<String>,
    #[serde(default)]
    pub observer: ObserverConfig,
}

impl ActivityConfig {
    pub fn hold_duration(&self) -> Duration {
        Duration::from_millis(self.hold_duration_ms)
    }
}

/// Which signal source drives an activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ObserverConfig {
    /// Driven through `POST /activity/{name}/...`.
    #[default]
    Http,
    File(FileObserverConfig),
    Command(CommandObserverConfig),
    Bus(BusObserverConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObserverConfig {
    pub path: PathBuf,
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Poll interval multiplier while the activity is active.
    #[serde(default = "default_slow_factor")]
    pub slow_factor: u32,
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
    #[serde(default = "default_valid_pattern")]
    pub valid_pattern: String,
    #[serde(default = "default_invalid_pattern")]
    pub invalid_pattern: String,
    /// Wake up early on filesystem events.
    #[serde(default = "default_true")]
    pub watch: bool,
    #[serde(default = "default_probe_timeout_ms")]
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandObserverConfig {
    /// Run through `sh -c`; present when it exits 0 with non-empty stdout.
    pub command: String,
    #[serde(default = "default_check_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
    /// Continuous absence required before deactivating.
    #[serde(default)]
    pub absent_ms: u64,
    /// Activations this soon after the previous one are ignored.
    #[serde(default)]
    pub reactivation_guard_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusObserverConfig {
    #[serde(default)]
    pub activate_on: Vec<String>,
    #[serde(default)]
    pub deactivate_on: Vec<String>,
    #[serde(default)]
    pub stop_on: Vec<String>,
    /// When set, `activate_on` notifications carry a boolean in this payload
    /// field: true activates, false deactivates.
    #[serde(default)]
    pub active_field: Option<String>,
    /// Deactivate this long after the last activation when no end
    /// notification arrives; 0 waits forever.
    #[serde(default = "default_max_active_ms")]
    pub max_active_ms: u64,
}

impl Default for BusObserverConfig {
    fn default() -> Self {
        Self {
            activate_on: Vec::new(),
            deactivate_on: Vec::new(),
            stop_on: Vec::new(),
            active_field: None,
            max_active_ms: default_max_active_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_extended_duration_ms")]
    pub extended_duration_ms: u64,
    #[serde(default = "default_interactions")]
    pub interactions: Vec<String>,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extended_duration_ms: default_extended_duration_ms(),
            interactions: default_interactions(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Automatic rotation period; 0 disables rotation.
    #[serde(default = "default_rotation_interval_ms")]
    pub rotation_interval_ms: u64,
    pub initial_scene: Option<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            rotation_interval_ms: default_rotation_interval_ms(),
            initial_scene: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_linear_order() -> Vec<String> {
    ["homepage_page", "jokes_and_facts_page", "fantasy_page", "football_page"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_query_timeout_ms() -> u64 {
    1_000
}

fn default_ack_timeout_ms() -> u64 {
    1_000
}

fn default_hold_duration_ms() -> u64 {
    30_000
}

fn default_check_interval_ms() -> u64 {
    2_000
}

fn default_slow_factor() -> u32 {
    3
}

fn default_startup_delay_ms() -> u64 {
    30_000
}

fn default_valid_pattern() -> String {
    "Title:".to_string()
}

fn default_invalid_pattern() -> String {
    "no data".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    1_000
}

fn default_max_active_ms() -> u64 {
    30_000
}

fn default_extended_duration_ms() -> u64 {
    300_000
}

fn default_interactions() -> Vec<String> {
    [
        notifications::CLOWN_MODE_CHANGED,
        notifications::SCENES_NEXT,
        notifications::SCENES_PREV,
        notifications::SCENES_PLAY,
        notifications::SCENES_PAUSE,
        notifications::VOLUME_UP,
        notifications::VOLUME_DOWN,
        notifications::USER_PRESENCE,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_bind() -> String {
    "127.0.0.1:8081".to_string()
}

fn default_rotation_interval_ms() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            linear_order: default_linear_order(),
            extra_scenes: Vec::new(),
            query_timeout_ms: default_query_timeout_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            hold: HoldConfig::default(),
            http: HttpConfig::default(),
            player: PlayerConfig::default(),
            activities: vec![ActivityConfig {
                name: "music".to_string(),
                target_scene: "music_page_paused".to_string(),
                return_scene: "homepage_page".to_string(),
                hold_duration_ms: default_hold_duration_ms(),
                announce: None,
                observer: ObserverConfig::File(FileObserverConfig {
                    path: PathBuf::from("/home/pi/metadata.txt"),
                    check_interval_ms: default_check_interval_ms(),
                    slow_factor: default_slow_factor(),
                    startup_delay_ms: default_startup_delay_ms(),
                    valid_pattern: default_valid_pattern(),
                    invalid_pattern: default_invalid_pattern(),
                    watch: true,
                    read_timeout_ms: default_probe_timeout_ms(),
                }),
            }],
        }
    }
}

impl Config {
    pub fn app_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".mirror-scenes"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("scenes.toml"))
    }

    /// Load from the default location; defaults when the file is missing.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        mlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            mlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        mlog_debug!(
            "Config loaded: {} activities, linear_order={:?}, hold={}",
            config.activities.len(),
            config.linear_order,
            config.hold.enabled
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                mlog_debug!("Creating config directory: {}", parent.display());
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        mlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn activity(&self, name: &str) -> Option<&ActivityConfig> {
        self.activities.iter().find(|a| a.name == name)
    }

    /// Every scene a PLAY may name.
    pub fn known_scenes(&self) -> HashSet<String> {
        let mut scenes: HashSet<String> = self.linear_order.iter().cloned().collect();
        scenes.extend(self.extra_scenes.iter().cloned());
        for activity in &self.activities {
            scenes.insert(activity.target_scene.clone());
            scenes.insert(activity.return_scene.clone());
        }
        scenes
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.http
            .bind
            .parse()
            .map_err(|e| Error::Config(format!("invalid http.bind {:?}: {}", self.http.bind, e)))
    }

    /// Reject configurations the runtime cannot honor.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for scene in &self.linear_order {
            if !seen.insert(scene) {
                return Err(Error::Config(format!("duplicate scene in linear_order: {}", scene)));
            }
        }

        let mut names = HashSet::new();
        for activity in &self.activities {
            if activity.name.trim().is_empty() {
                return Err(Error::Config("activity with empty name".to_string()));
            }
            if !names.insert(activity.name.as_str()) {
                return Err(Error::Config(format!("duplicate activity: {}", activity.name)));
            }
            if activity.target_scene.is_empty() || activity.return_scene.is_empty() {
                return Err(Error::Config(format!(
                    "activity {} needs target_scene and return_scene",
                    activity.name
                )));
            }
            match &activity.observer {
                ObserverConfig::File(file) => {
                    if file.check_interval_ms == 0 || file.slow_factor == 0 {
                        return Err(Error::Config(format!(
                            "activity {}: check_interval_ms and slow_factor must be positive",
                            activity.name
                        )));
                    }
                    regex::Regex::new(&file.valid_pattern)?;
                    regex::Regex::new(&file.invalid_pattern)?;
                }
                ObserverConfig::Command(cmd) => {
                    if cmd.command.trim().is_empty() || cmd.interval_ms == 0 {
                        return Err(Error::Config(format!(
                            "activity {}: command and interval_ms are required",
                            activity.name
                        )));
                    }
                }
                ObserverConfig::Bus(bus) => {
                    if bus.activate_on.is_empty() {
                        return Err(Error::Config(format!(
                            "activity {}: bus observer needs activate_on",
                            activity.name
                        )));
                    }
                }
                ObserverConfig::Http => {}
            }
        }

        if self.hold.enabled && self.hold.extended_duration_ms == 0 {
            return Err(Error::Config("hold.extended_duration_ms must be positive".to_string()));
        }
        if self.http.enabled {
            self.bind_addr()?;
        }
        Ok(())
    }
}
