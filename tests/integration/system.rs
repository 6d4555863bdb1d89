//! Configuration file to a running `SceneSystem`.

use std::time::Duration;

use serde_json::json;

use mirror_scenes::app::SceneSystem;
use mirror_scenes::bus::{Notification, NotificationBus};
use mirror_scenes::config::{Config, ObserverConfig};
use mirror_scenes::scene::ActivityState;

const CONFIG: &str = r#"
linear_order = ["homepage_page", "jokes_and_facts_page", "fantasy_page"]
query_timeout_ms = 500

[hold]
enabled = false

[http]
enabled = false

[player]
rotation_interval_ms = 0

[[activity]]
name = "voice"
target_scene = "voice_page"
return_scene = "homepage_page"
hold_duration_ms = 0

[activity.observer]
kind = "bus"
activate_on = ["hermes/dialogueManager/sessionStarted"]
deactivate_on = ["hermes/dialogueManager/sessionEnded"]

[[activity]]
name = "clown"
target_scene = "fantasy_page"
return_scene = "homepage_page"
hold_duration_ms = 0

[activity.observer]
kind = "bus"
activate_on = ["CLOWN_MODE_CHANGED"]
active_field = "active"
max_active_ms = 0
"#;

fn load() -> Config {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenes.toml");
    std::fs::write(&path, CONFIG).unwrap();
    Config::load_from(&path).unwrap()
}

async fn wait_for_scene(system: &SceneSystem, scene: &str) {
    let mut status = system.player().watch_status();
    tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|s| s.scene.as_deref() == Some(scene)),
    )
    .await
    .unwrap_or_else(|_| panic!("player never showed {}", scene))
    .unwrap();
}

/// Test: TOML configuration parses into bus-observed activities
#[test]
fn test_config_file_parses() {
    let config = load();
    config.validate().unwrap();
    assert_eq!(config.activities.len(), 2);
    assert!(matches!(
        &config.activity("clown").unwrap().observer,
        ObserverConfig::Bus(bus) if bus.active_field.as_deref() == Some("active")
    ));
    assert!(config.known_scenes().contains("voice_page"));
}

/// Test: Voice session topics drive the voice activity end to end
/// Given a running system with a bus-observed voice activity
/// When session started and ended notifications arrive
/// Then the player shows the voice scene and then returns home
#[tokio::test]
async fn test_voice_session_round_trip() {
    let system = SceneSystem::start(load(), NotificationBus::default()).await.unwrap();

    system
        .bus()
        .publish(Notification::new("hermes/dialogueManager/sessionStarted"));
    wait_for_scene(&system, "voice_page").await;
    assert_eq!(system.sink().state("voice"), Some(ActivityState::Active));

    system
        .bus()
        .publish(Notification::new("hermes/dialogueManager/sessionEnded"));
    wait_for_scene(&system, "homepage_page").await;
    assert_eq!(system.sink().state("voice"), Some(ActivityState::Inactive));

    system.shutdown().await;
}

/// Test: Clown mode payload flag toggles its activity
#[tokio::test]
async fn test_clown_mode_payload() {
    let system = SceneSystem::start(load(), NotificationBus::default()).await.unwrap();

    system.bus().publish(
        Notification::new("CLOWN_MODE_CHANGED").with_payload(json!({ "active": true })),
    );
    wait_for_scene(&system, "fantasy_page").await;

    system.bus().publish(
        Notification::new("CLOWN_MODE_CHANGED").with_payload(json!({ "active": false })),
    );
    wait_for_scene(&system, "homepage_page").await;
    assert_eq!(system.sink().state("clown"), Some(ActivityState::Inactive));

    system.shutdown().await;
}
