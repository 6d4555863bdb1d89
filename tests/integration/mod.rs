//! Integration test suite for mirror-scenes.
//!
//! These tests run the actors together the way the binary wires them:
//! observers feed the signal router, emitters talk to the coordinator,
//! the coordinator drives a scene player and echoes manual commands on
//! the bus for the hold policy.
//!
//! # Test Categories
//!
//! - `activity_lifecycle`: claim, graceful release, stop, reactivation
//! - `file_observer`: metadata file on disk driving an activity
//! - `relative_navigation`: NEXT/PREV against the reference player
//! - `hold_extension`: manual interaction pausing and resuming rotation
//! - `system`: configuration file to a running `SceneSystem`
//!
//! Most scenarios run on tokio's paused clock, so hold and timeout windows
//! are covered without real waiting.

mod fixtures;

mod activity_lifecycle;
mod file_observer;
mod hold_extension;
mod relative_navigation;
mod system;
