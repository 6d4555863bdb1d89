pub mod config;
pub mod error;
pub mod log;
pub mod util;

// Shared vocabulary and the notification channel
pub mod bus;
pub mod scene;

// Actor system
pub mod actors;
pub mod app;
pub mod http;
pub mod observers;

pub use error::{Error, Result};
pub use scene::{ActivitySignal, ActivityState, Direction, Intent, Origin, SignalKind};
