use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use mirror_scenes::app::SceneSystem;
use mirror_scenes::bus::NotificationBus;
use mirror_scenes::config::{Config, ObserverConfig};
use mirror_scenes::{mlog, mlog_debug, Error, Result};

/// Mirror scenes - activity-driven scene coordination for a smart mirror
#[derive(Parser, Debug)]
#[command(name = "mirror-scenes")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    MIRROR_SCENES_DEBUG=1     Enable debug logging (alternative to --debug)\n    MIRROR_SCENES_LOG=LEVEL   Exact log level: error, warn, info, debug, trace"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.mirror-scenes/mirror-scenes.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Configuration file (default: ~/.mirror-scenes/scenes.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the coordinator, observers and HTTP endpoint until Ctrl-C (default)
    Run,

    /// Validate the configuration and print a summary
    Check,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short = 'f')]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    mirror_scenes::log::init(cli.debug);

    let path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&path),
        Command::Check => run_check(&path),
        Command::Init { force } => run_init(&path, force),
    }
}

fn run(path: &Path) -> Result<()> {
    if mirror_scenes::log::is_debug() {
        mlog!("mirror-scenes starting (debug mode enabled)");
        if let Some(log) = mirror_scenes::log::log_path() {
            println!("Debug log: {}", log.display());
        }
    } else {
        mlog!("mirror-scenes starting");
    }

    let config = Config::load_from(path)?;
    Runtime::new()?.block_on(async move {
        let system = SceneSystem::start(config, NotificationBus::default()).await?;
        if let Some(addr) = system.http_addr() {
            println!("mirror-scenes listening on http://{}", addr);
        }

        tokio::signal::ctrl_c().await?;
        mlog!("Ctrl-C received, shutting down");
        system.shutdown().await;
        Ok::<(), Error>(())
    })
}

fn run_check(path: &Path) -> Result<()> {
    mlog_debug!("Check command: path={}", path.display());
    let config = Config::load_from(path)?;
    config.validate()?;

    println!("Configuration OK: {}", path.display());
    println!("  linear order: {}", config.linear_order.join(" -> "));
    println!(
        "  hold: {} ({} ms)",
        if config.hold.enabled { "on" } else { "off" },
        config.hold.extended_duration_ms
    );
    if config.http.enabled {
        println!("  http: {}", config.http.bind);
    } else {
        println!("  http: off");
    }
    for activity in &config.activities {
        let kind = match &activity.observer {
            ObserverConfig::Http => "http",
            ObserverConfig::File(_) => "file",
            ObserverConfig::Command(_) => "command",
            ObserverConfig::Bus(_) => "bus",
        };
        println!(
            "  activity {} [{}]: {} -> {} (hold {} ms)",
            activity.name, kind, activity.target_scene, activity.return_scene, activity.hold_duration_ms
        );
    }
    Ok(())
}

fn run_init(path: &Path, force: bool) -> Result<()> {
    mlog!("Init command: path={}, force={}", path.display(), force);
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    Config::default().save_to(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
