//! # Poltergeist Engine
//!
//! Headless runner for the Poltergeist simulation.
//!
//! Loads `poltergeist.toml` (or the path given as the first argument),
//! builds the scene and plays the scripted input timeline against it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod config;
mod session;
mod timing;

use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::{ConfigLoad, EngineConfig, LogFormat, CONFIG_FILE};

/// Main entry point.
fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_FILE.to_string());
    let load = EngineConfig::read(&path);

    let filter = EnvFilter::from_default_env().add_directive("poltergeist=info".parse()?);
    let (pretty, json) = match load.log_format() {
        LogFormat::Pretty => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };
    tracing_subscriber::registry()
        .with(pretty)
        .with(json)
        .with(filter)
        .init();

    info!("Poltergeist starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(config = %path, "Using config");
    let missing = matches!(load, ConfigLoad::Missing);
    let config = load.resolve(Path::new(&path));
    if missing {
        if let Err(e) = config.save_to(&path) {
            warn!("Failed to write default config: {e}");
        }
    }

    let summary = session::Session::new(config)?.run();

    info!(
        frames = summary.frames,
        elapsed = summary.elapsed,
        possessions = summary.possessions,
        kills = summary.kills,
        interactions = summary.interactions,
        rolls = summary.rolls,
        agents_left = summary.agents_left,
        events_dropped = summary.events_dropped,
        controlled = ?summary.controlled,
        "Poltergeist shutdown complete"
    );
    Ok(())
}
