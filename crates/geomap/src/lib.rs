//! # geomap
//!
//! Command-line front end for the geolocation cache. It loads a snapshot of
//! monitored objects, replays recorded session notifications through the
//! notification pump, and prints a JSON report of what a map viewport shows.
//!
//! ## Quick Start
//!
//! ```bash
//! # Objects around Berlin at zoom 10
//! geomap --objects objects.json --lat 52.52 --lon 13.40 --zoom 10
//!
//! # Replay updates, pin the location to the viewport's top-left corner
//! geomap -o objects.json -u updates.jsonl --anchor top-left --width 1280 --height 720
//!
//! # Only routers below container 42, with JSON logs on stderr
//! geomap -o objects.json --parent 42 --filter router --json-logs
//! ```
//!
//! ## Configuration
//!
//! Settings are read from a TOML file (default: `geomap.toml`). If the file
//! doesn't exist, a default configuration is written there. Command-line
//! options override the `[viewport]` and `[logging]` sections.

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs geomap with the process arguments.
///
/// # Exit Codes
///
/// * **0**: Report printed
/// * **1**: Invalid arguments or configuration, unreadable input, or logging
///   setup failure
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    config.apply_overrides(&args);

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    config
        .validate()
        .map_err(|e| format!("Configuration validation failed: {e}"))?;

    let report = Application::new(args, config).run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub use app::{MapReport, TileSummary, VisibleObject};
pub use config::{LoggingSettings, ViewportSettings};
