//! ODDSMITH — Race Prediction Fusion & Bet Selection Engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! reads a race analysis request from a JSON file, runs the pipeline,
//! and prints the report as pretty JSON on stdout.

use anyhow::{Context, Result};
use tracing::info;

use oddsmith::config::AppConfig;
use oddsmith::engine::{AnalysisEngine, RaceAnalysisRequest};

const BANNER: &str = r#"
  ___  ____  ____  ____  ____  __  __ ___ _____ _   _
 / _ \|  _ \|  _ \/ ___|/ ___||  \/  |_ _|_   _| | | |
| | | | | | | | | \___ \\___ \| |\/| || |  | | | |_| |
| |_| | |_| | |_| |___) |___) | |  | || |  | | |  _  |
 \___/|____/|____/|____/|____/|_|  |_|___| |_| |_| |_|

  Race Prediction Fusion & Bet Selection Engine
  v0.1.0
"#;

fn main() -> Result<()> {
    // Load configuration from TOML; a missing file means defaults.
    let cfg = if std::path::Path::new("config.toml").exists() {
        AppConfig::load("config.toml")?
    } else {
        AppConfig::default()
    };

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");

    let request_path = std::env::args()
        .nth(1)
        .context("Usage: oddsmith <request.json>")?;

    let raw = std::fs::read_to_string(&request_path)
        .with_context(|| format!("Failed to read request file: {request_path}"))?;
    let request: RaceAnalysisRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse request file: {request_path}"))?;

    info!(
        race_id = %request.race_id,
        sources = request.predictions.len(),
        runners = request.runners.len(),
        "Request loaded"
    );

    let engine = AnalysisEngine::new(cfg);
    let report = engine
        .analyze(&request)
        .with_context(|| format!("Analysis failed for race {}", request.race_id))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("oddsmith=info"));

    let json_logging = std::env::var("ODDSMITH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
