//! raed - RAE memory engine daemon
//!
//! Builds a `MemoryEngine` over the in-memory backends and runs importance
//! decay on the configured interval until interrupted.

mod config;

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use rae_core::{init_tracing, MemoryEngine, PeriodicTask, ENGINE_METRICS, VERSION};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "raed")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "RAE memory engine daemon", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "RAE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Default log level when RAE_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Run one maintenance tick, print its report and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json, args.log_level);

    let config = config::load(args.config.as_deref())?;
    let engine = MemoryEngine::in_memory(config)?;
    let decay = engine.decay_task();
    info!(
        event = "raed.started",
        version = VERSION,
        interval_secs = decay.interval().as_secs(),
    );

    if args.once {
        let report = decay.tick(Utc::now()).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        ENGINE_METRICS.flush();
        return Ok(());
    }

    let mut interval = tokio::time::interval(decay.interval());
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = decay.tick(Utc::now()).await {
                    warn!(event = "raed.tick_failed", task = decay.name(), error = %err);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(event = "raed.shutdown");
                break;
            }
        }
    }
    ENGINE_METRICS.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from(["raed", "--once", "--json", "--log-level", "debug"]).unwrap();
        assert!(args.once);
        assert!(args.json);
        assert_eq!(args.log_level, Level::DEBUG);

        let args = Args::try_parse_from(["raed", "--config", "/etc/rae/engine.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/rae/engine.toml")));
        assert!(!args.once);
    }
}
