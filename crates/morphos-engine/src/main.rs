//! Morphos binary
//!
//! ```text
//! morphos cycle [ordinal]   run one evolution cycle and exit
//! morphos run               run the controller and cycles until ctrl-c
//! ```

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use morphos_common::VERSION;
use morphos_engine::{
    log_filter, ControllerMode, CycleComponents, Daemon, EngineConfig, EvolutionCycle,
};

const USAGE: &str = "usage: morphos cycle [ordinal] | morphos run";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(log_filter(
            std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV)
                .ok()
                .as_deref(),
        ))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    info!("Starting Morphos v{}", VERSION);
    let config = EngineConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    match args.first().map(String::as_str) {
        Some("cycle") | None => {
            let ordinal = match args.get(1) {
                Some(raw) => Some(
                    raw.parse::<u64>()
                        .with_context(|| format!("invalid ordinal {raw:?}"))?,
                ),
                None => None,
            };
            let components = CycleComponents::from_config(&config)?;
            let cycle = EvolutionCycle::new(config, components, ControllerMode::Inline);
            let report = cycle.run_once(ordinal).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some("run") => {
            let daemon = Daemon::new(config)?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
            };
            daemon.run(shutdown).await?;
        }
        Some(other) => bail!("unknown command {other:?}\n{USAGE}"),
    }

    Ok(())
}
