//! tombolad: the giveaway service daemon
//!
//! Startup order matters: migrations run to completion before the engine
//! loop starts, and the loop is the process's only long-running
//! responsibility; it never returns under normal operation. The platform
//! adapter embedding this service feeds inbound events through
//! [`tombola_engine::EventGate`].

mod config;

use anyhow::Context;
use clap::Parser;
use config::DaemonConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tombola_engine::{LifecycleEngine, TextRenderer, WebhookMessenger};
use tombola_store::Database;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "tombolad", about = "Recurring giveaway service")]
struct Args {
    /// Path of the TOML configuration file
    #[arg(long, default_value = "tombola.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading config file {}", args.config.display()))?;
    let config = DaemonConfig::from_toml(&text).context("parsing config file")?;

    let db = Database::open(&config.database)
        .with_context(|| format!("opening database {}", config.database.display()))?;
    db.migrate().context("migrating database schema")?;
    info!(database = %config.database.display(), "database ready");

    let messenger = Arc::new(WebhookMessenger::new(config.webhook_base_url.clone()));
    let engine = LifecycleEngine::new(
        db,
        messenger,
        Arc::new(TextRenderer),
        config.engine_config(),
    );

    info!("starting giveaway lifecycle loop");
    engine.run().await.context("lifecycle loop exited")?;
    Ok(())
}
