//! CHIPHOUSE binary entry point.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

use chiphouse::bias::HouseBias;
use chiphouse::config::AppConfig;
use chiphouse::dashboard;
use chiphouse::notify::LogNotifier;
use chiphouse::service::Casino;
use chiphouse::storage::Store;

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,sqlx=warn"));
    if std::env::var("LOG_JSON").is_ok() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    println!("  ____ _   _ ___ ____  _   _  ___  _   _ ____  _____ ");
    println!(" / ___| | | |_ _|  _ \\| | | |/ _ \\| | | / ___|| ____|");
    println!("| |   | |_| || || |_) | |_| | | | | | | \\___ \\|  _|  ");
    println!("| |___|  _  || ||  __/|  _  | |_| | |_| |___) | |___ ");
    println!(" \\____|_| |_|___|_|   |_| |_|\\___/ \\___/|____/|_____|");
    println!();

    let config_path =
        std::env::var("CHIPHOUSE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    info!(
        config = %config_path,
        db = %config.storage.db_path,
        operators = config.operators.ids.len(),
        "Configuration loaded"
    );

    let store = Arc::new(
        Store::open(
            &config.storage.db_path,
            config.economy.house_balance,
            config.storage.history_cap,
        )
        .await
        .context("opening database")?,
    );
    let policy = Arc::new(HouseBias::new(config.bias.round_probability));

    let dashboard_config = config.dashboard.clone();
    let casino = Arc::new(Casino::new(config, store, policy, Arc::new(LogNotifier)));

    if dashboard_config.enabled {
        let casino = casino.clone();
        tokio::spawn(async move {
            if let Err(err) = dashboard::serve(casino, dashboard_config.port).await {
                error!(%err, "Dashboard server stopped");
            }
        });
    }

    info!("CHIPHOUSE ready, waiting for shutdown signal");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutting down");
    Ok(())
}
