mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use courtwatch_core::config::AppConfig;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    if config.credentials.user_id.is_empty() {
        warn!("no user id configured, set COURTWATCH_USER_ID");
    }
    info!(
        login_url = %config.site.login_url,
        locations = config.monitor.locations.len(),
        time_slots = config.monitor.time_slots.len(),
        "config loaded"
    );

    match cli.command {
        Commands::Check { json, notify } => {
            commands::check::run(config, json, notify).await?;
        }
        Commands::Watch { interval } => {
            commands::watch::run(config, interval).await?;
        }
        Commands::Parse { file, json } => {
            commands::parse::run(config, &file, json)?;
        }
    }

    Ok(())
}

/// Environment overrides for secrets and deployment-specific values
fn apply_env_overrides(config: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("COURTWATCH_USER_ID") {
        config.credentials.user_id = v;
    }
    if let Some(v) = var("COURTWATCH_PASSWORD") {
        config.credentials.password = v;
    }
    if let Some(v) = var("COURTWATCH_LOGIN_URL") {
        config.site.login_url = v;
    }
    if let Some(v) = var("COURTWATCH_WEBHOOK_URL") {
        config.notify.webhook_url = Some(v).filter(|u| !u.trim().is_empty());
    }
    if let Some(v) = var("COURTWATCH_NOTIFY_EMAIL") {
        config.notify.recipient = v;
    }
    if let Some(v) = var("COURTWATCH_SENDGRID_API_KEY") {
        config.notify.sendgrid_api_key = Some(v).filter(|k| !k.trim().is_empty());
    }
    if let Some(v) = var("COURTWATCH_FROM_EMAIL") {
        config.notify.from_email = v;
    }
    if let Some(v) = var("COURTWATCH_INTERVAL_MINUTES") {
        match v.parse::<u32>() {
            Ok(n) if n > 0 => config.monitor.interval_minutes = n,
            _ => warn!(value = %v, "ignoring invalid COURTWATCH_INTERVAL_MINUTES"),
        }
    }
}
