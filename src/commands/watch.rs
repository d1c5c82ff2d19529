use anyhow::Result;
use tracing::info;

use courtwatch_core::AppConfig;
use courtwatch_monitor::{Dispatcher, Engine, PollScheduler};

pub async fn run(config: AppConfig, interval: Option<u32>) -> Result<()> {
    let mut monitor = config.monitor.clone();
    if let Some(minutes) = interval {
        monitor.interval_minutes = minutes;
    }
    monitor.active = true;

    let engine = Engine::from_config(&config)?;
    let dispatcher = Dispatcher::from_config(&config)?;
    info!(notifier = dispatcher.notifier_name(), "notifications configured");

    let mut scheduler = PollScheduler::new(engine, dispatcher);
    scheduler.apply(monitor).await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, waiting for the current check");
    scheduler.stop().await;

    if let Some(report) = scheduler.last_report().await {
        info!(
            records = report.records.len(),
            available = report.available_records().len(),
            checked_at = %report.checked_at,
            "last check"
        );
    }
    Ok(())
}
