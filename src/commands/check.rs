use anyhow::Result;
use courtwatch_core::AppConfig;
use courtwatch_monitor::{Dispatcher, Engine};

use super::print_records;

pub async fn run(config: AppConfig, json: bool, notify: bool) -> Result<()> {
    let mut engine = Engine::from_config(&config)?;
    let report = engine.check(&config.monitor).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_records(&report.records);
        if let Some(err) = &report.error {
            println!("Check degraded: {}", err);
        }
    }

    if notify {
        let available = report.available_records();
        if available.is_empty() {
            println!("Nothing open, no notification sent");
        } else {
            let dispatcher = Dispatcher::from_config(&config)?;
            let outcome = dispatcher.notify(&available, report.checked_at).await;
            if let Some(err) = outcome.error {
                anyhow::bail!("notification failed: {}", err);
            }
        }
    }

    Ok(())
}
