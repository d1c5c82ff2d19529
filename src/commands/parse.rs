use anyhow::{Context, Result};
use chrono::{Local, Utc};
use courtwatch_core::AppConfig;
use courtwatch_parser::AvailabilityParser;

use super::print_records;

pub fn run(config: AppConfig, file: &str, json: bool) -> Result<()> {
    let html = std::fs::read_to_string(file).with_context(|| format!("reading {}", file))?;

    config.monitor.validate_selection()?;
    let keys = config.monitor.cross_product(Local::now().date_naive());
    let parser = AvailabilityParser::from_config(&config.parser);
    let records = parser.parse_page(&html, &keys, Utc::now());

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print_records(&records);
    }
    Ok(())
}
