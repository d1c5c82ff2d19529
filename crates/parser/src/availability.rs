//! Availability extraction from the results page.
//!
//! The results markup does not say which location, date or time slot a court row
//! belongs to. Every court row found on the page is therefore reported against the
//! whole requested cross-product: read the output as "this page showed these court
//! statuses", not as a per-slot index.

use chrono::{DateTime, Utc};
use tracing::debug;

use courtwatch_core::config::ParserConfig;
use courtwatch_core::{AvailabilityRecord, CheckError, SlotKey, SlotStatus};

use crate::html::{self, Table};

/// A table row identified as describing one court
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourtRow {
    pub label: String,
    pub status: SlotStatus,
}

#[derive(Debug, Clone)]
pub struct AvailabilityParser {
    court_markers: Vec<String>,
    available_markers: Vec<String>,
    /// Checked before `available_markers`; "unavailable" contains "available"
    unavailable_markers: Vec<String>,
}

impl Default for AvailabilityParser {
    fn default() -> Self {
        Self::from_config(&ParserConfig::default())
    }
}

impl AvailabilityParser {
    pub fn new(court_markers: Vec<String>, available_markers: Vec<String>) -> Self {
        Self {
            court_markers: lowercase_all(court_markers),
            available_markers: lowercase_all(available_markers),
            unavailable_markers: Vec::new(),
        }
    }

    pub fn with_unavailable_markers(mut self, markers: Vec<String>) -> Self {
        self.unavailable_markers = lowercase_all(markers);
        self
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new(config.court_markers.clone(), config.available_markers.clone())
            .with_unavailable_markers(config.unavailable_markers.clone())
    }

    pub fn is_court_label(&self, label: &str) -> bool {
        contains_any(label, &self.court_markers)
    }

    pub fn classify_status(&self, status_text: &str) -> SlotStatus {
        if contains_any(status_text, &self.unavailable_markers) {
            SlotStatus::Unavailable
        } else if contains_any(status_text, &self.available_markers) {
            SlotStatus::Available
        } else {
            SlotStatus::Unavailable
        }
    }

    /// Rows with at least two cells whose first cell names a court
    pub fn court_rows(&self, tables: &[Table]) -> Vec<CourtRow> {
        tables
            .iter()
            .flatten()
            .filter(|row| row.len() >= 2 && self.is_court_label(&row[0]))
            .map(|row| CourtRow {
                label: row[0].clone(),
                status: self.classify_status(&row[1]),
            })
            .collect()
    }

    /// One record per (court row, key). With no court rows at all, one "no data"
    /// sentinel per key, so the output never has fewer entries than `keys`.
    pub fn parse(
        &self,
        tables: &[Table],
        keys: &[SlotKey],
        observed_at: DateTime<Utc>,
    ) -> Vec<AvailabilityRecord> {
        let rows = self.court_rows(tables);
        if rows.is_empty() {
            debug!(tables = tables.len(), "no court rows on results page");
            return AvailabilityRecord::degraded(keys, &CheckError::ParseEmpty, observed_at);
        }

        debug!(court_rows = rows.len(), keys = keys.len(), "court rows found");
        let mut records = Vec::with_capacity(rows.len() * keys.len());
        for row in &rows {
            for key in keys {
                records.push(AvailabilityRecord::new(key, row.label.clone(), row.status, observed_at));
            }
        }
        records
    }

    /// Extract tables from raw markup and parse them
    pub fn parse_page(
        &self,
        page_html: &str,
        keys: &[SlotKey],
        observed_at: DateTime<Utc>,
    ) -> Vec<AvailabilityRecord> {
        let tables = html::extract_tables(page_html);
        self.parse(&tables, keys, observed_at)
    }
}

fn lowercase_all(markers: Vec<String>) -> Vec<String> {
    markers
        .into_iter()
        .map(|m| m.to_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}

fn contains_any(text: &str, markers: &[String]) -> bool {
    let text = text.to_lowercase();
    markers.iter().any(|marker| text.contains(marker.as_str()))
}
