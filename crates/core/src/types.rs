use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CheckError;

/// Display format for dates in records
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Unavailable,
}

/// One element of the requested (location, time slot, date) cross-product
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub location: String,
    pub time_slot: String,
    pub date: String,
}

/// What one check cycle observed for one slot of the selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub location: String,
    pub court_label: String,
    pub date: String,
    pub time_slot: String,
    pub status: SlotStatus,
    pub observed_at: DateTime<Utc>,
}

impl AvailabilityRecord {
    pub fn new(
        key: &SlotKey,
        court_label: impl Into<String>,
        status: SlotStatus,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            location: key.location.clone(),
            court_label: court_label.into(),
            date: key.date.clone(),
            time_slot: key.time_slot.clone(),
            status,
            observed_at,
        }
    }

    /// One unavailable record per key, labelled with the failure reason
    pub fn degraded(keys: &[SlotKey], error: &CheckError, observed_at: DateTime<Utc>) -> Vec<Self> {
        let label = error.degraded_label();
        keys.iter()
            .map(|key| Self::new(key, label.clone(), SlotStatus::Unavailable, observed_at))
            .collect()
    }

    pub fn is_available(&self) -> bool {
        self.status == SlotStatus::Available
    }
}

/// Monitoring selection, owned by the caller and read-only for the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub locations: Vec<String>,
    pub time_slots: Vec<String>,
    #[serde(default)]
    pub dates: Vec<NaiveDate>,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    #[serde(default)]
    pub active: bool,
}

fn default_interval_minutes() -> u32 { 5 }

impl MonitorConfig {
    /// Reject selections that cannot produce a single record
    pub fn validate_selection(&self) -> Result<(), CheckError> {
        if self.locations.is_empty() {
            return Err(CheckError::Config("no locations selected".into()));
        }
        if self.time_slots.is_empty() {
            return Err(CheckError::Config("no time slots selected".into()));
        }
        Ok(())
    }

    /// Selection checks plus a positive polling interval
    pub fn validate(&self) -> Result<(), CheckError> {
        self.validate_selection()?;
        if self.interval_minutes == 0 {
            return Err(CheckError::Config("interval_minutes must be positive".into()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }

    /// Expand the selection in location -> time slot -> date order.
    /// An empty date list stands for `today`. Duplicates collapse to their first occurrence.
    pub fn cross_product(&self, today: NaiveDate) -> Vec<SlotKey> {
        let locations = dedup(self.locations.iter().cloned());
        let time_slots = dedup(self.time_slots.iter().cloned());
        let dates = if self.dates.is_empty() {
            vec![today.format(DATE_FORMAT).to_string()]
        } else {
            dedup(self.dates.iter().map(|d| d.format(DATE_FORMAT).to_string()))
        };

        let mut keys = Vec::with_capacity(locations.len() * time_slots.len() * dates.len());
        for location in &locations {
            for time_slot in &time_slots {
                for date in &dates {
                    keys.push(SlotKey {
                        location: location.clone(),
                        time_slot: time_slot.clone(),
                        date: date.clone(),
                    });
                }
            }
        }
        keys
    }
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A request to the reservation site, before cookies are attached
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// URL-encoded form body, only for POST
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_form(url: Url, body: String) -> Self {
        Self {
            method: HttpMethod::Post,
            url,
            headers: vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub final_url: Url,
    pub status: u16,
    /// Every header in arrival order; `Set-Cookie` may repeat
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
    pub response_time_ms: u64,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    /// First header value with the given name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_cookie_headers(&self) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dates: Vec<NaiveDate>) -> MonitorConfig {
        MonitorConfig {
            locations: vec!["Komazawa".into(), "Ariake".into()],
            time_slots: vec!["09:00-11:00".into(), "11:00-13:00".into(), "09:00-11:00".into()],
            dates,
            interval_minutes: 5,
            active: true,
        }
    }

    #[test]
    fn test_cross_product_order_and_dedup() {
        let d1 = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let keys = config(vec![d1, d2]).cross_product(d1);

        assert_eq!(keys.len(), 2 * 2 * 2);
        assert_eq!(keys[0].location, "Komazawa");
        assert_eq!(keys[0].time_slot, "09:00-11:00");
        assert_eq!(keys[0].date, "2025-01-01");
        assert_eq!(keys[1].date, "2025-01-02");
        assert_eq!(keys[2].time_slot, "11:00-13:00");
        assert_eq!(keys[4].location, "Ariake");
    }

    #[test]
    fn test_cross_product_defaults_to_today() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let keys = config(Vec::new()).cross_product(today);

        assert_eq!(keys.len(), 4);
        assert!(keys.iter().all(|k| k.date == "2026-10-16"));
    }

    #[test]
    fn test_validate() {
        let mut cfg = config(Vec::new());
        assert!(cfg.validate().is_ok());

        cfg.interval_minutes = 0;
        assert!(matches!(cfg.validate(), Err(CheckError::Config(_))));
        assert!(cfg.validate_selection().is_ok());

        cfg.locations.clear();
        assert!(cfg.validate_selection().is_err());
    }

    #[test]
    fn test_degraded_records_cover_every_key() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let keys = config(Vec::new()).cross_product(today);
        let records = AvailabilityRecord::degraded(&keys, &CheckError::TargetNotFound, Utc::now());

        assert_eq!(records.len(), keys.len());
        assert!(records.iter().all(|r| !r.is_available()));
        assert!(records.iter().all(|r| r.court_label == "target page not found"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&SlotStatus::Available).unwrap();
        assert_eq!(json, "\"available\"");
    }

    #[test]
    fn test_response_header_lookup() {
        let url = Url::parse("https://example.com/").unwrap();
        let resp = FetchResponse {
            url: url.clone(),
            final_url: url,
            status: 302,
            headers: vec![
                ("Location".into(), "/menu".into()),
                ("set-cookie".into(), "a=1".into()),
                ("Set-Cookie".into(), "b=2".into()),
            ],
            body: String::new(),
            fetched_at: Utc::now(),
            response_time_ms: 3,
        };

        assert!(resp.is_redirect());
        assert!(!resp.is_success());
        assert_eq!(resp.header("location"), Some("/menu"));
        assert_eq!(resp.set_cookie_headers().count(), 2);
    }
}
