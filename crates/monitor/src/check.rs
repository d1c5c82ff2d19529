use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use courtwatch_core::config::ParserConfig;
use courtwatch_core::{AvailabilityRecord, CheckError, HttpRequest, MonitorConfig, SlotKey};
use courtwatch_parser::{html, AvailabilityParser};
use courtwatch_session::{resolve_against_origin, SessionManager};

/// Outcome of one check cycle. `records` always covers the full cross-product;
/// `error` is the reason the cycle degraded, if it did.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub records: Vec<AvailabilityRecord>,
    pub checked_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl CheckReport {
    pub fn available_records(&self) -> Vec<AvailabilityRecord> {
        self.records.iter().filter(|r| r.is_available()).cloned().collect()
    }

    pub fn has_available(&self) -> bool {
        self.records.iter().any(AvailabilityRecord::is_available)
    }
}

pub struct CheckOrchestrator {
    parser: AvailabilityParser,
    target_keywords: Vec<String>,
}

impl CheckOrchestrator {
    pub fn new(parser: AvailabilityParser, target_keywords: Vec<String>) -> Self {
        Self {
            parser,
            target_keywords: target_keywords
                .into_iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new(AvailabilityParser::from_config(config), config.target_keywords.clone())
    }

    /// Run one check. Never fails: every error is turned into degraded records.
    pub async fn run_check(&self, session: &mut SessionManager, config: &MonitorConfig) -> CheckReport {
        self.run_check_at(session, config, Local::now().date_naive(), Utc::now()).await
    }

    pub async fn run_check_at(
        &self,
        session: &mut SessionManager,
        config: &MonitorConfig,
        today: NaiveDate,
        checked_at: DateTime<Utc>,
    ) -> CheckReport {
        if let Err(err) = config.validate_selection() {
            warn!(error = %err, "nothing to check");
            return CheckReport {
                records: Vec::new(),
                checked_at,
                error: Some(err.to_string()),
            };
        }

        let keys = config.cross_product(today);
        match self.check(session, &keys, checked_at).await {
            Ok(records) => {
                let available = records.iter().filter(|r| r.is_available()).count();
                info!(records = records.len(), available, "check complete");
                CheckReport {
                    records,
                    checked_at,
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    error = %err,
                    transport = err.is_transport(),
                    slots = keys.len(),
                    "check degraded"
                );
                CheckReport {
                    records: AvailabilityRecord::degraded(&keys, &err, checked_at),
                    checked_at,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn check(
        &self,
        session: &mut SessionManager,
        keys: &[SlotKey],
        observed_at: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityRecord>, CheckError> {
        let login = session.login().await?;

        let links = html::extract_links(&login.landing_page.body, |text| self.is_target_link(text));
        let target = links.first().ok_or(CheckError::TargetNotFound)?;
        debug!(href = %target.href, text = %target.text, candidates = links.len(), "target link");

        let target_url = resolve_against_origin(&session.settings().login_url, &target.href)?;
        let request = HttpRequest::get(target_url)
            .header("Referer", login.landing_page.final_url.as_str());
        let page = session.authenticated_fetch(request).await?;
        if !page.is_success() {
            return Err(CheckError::Transport(format!("target page returned HTTP {}", page.status)));
        }

        let tables = html::extract_tables(&page.body);
        if self.parser.court_rows(&tables).is_empty() {
            return Err(CheckError::ParseEmpty);
        }
        Ok(self.parser.parse(&tables, keys, observed_at))
    }

    fn is_target_link(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.target_keywords.iter().any(|k| text.contains(k.as_str()))
    }
}
