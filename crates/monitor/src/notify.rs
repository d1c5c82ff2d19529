use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{info, warn};

use courtwatch_core::{AppConfig, AvailabilityRecord, CheckError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub recipient: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl NotifyOutcome {
    pub fn delivered() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Where the composed message goes and what it links to
#[derive(Debug, Clone, Default)]
pub struct NotifySettings {
    pub recipient: String,
    pub reservation_url: String,
}

impl NotifySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            recipient: config.notify.recipient.clone(),
            reservation_url: config.site.reservation_url.clone(),
        }
    }
}

pub fn compose(
    records: &[AvailabilityRecord],
    observed_at: DateTime<Utc>,
    settings: &NotifySettings,
) -> Notification {
    let subject = format!("Court availability: {} open slot(s)", records.len());

    let mut body = String::from("Open tennis court slots were found.\n\n");
    for record in records {
        body.push_str(&format!(
            "- {} {} {} ({})\n",
            record.location, record.court_label, record.time_slot, record.date
        ));
    }
    body.push_str(&format!(
        "\nObserved at: {}\n",
        observed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    ));
    if !settings.reservation_url.is_empty() {
        body.push_str(&format!("Reserve at: {}\n", settings.reservation_url));
    }

    Notification {
        subject,
        body,
        recipient: settings.recipient.clone(),
    }
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> NotifyOutcome;
}

/// Writes the notification to the log. Used when nothing else is configured.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, notification: &Notification) -> NotifyOutcome {
        info!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            "notification\n{}",
            notification.body
        );
        NotifyOutcome::delivered()
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    to: &'a str,
    timestamp: String,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckError::Config(format!("webhook client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> NotifyOutcome {
        let payload = WebhookPayload {
            subject: &notification.subject,
            body: &notification.body,
            to: &notification.recipient,
            timestamp: Utc::now().to_rfc3339(),
        };

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => NotifyOutcome::delivered(),
            Ok(resp) => NotifyOutcome::failed(format!("webhook returned HTTP {}", resp.status().as_u16())),
            Err(e) => NotifyOutcome::failed(format!("webhook request failed: {}", e)),
        }
    }
}

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Serialize)]
struct MailAddress<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<MailAddress<'a>>,
}

#[derive(Serialize)]
struct MailContent<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct SendGridMail<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: MailAddress<'a>,
    subject: &'a str,
    content: Vec<MailContent<'a>>,
}

/// Plain-text mail through the SendGrid v3 `mail/send` API.
pub struct SendGridNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from_email: String,
}

impl SendGridNotifier {
    pub fn new(
        api_key: impl Into<String>,
        from_email: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckError::Config(format!("sendgrid client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: SENDGRID_ENDPOINT.to_string(),
            api_key: api_key.into(),
            from_email: from_email.into(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    fn name(&self) -> &str {
        "sendgrid"
    }

    async fn send(&self, notification: &Notification) -> NotifyOutcome {
        let mail = SendGridMail {
            personalizations: vec![Personalization {
                to: vec![MailAddress {
                    email: &notification.recipient,
                }],
            }],
            from: MailAddress {
                email: &self.from_email,
            },
            subject: &notification.subject,
            content: vec![MailContent {
                kind: "text/plain",
                value: &notification.body,
            }],
        };

        let result = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&mail)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => NotifyOutcome::delivered(),
            Ok(resp) => {
                let status = resp.status().as_u16();
                let detail = resp.text().await.unwrap_or_default();
                NotifyOutcome::failed(format!("sendgrid returned HTTP {}: {}", status, detail.trim()))
            }
            Err(e) => NotifyOutcome::failed(format!("sendgrid request failed: {}", e)),
        }
    }
}

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    settings: NotifySettings,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, settings: NotifySettings) -> Self {
        Self { notifier, settings }
    }

    /// First configured of: SendGrid mail, webhook, console
    pub fn from_config(config: &AppConfig) -> Result<Self, CheckError> {
        let notify = &config.notify;
        let timeout = Duration::from_secs(config.site.request_timeout_seconds);
        let api_key = notify.sendgrid_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty());
        let webhook = notify.webhook_url.as_deref().map(str::trim).filter(|u| !u.is_empty());

        let notifier: Arc<dyn Notifier> = match (api_key, webhook) {
            (Some(key), _) => {
                if notify.from_email.trim().is_empty() {
                    return Err(CheckError::Config("notify.from_email is required for SendGrid".into()));
                }
                Arc::new(SendGridNotifier::new(key, notify.from_email.trim(), timeout)?)
            }
            (None, Some(url)) => Arc::new(WebhookNotifier::new(url, timeout)?),
            (None, None) => Arc::new(ConsoleNotifier),
        };
        Ok(Self::new(notifier, NotifySettings::from_config(config)))
    }

    pub fn notifier_name(&self) -> &str {
        self.notifier.name()
    }

    pub async fn notify(&self, records: &[AvailabilityRecord], observed_at: DateTime<Utc>) -> NotifyOutcome {
        if records.is_empty() {
            return NotifyOutcome::failed("nothing to notify");
        }

        let notification = compose(records, observed_at, &self.settings);
        let outcome = self.notifier.send(&notification).await;
        match &outcome.error {
            None => info!(notifier = self.notifier.name(), slots = records.len(), "notification sent"),
            Some(e) => warn!(notifier = self.notifier.name(), error = %e, "notification failed"),
        }
        outcome
    }
}

/// Collects everything it is asked to send
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub sent: std::sync::Mutex<Vec<Notification>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> NotifyOutcome {
        self.sent.lock().unwrap().push(notification.clone());
        NotifyOutcome::delivered()
    }
}
