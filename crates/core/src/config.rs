use std::fmt;

use serde::Deserialize;

use crate::types::MonitorConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub site: SiteConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    pub login_url: String,
    /// Linked from notification bodies
    pub reservation_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

#[derive(Deserialize, Clone)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_user_id_field")]
    pub user_id_field: String,
    #[serde(default = "default_password_field")]
    pub password_field: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            password: String::new(),
            user_id_field: default_user_id_field(),
            password_field: default_password_field(),
        }
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .field("user_id_field", &self.user_id_field)
            .field("password_field", &self.password_field)
            .finish()
    }
}

/// Keyword rules for classifying the page returned by the login POST.
/// Failure keywords are checked before success keywords.
#[derive(Debug, Deserialize, Clone)]
pub struct LoginConfig {
    #[serde(default = "default_failure_keywords")]
    pub failure_keywords: Vec<String>,
    #[serde(default = "default_success_keywords")]
    pub success_keywords: Vec<String>,
    /// The site does not reliably signal failure; treat an unrecognised page as logged in
    #[serde(default = "default_true")]
    pub assume_success_when_unrecognized: bool,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            failure_keywords: default_failure_keywords(),
            success_keywords: default_success_keywords(),
            assume_success_when_unrecognized: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    #[serde(default = "default_court_markers")]
    pub court_markers: Vec<String>,
    #[serde(default = "default_available_markers")]
    pub available_markers: Vec<String>,
    /// Win over `available_markers` when both match
    #[serde(default = "default_unavailable_markers")]
    pub unavailable_markers: Vec<String>,
    /// Link text that leads from the post-login page to the availability page
    #[serde(default = "default_target_keywords")]
    pub target_keywords: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            court_markers: default_court_markers(),
            available_markers: default_available_markers(),
            unavailable_markers: default_unavailable_markers(),
            target_keywords: default_target_keywords(),
        }
    }
}

#[derive(Deserialize, Clone, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub recipient: String,
    /// Takes precedence over `webhook_url`
    #[serde(default)]
    pub sendgrid_api_key: Option<String>,
    /// Sender address for SendGrid mail
    #[serde(default)]
    pub from_email: String,
    /// Console delivery when neither transport is set
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyConfig")
            .field("recipient", &self.recipient)
            .field("sendgrid_api_key", &self.sendgrid_api_key.as_ref().map(|_| "<redacted>"))
            .field("from_email", &self.from_email)
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
fn default_accept_language() -> String { "ja,en-US;q=0.7,en;q=0.3".to_string() }
fn default_connect_timeout() -> u64 { 10 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_redirects() -> usize { 5 }
fn default_user_id_field() -> String { "userId".to_string() }
fn default_password_field() -> String { "password".to_string() }
fn default_true() -> bool { true }

fn default_failure_keywords() -> Vec<String> {
    ["エラー", "error", "失敗", "failed", "ログインできません", "パスワードが正しくありません"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_success_keywords() -> Vec<String> {
    ["メニュー", "ホーム", "予約", "logout", "ログアウト"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_court_markers() -> Vec<String> {
    vec!["コート".to_string(), "court".to_string()]
}

// "可" is left out on purpose: it also matches "不可"
fn default_available_markers() -> Vec<String> {
    ["○", "◯", "空き", "available", "open"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_unavailable_markers() -> Vec<String> {
    ["×", "✕", "満", "不可", "空きなし", "unavailable", "not available", "not open", "closed", "reopen"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_target_keywords() -> Vec<String> {
    ["テニス", "tennis", "コート"].iter().map(|s| s.to_string()).collect()
}
