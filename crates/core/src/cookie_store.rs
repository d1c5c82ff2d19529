/// Session cookie storage for the reservation site
/// Single origin, so no domain/path scoping and no expiry handling

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CookieJar {
    // name -> value
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a cookie, overwriting any previous value under the same name
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn all(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Serialize as a `Cookie` request header value
    pub fn to_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Merge a `Set-Cookie` header value into the jar.
    ///
    /// Several cookies may be folded into one value separated by commas. Only the
    /// `name=value` pair in front of the first `;` of each entry is kept; attribute
    /// fragments such as the tail of an `Expires` date carry no `=` and are skipped.
    /// Returns the number of cookies stored.
    pub fn merge_set_cookie(&mut self, header_value: &str) -> usize {
        let mut stored = 0;
        for entry in header_value.split(',') {
            let pair = entry.split(';').next().unwrap_or("");
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                continue;
            }
            self.set(name, value);
            stored += 1;
        }
        stored
    }
}

/// Authenticated-session state owned by one session manager
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    pub cookies: CookieJar,
    pub authenticated: bool,
    pub last_login_attempt_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget cookies and authentication, as after a logout or restart
    pub fn reset(&mut self) {
        self.cookies.clear();
        self.authenticated = false;
        self.last_login_attempt_at = None;
    }
}
