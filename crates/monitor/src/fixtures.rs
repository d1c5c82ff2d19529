use std::sync::Arc;

use courtwatch_core::MonitorConfig;
use courtwatch_session::testing::ScriptedTransport;
use courtwatch_session::{Credentials, LoginRules, SessionManager, SessionSettings};
use url::Url;

pub const LOGIN_PAGE: &str = r#"<form action="/web/login.do" method="post">
    <input type="hidden" name="displayNo" value="p1"></form>"#;

pub const LANDING_PAGE: &str = r#"<html><body>
    <a href="/web/menu.do">メニュー</a>
    <a href="/web/rsvWTennisAction.do">テニス 空き状況</a>
    </body></html>"#;

pub const RESULTS_PAGE: &str = r#"<table>
    <tr><td>テニスコートA</td><td>○ 空きあり</td></tr>
    </table>"#;

pub const FULL_PAGE: &str = "<table><tr><td>コート1</td><td>×</td></tr><tr><td>コート2</td><td>満</td></tr></table>";

pub fn session(transport: &Arc<ScriptedTransport>) -> SessionManager {
    let settings = SessionSettings {
        login_url: Url::parse("https://reserve.example.jp/web/login.do").unwrap(),
        credentials: Credentials {
            identifier: "1001".into(),
            secret: "secret".into(),
        },
        identifier_field: "userId".into(),
        secret_field: "password".into(),
        user_agent: "test".into(),
        accept_language: "ja".into(),
        max_redirects: 3,
        rules: LoginRules::default(),
    };
    SessionManager::new(transport.clone(), settings)
}

/// Queue one full login + results exchange
pub fn push_cycle(transport: &ScriptedTransport, results: &str) {
    transport.push_page(200, LOGIN_PAGE);
    transport.push_page(200, LANDING_PAGE);
    transport.push_page(200, results);
}

pub fn monitor_config(locations: &[&str], time_slots: &[&str], dates: &[&str]) -> MonitorConfig {
    MonitorConfig {
        locations: locations.iter().map(|s| s.to_string()).collect(),
        time_slots: time_slots.iter().map(|s| s.to_string()).collect(),
        dates: dates.iter().map(|d| d.parse().unwrap()).collect(),
        interval_minutes: 5,
        active: true,
    }
}
