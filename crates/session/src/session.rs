use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use url::Url;

use courtwatch_core::{AppConfig, CheckError, FetchResponse, HttpRequest, SessionState};
use courtwatch_parser::html::{self, LoginForm};

use crate::rules::{LoginRules, LoginVerdict};
use crate::transport::{HttpTransport, ReqwestTransport};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const GENERIC_REJECTION: &str = "login rejected by site";

#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub login_url: Url,
    pub credentials: Credentials,
    pub identifier_field: String,
    pub secret_field: String,
    pub user_agent: String,
    pub accept_language: String,
    pub max_redirects: usize,
    pub rules: LoginRules,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, CheckError> {
        let login_url = Url::parse(&config.site.login_url)
            .map_err(|e| CheckError::InvalidUrl(format!("{}: {}", config.site.login_url, e)))?;

        Ok(Self {
            login_url,
            credentials: Credentials {
                identifier: config.credentials.user_id.clone(),
                secret: config.credentials.password.clone(),
            },
            identifier_field: config.credentials.user_id_field.clone(),
            secret_field: config.credentials.password_field.clone(),
            user_agent: config.site.user_agent.clone(),
            accept_language: config.site.accept_language.clone(),
            max_redirects: config.site.max_redirects,
            rules: LoginRules::from_config(&config.login),
        })
    }
}

/// Login state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Anonymous,
    FetchingLoginPage,
    SubmittingCredentials,
    Authenticated,
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: LoginState,
    pub to: LoginState,
    pub at: DateTime<Utc>,
}

/// Result of a successful login: the page the site showed after the POST
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub landing_page: FetchResponse,
}

/// Owns the cookie jar and drives the login sequence against the reservation site.
///
/// Not meant for concurrent use: every request mutates the jar in place. Callers
/// hold it by `&mut` and the poll scheduler runs one check at a time.
pub struct SessionManager {
    transport: Arc<dyn HttpTransport>,
    settings: SessionSettings,
    state: SessionState,
    login_state: LoginState,
    transitions: Vec<StateTransition>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: SessionSettings) -> Self {
        Self {
            transport,
            settings,
            state: SessionState::new(),
            login_state: LoginState::Anonymous,
            transitions: Vec::new(),
        }
    }

    /// Session over a real HTTP client configured from `config.site`
    pub fn from_config(config: &AppConfig) -> Result<Self, CheckError> {
        let transport = ReqwestTransport::new(
            config.site.connect_timeout_seconds,
            config.site.request_timeout_seconds,
        )?;
        let settings = SessionSettings::from_config(config)?;
        Ok(Self::new(Arc::new(transport), settings))
    }

    pub fn state(&self) -> &LoginState {
        &self.login_state
    }

    pub fn session(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Transitions of the most recent login attempt
    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn is_authenticated(&self) -> bool {
        self.login_state == LoginState::Authenticated
    }

    /// Drop cookies and return to `Anonymous`
    pub fn logout(&mut self) {
        info!("session reset");
        self.state.reset();
        self.transitions.clear();
        self.login_state = LoginState::Anonymous;
    }

    /// Fetch the login page, submit its form with our credentials and classify the answer.
    ///
    /// Cookies already in the jar are sent along; a previous session is not discarded.
    pub async fn login(&mut self) -> Result<LoginSuccess, CheckError> {
        self.transitions.clear();
        self.login_state = LoginState::Anonymous;
        self.state.authenticated = false;
        self.state.last_login_attempt_at = Some(Utc::now());

        let login_url = self.settings.login_url.clone();
        self.transition(LoginState::FetchingLoginPage);

        let page = match self.authenticated_fetch(HttpRequest::get(login_url.clone())).await {
            Ok(page) if page.is_success() => page,
            Ok(page) => {
                let err = unreachable_login_page(CheckError::Transport(format!("HTTP {}", page.status)));
                return Err(self.fail(err.to_string(), err));
            }
            Err(err) => {
                let err = unreachable_login_page(err);
                return Err(self.fail(err.to_string(), err));
            }
        };
        debug!(url = %login_url, bytes = page.body.len(), "login page fetched");

        let form = html::extract_login_form(&page.body);
        let action = match form.action_url.as_deref() {
            Some(action) => match resolve_against_origin(&login_url, action) {
                Ok(url) => url,
                Err(err) => return Err(self.fail(err.to_string(), err)),
            },
            None => login_url.clone(),
        };
        debug!(action = %action, hidden_fields = form.hidden_fields.len(), "login form extracted");

        self.transition(LoginState::SubmittingCredentials);
        let request = HttpRequest::post_form(action, self.login_body(&form))
            .header("Referer", login_url.as_str())
            .header("Origin", login_url.origin().ascii_serialization());

        let response = match self.authenticated_fetch(request).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(format!("login submit failed: {}", err), err)),
        };

        let verdict = match self.settings.rules.first_match(&response.body) {
            Some((verdict, keyword)) => {
                debug!(keyword, verdict = ?verdict, "keyword in login response");
                verdict
            }
            None => {
                let fallback = self.settings.rules.fallback();
                debug!(verdict = ?fallback, "login response unrecognised");
                fallback
            }
        };

        if verdict == LoginVerdict::Rejected {
            let reason = html::extract_error_message(&response.body)
                .unwrap_or_else(|| GENERIC_REJECTION.to_string());
            return Err(self.fail(reason.clone(), CheckError::LoginRejected(reason)));
        }

        self.state.authenticated = true;
        self.transition(LoginState::Authenticated);
        info!(cookies = self.state.cookies.len(), "logged in");
        Ok(LoginSuccess { landing_page: response })
    }

    /// Send a request with the jar's cookies and browser-like headers, merging any
    /// cookies the site sets. Redirects are followed here so cookies set on the
    /// intermediate responses are kept. Non-2xx responses are returned, not raised.
    pub async fn authenticated_fetch(&mut self, request: HttpRequest) -> Result<FetchResponse, CheckError> {
        let requested_url = request.url.clone();
        let mut request = request;
        let mut hops = 0;

        loop {
            let response = self.send_once(request.clone()).await?;

            let location = response.header("location").map(str::to_string);
            let next = match location {
                Some(location) if response.is_redirect() && hops < self.settings.max_redirects => {
                    response.final_url.join(&location).map_err(|e| {
                        CheckError::InvalidUrl(format!("redirect to {}: {}", location, e))
                    })?
                }
                _ => {
                    if response.is_redirect() {
                        warn!(url = %response.final_url, hops, "redirect not followed");
                    }
                    return Ok(FetchResponse {
                        url: requested_url,
                        ..response
                    });
                }
            };

            hops += 1;
            debug!(from = %response.final_url, to = %next, status = response.status, "following redirect");
            request = match response.status {
                // 307/308 repeat the request as-is
                307 | 308 => HttpRequest { url: next, ..request },
                _ => HttpRequest::get(next).header("Referer", response.final_url.as_str()),
            };
        }
    }

    async fn send_once(&mut self, mut request: HttpRequest) -> Result<FetchResponse, CheckError> {
        if !request.has_header("User-Agent") {
            request = request.header("User-Agent", self.settings.user_agent.clone());
        }
        if !request.has_header("Accept") {
            request = request.header("Accept", ACCEPT_HTML);
        }
        if !request.has_header("Accept-Language") {
            request = request.header("Accept-Language", self.settings.accept_language.clone());
        }
        if !self.state.cookies.is_empty() {
            request = request.header("Cookie", self.state.cookies.to_header());
        }

        let response = self.transport.send(request).await?;

        let mut merged = 0;
        for value in response.set_cookie_headers() {
            merged += self.state.cookies.merge_set_cookie(value);
        }
        debug!(
            url = %response.final_url,
            status = response.status,
            ms = response.response_time_ms,
            cookies_set = merged,
            "response received"
        );
        Ok(response)
    }

    /// Hidden fields plus credentials, URL-encoded. Credentials override hidden
    /// fields of the same name.
    fn login_body(&self, form: &LoginForm) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in &form.hidden_fields {
            if name == &self.settings.identifier_field || name == &self.settings.secret_field {
                continue;
            }
            serializer.append_pair(name, value);
        }
        serializer.append_pair(&self.settings.identifier_field, &self.settings.credentials.identifier);
        serializer.append_pair(&self.settings.secret_field, &self.settings.credentials.secret);
        serializer.finish()
    }

    fn transition(&mut self, to: LoginState) {
        let from = std::mem::replace(&mut self.login_state, to.clone());
        debug!(from = ?from, to = ?to, "login state");
        self.transitions.push(StateTransition {
            from,
            to,
            at: Utc::now(),
        });
    }

    fn fail(&mut self, reason: String, err: CheckError) -> CheckError {
        warn!(reason = %reason, "login failed");
        self.state.authenticated = false;
        self.transition(LoginState::Failed { reason });
        err
    }
}

fn unreachable_login_page(cause: CheckError) -> CheckError {
    CheckError::LoginPageUnreachable(Box::new(cause))
}

/// Resolve a link found on the site. Absolute http(s) URLs are kept; anything else
/// is resolved against the origin of `base`, not its path.
pub fn resolve_against_origin(base: &Url, link: &str) -> Result<Url, CheckError> {
    let link = link.trim();
    if let Ok(absolute) = Url::parse(link) {
        return match absolute.scheme() {
            "http" | "https" => Ok(absolute),
            other => Err(CheckError::InvalidUrl(format!("unsupported scheme {}: {}", other, link))),
        };
    }
    base.join("/")
        .and_then(|origin| origin.join(link))
        .map_err(|e| CheckError::InvalidUrl(format!("{}: {}", link, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use courtwatch_core::HttpMethod;

    const LOGIN_URL: &str = "https://reserve.example.jp/web/login.do";

    const LOGIN_PAGE: &str = r#"
        <form method="post" action="rsvWUserAttestationLoginAction.do">
          <input type="hidden" name="displayNo" value="pawab2000">
          <input type="hidden" name="userId" value="should-be-overridden">
          <input type="text" name="userId">
          <input type="password" name="password">
        </form>
    "#;

    fn settings() -> SessionSettings {
        SessionSettings {
            login_url: Url::parse(LOGIN_URL).unwrap(),
            credentials: Credentials {
                identifier: "10010000".into(),
                secret: "p@ss word".into(),
            },
            identifier_field: "userId".into(),
            secret_field: "password".into(),
            user_agent: "test-agent".into(),
            accept_language: "ja".into(),
            max_redirects: 3,
            rules: LoginRules::default(),
        }
    }

    fn manager(transport: &Arc<ScriptedTransport>) -> SessionManager {
        SessionManager::new(transport.clone(), settings())
    }

    #[tokio::test]
    async fn test_login_success_submits_form_with_cookies() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(200, &[("Set-Cookie", "JSESSIONID=s1; Path=/web")], LOGIN_PAGE);
        transport.push_response(
            200,
            &[("Set-Cookie", "JSESSIONID=s2; Path=/web, auth=ok")],
            "<a href='/web/menu.do'>メニュー</a>",
        );
        let mut session = manager(&transport);

        let success = session.login().await.unwrap();

        assert!(success.landing_page.body.contains("メニュー"));
        assert!(session.is_authenticated());
        assert!(session.session().authenticated);
        assert!(session.session().last_login_attempt_at.is_some());
        assert_eq!(session.session().cookies.get("JSESSIONID"), Some("s2"));
        assert_eq!(session.session().cookies.get("auth"), Some("ok"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert!(!requests[0].has_header("Cookie"));

        let post = &requests[1];
        assert_eq!(post.method, HttpMethod::Post);
        // relative action resolves against the origin, not the login page's directory
        assert_eq!(post.url.as_str(), "https://reserve.example.jp/rsvWUserAttestationLoginAction.do");
        assert_eq!(header(post, "Cookie"), Some("JSESSIONID=s1"));
        assert_eq!(header(post, "User-Agent"), Some("test-agent"));
        assert_eq!(header(post, "Origin"), Some("https://reserve.example.jp"));
        assert_eq!(
            post.body.as_deref(),
            Some("displayNo=pawab2000&userId=10010000&password=p%40ss+word")
        );

        let states: Vec<_> = session.transitions().iter().map(|t| t.to.clone()).collect();
        assert_eq!(
            states,
            vec![
                LoginState::FetchingLoginPage,
                LoginState::SubmittingCredentials,
                LoginState::Authenticated,
            ]
        );
    }

    #[tokio::test]
    async fn test_login_rejected_uses_error_element_text() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(200, LOGIN_PAGE);
        transport.push_page(
            200,
            r#"<div class="errorBox">利用者番号またはパスワードが正しくありません</div><a>メニュー</a>"#,
        );
        let mut session = manager(&transport);

        let err = session.login().await.unwrap_err();

        assert_eq!(
            err,
            CheckError::LoginRejected("利用者番号またはパスワードが正しくありません".into())
        );
        assert!(!session.is_authenticated());
        assert!(matches!(session.state(), LoginState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_login_rejected_generic_reason() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(200, LOGIN_PAGE);
        transport.push_page(200, "<p>ログイン失敗</p>");
        let mut session = manager(&transport);

        let err = session.login().await.unwrap_err();

        assert_eq!(err, CheckError::LoginRejected(GENERIC_REJECTION.into()));
    }

    #[tokio::test]
    async fn test_login_page_unreachable() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(503, "down for maintenance");
        let mut session = manager(&transport);

        let err = session.login().await.unwrap_err();

        assert_eq!(
            err,
            CheckError::LoginPageUnreachable(Box::new(CheckError::Transport("HTTP 503".into())))
        );
        assert!(err.is_transport());
        match session.state() {
            LoginState::Failed { reason } => assert!(reason.starts_with("login page unreachable")),
            other => panic!("unexpected state {:?}", other),
        }
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_login_page_timeout() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_error(CheckError::Timeout(30));
        let mut session = manager(&transport);

        let err = session.login().await.unwrap_err();

        assert_eq!(err, CheckError::LoginPageUnreachable(Box::new(CheckError::Timeout(30))));
        assert!(err.is_timeout());
        assert_eq!(session.transitions().len(), 2);
    }

    #[tokio::test]
    async fn test_form_without_action_posts_back_to_login_url() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(200, "<form method='post'><input type='hidden' name='t' value='1'></form>");
        transport.push_page(200, "<html>ok</html>");
        let mut session = manager(&transport);

        session.login().await.unwrap();

        assert_eq!(transport.requests()[1].url.as_str(), LOGIN_URL);
    }

    #[tokio::test]
    async fn test_redirects_followed_with_cookies() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(302, &[("Location", "/web/menu.do"), ("Set-Cookie", "step=1")], "");
        transport.push_page(200, "menu");
        let mut session = manager(&transport);

        let url = Url::parse("https://reserve.example.jp/web/start.do").unwrap();
        let response = session
            .authenticated_fetch(HttpRequest::post_form(url.clone(), "a=1".into()))
            .await
            .unwrap();

        assert_eq!(response.body, "menu");
        assert_eq!(response.url, url);
        let requests = transport.requests();
        assert_eq!(requests[1].method, HttpMethod::Get);
        assert_eq!(requests[1].url.as_str(), "https://reserve.example.jp/web/menu.do");
        assert_eq!(header(&requests[1], "Cookie"), Some("step=1"));
    }

    #[tokio::test]
    async fn test_redirect_limit() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..5 {
            transport.push_response(302, &[("Location", "/loop")], "");
        }
        let mut session = manager(&transport);

        let url = Url::parse("https://reserve.example.jp/loop").unwrap();
        let response = session.authenticated_fetch(HttpRequest::get(url)).await.unwrap();

        assert_eq!(response.status, 302);
        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(404, "missing");
        let mut session = manager(&transport);

        let url = Url::parse("https://reserve.example.jp/nope").unwrap();
        let response = session.authenticated_fetch(HttpRequest::get(url)).await.unwrap();

        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_logout_resets_session() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(200, &[("Set-Cookie", "sid=1")], LOGIN_PAGE);
        transport.push_page(200, "ログアウト");
        let mut session = manager(&transport);
        session.login().await.unwrap();

        session.logout();

        assert_eq!(session.state(), &LoginState::Anonymous);
        assert!(session.session().cookies.is_empty());
        assert!(!session.session().authenticated);
    }

    #[test]
    fn test_resolve_against_origin() {
        let base = Url::parse(LOGIN_URL).unwrap();

        assert_eq!(
            resolve_against_origin(&base, "tennis.do?x=1").unwrap().as_str(),
            "https://reserve.example.jp/tennis.do?x=1"
        );
        assert_eq!(
            resolve_against_origin(&base, "/web/tennis.do").unwrap().as_str(),
            "https://reserve.example.jp/web/tennis.do"
        );
        assert_eq!(
            resolve_against_origin(&base, "https://other.example.com/a").unwrap().as_str(),
            "https://other.example.com/a"
        );
        assert!(resolve_against_origin(&base, "javascript:void(0)").is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let shown = format!("{:?}", settings().credentials);
        assert!(!shown.contains("p@ss"));
    }

    fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
        request
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
