use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use courtwatch_core::{CheckError, FetchResponse, HttpMethod, HttpRequest};

/// One HTTP exchange with the reservation site. Implementations must not follow
/// redirects or keep cookies; the session manager does both.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    fn name(&self) -> &str;
    async fn send(&self, request: HttpRequest) -> Result<FetchResponse, CheckError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    request_timeout_seconds: u64,
}

impl ReqwestTransport {
    pub fn new(connect_timeout_seconds: u64, request_timeout_seconds: u64) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(connect_timeout_seconds))
            .timeout(Duration::from_secs(request_timeout_seconds))
            .build()
            .map_err(|e| CheckError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            request_timeout_seconds,
        })
    }

    fn map_error(&self, url: &Url, e: reqwest::Error) -> CheckError {
        warn!(url = %url, error = %e, "request failed");
        if e.is_timeout() {
            CheckError::Timeout(self.request_timeout_seconds)
        } else {
            CheckError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    fn name(&self) -> &str {
        "reqwest"
    }

    async fn send(&self, request: HttpRequest) -> Result<FetchResponse, CheckError> {
        let start = Instant::now();
        let url = request.url.clone();
        debug!(url = %url, method = ?request.method, "sending request");

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url.as_str()),
            HttpMethod::Post => self.client.post(url.as_str()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await.map_err(|e| self.map_error(&url, e))?;

        let status = resp.status().as_u16();
        let final_url = Url::parse(resp.url().as_str()).unwrap_or_else(|_| url.clone());

        let mut headers = Vec::new();
        for (k, v) in resp.headers() {
            if let Ok(val) = v.to_str() {
                headers.push((k.as_str().to_string(), val.to_string()));
            }
        }

        let body = resp.text().await.map_err(|e| self.map_error(&url, e))?;

        Ok(FetchResponse {
            url,
            final_url,
            status,
            headers,
            body,
            fetched_at: chrono::Utc::now(),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}
