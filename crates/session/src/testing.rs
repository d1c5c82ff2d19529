//! Scripted transport for tests: replays queued responses in order and records
//! every request it receives.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use courtwatch_core::{CheckError, FetchResponse, HttpRequest};

use crate::transport::HttpTransport;

type Scripted = Result<(u16, Vec<(String, String)>, String), CheckError>;

#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every response is held back for `delay` (tokio time, so paused clocks apply)
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push_page(&self, status: u16, body: &str) {
        self.push_response(status, &[], body);
    }

    pub fn push_response(&self, status: u16, headers: &[(&str, &str)], body: &str) {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.lock_responses().push_back(Ok((status, headers, body.to_string())));
    }

    pub fn push_error(&self, error: CheckError) {
        self.lock_responses().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn remaining(&self) -> usize {
        self.lock_responses().len()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Scripted>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, request: HttpRequest) -> Result<FetchResponse, CheckError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let url = request.url.clone();
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let next = self.lock_responses().pop_front();
        let (status, headers, body) = match next {
            Some(scripted) => scripted?,
            None => return Err(CheckError::Transport("no scripted response left".into())),
        };

        Ok(FetchResponse {
            url: url.clone(),
            final_url: url,
            status,
            headers,
            body,
            fetched_at: chrono::Utc::now(),
            response_time_ms: 0,
        })
    }
}
