use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("login page unreachable: {0}")]
    LoginPageUnreachable(Box<CheckError>),

    #[error("login failed: {0}")]
    LoginRejected(String),

    #[error("target page not found")]
    TargetNotFound,

    #[error("no court rows found")]
    ParseEmpty,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("config error: {0}")]
    Config(String),
}

impl CheckError {
    /// Court label used for the records synthesised when a cycle fails.
    pub fn degraded_label(&self) -> String {
        match self {
            CheckError::ParseEmpty => "no data".to_string(),
            other => other.to_string(),
        }
    }

    /// Transport-level failures, as opposed to answers from the site we did not like.
    pub fn is_transport(&self) -> bool {
        match self {
            CheckError::Transport(_) | CheckError::Timeout(_) => true,
            CheckError::LoginPageUnreachable(inner) => inner.is_transport(),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            CheckError::Timeout(_) => true,
            CheckError::LoginPageUnreachable(inner) => inner.is_timeout(),
            _ => false,
        }
    }
}
