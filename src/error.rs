use std::sync::Arc;

use thiserror::Error;

/// Every failure the client, coordinator and registry can report.
///
/// `Clone` so a single refresh outcome can be handed to every caller that
/// joined it; the reqwest error is shared behind an `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Connection refused, DNS failure, timeout and other transport faults.
    #[error("transport error: {0}")]
    Transport(#[source] Arc<reqwest::Error>),

    /// Login rejected: non-200 on the login endpoint or no token in the body.
    #[error("authentication failed: {message}")]
    Auth { status: Option<u16>, message: String },

    /// Upstream reported a business failure, or a non-login endpoint
    /// answered with a non-200 status.
    #[error("API error: {message}")]
    Api { status: Option<u16>, message: String },

    /// The body could not be parsed as JSON.
    #[error("malformed response: {message}")]
    Decode { message: String, body: String },

    #[error("invalid control code: {0} (expected 1, 2 or 3)")]
    InvalidCommand(i64),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("device {0} is already registered")]
    AlreadyRegistered(String),

    #[error("device {0} is not registered")]
    NotRegistered(String),

    #[error("coordinator has been shut down")]
    Shutdown,

    #[error("refresh task aborted: {0}")]
    RefreshAborted(String),
}

impl Error {
    pub(crate) fn auth(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Auth {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Api {
            status,
            message: message.into(),
        }
    }

    /// Failures that came from talking to the cloud API, as opposed to
    /// local configuration or lifecycle errors.
    pub fn is_device_api(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Auth { .. } | Error::Api { .. } | Error::Decode { .. }
        )
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(e) if e.is_timeout())
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }

    pub fn is_api(&self) -> bool {
        matches!(self, Error::Api { .. })
    }

    /// HTTP status attached to the failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Auth { status, .. } | Error::Api { status, .. } => *status,
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(Arc::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
