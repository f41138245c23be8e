//! Error taxonomy for the proxy core
//! Every failure maps to a stable client-visible code and a definite HTTP status

use hyper::StatusCode;
use thiserror::Error;

/// Failures this core can surface to the boundary.
///
/// Upstream 4xx responses are deliberately absent: they are deliverable
/// results passed through to the client, not faults of this system.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The inbound request carried no descriptor parameter
    #[error("missing descriptor parameter")]
    MissingParameter,

    /// The token did not decode to a valid {url, headers} descriptor
    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),

    /// The upstream answered with a 5xx status
    #[error("upstream returned {status} for {url}")]
    UpstreamServerError { status: u16, url: String },

    /// The upstream did not answer within the request timeout
    #[error("upstream request timed out: {url}")]
    Timeout { url: String },

    /// The redirect chain exceeded the configured limit
    #[error("too many redirects fetching {url}")]
    TooManyRedirects { url: String },

    /// Connection-level failure talking to the upstream
    #[error("upstream transport failure for {url}: {message}")]
    Transport { url: String, message: String },
}

impl ProxyError {
    /// Stable code placed in the client-visible error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParameter => "MISSING_PARAMETER",
            Self::MalformedDescriptor(_) => "INVALID_PARAMETER",
            Self::Timeout { .. } => "UPSTREAM_TIMEOUT",
            Self::UpstreamServerError { .. } | Self::TooManyRedirects { .. } | Self::Transport { .. } => {
                "UPSTREAM_ERROR"
            }
        }
    }

    /// HTTP status the boundary answers with
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter | Self::MalformedDescriptor(_) => StatusCode::BAD_REQUEST,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamServerError { .. } | Self::TooManyRedirects { .. } | Self::Transport { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Upstream target involved in the failure, when there is one
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::UpstreamServerError { url, .. }
            | Self::Timeout { url }
            | Self::TooManyRedirects { url }
            | Self::Transport { url, .. } => Some(url),
            Self::MissingParameter | Self::MalformedDescriptor(_) => None,
        }
    }
}
