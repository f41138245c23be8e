//! Upstream fetching
//! Builds the shared HTTP client, selects buffered vs. streaming transport
//! before any body byte is read, and forwards descriptor headers

use crate::descriptor::ProxyDescriptor;
use crate::error::ProxyError;
use anyhow::Result;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

/// How an upstream body travels to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Full-body fetch-then-respond
    Buffered,
    /// Forward-only, bounded-memory byte relay
    Streaming,
}

/// One entry of the ordered transport-selection table
#[derive(Debug, Clone)]
pub struct TransportRule {
    pattern: String,
    mode: TransportMode,
}

impl TransportRule {
    pub fn new(pattern: impl Into<String>, mode: TransportMode) -> Self {
        Self {
            pattern: pattern.into().to_ascii_lowercase(),
            mode,
        }
    }

    pub fn streaming(pattern: impl Into<String>) -> Self {
        Self::new(pattern, TransportMode::Streaming)
    }

    pub fn buffered(pattern: impl Into<String>) -> Self {
        Self::new(pattern, TransportMode::Buffered)
    }

    fn matches(&self, url: &str) -> bool {
        url.to_ascii_lowercase().contains(&self.pattern)
    }
}

/// Default table: common large-binary media extensions stream, everything
/// else (manifests, subtitles, keys) buffers
pub fn default_transport_rules() -> Vec<TransportRule> {
    [
        ".ts", ".m4s", ".mp4", ".m4v", ".m4a", ".mp3", ".aac", ".flac", ".wav", ".webm", ".mkv",
        ".mov", ".avi",
    ]
    .iter()
    .map(|ext| TransportRule::streaming(*ext))
    .collect()
}

/// Pick the transport for a target URL: first matching rule wins, no match
/// means buffered. Evaluated before the request is sent so large files never
/// transit full-memory handling.
pub fn select_transport(url: &str, rules: &[TransportRule]) -> TransportMode {
    rules
        .iter()
        .find(|rule| rule.matches(url))
        .map(|rule| rule.mode)
        .unwrap_or(TransportMode::Buffered)
}

/// Upstream fetch configuration, assembled once at startup
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub request_timeout: Duration,
    pub max_redirects: usize,
    /// Sent only when the descriptor carries no User-Agent of its own
    pub default_user_agent: String,
    pub transport_rules: Vec<TransportRule>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_redirects: 5,
            default_user_agent: concat!("streamproxy/", env!("CARGO_PKG_VERSION")).to_string(),
            transport_rules: default_transport_rules(),
        }
    }
}

/// Response from one upstream fetch.
///
/// Consumed exactly once by the response adapter. A streaming body holds the
/// live upstream response; dropping it releases the connection on every exit
/// path.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub headers: HeaderMap,
    pub mode: TransportMode,
    /// The descriptor's target, kept for content-type inference and errors
    pub url: String,
    pub body: UpstreamBody,
}

pub enum UpstreamBody {
    Buffered(Bytes),
    Streaming(reqwest::Response),
}

/// Issues upstream requests on behalf of decoded descriptors
pub struct UpstreamFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl UpstreamFetcher {
    /// Build the fetcher and its shared client
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Perform the fetch a descriptor describes.
    ///
    /// Any status below 500 is a deliverable result (4xx passes through to
    /// the caller); 5xx and transport failures become errors. No retries.
    pub async fn fetch(&self, descriptor: &ProxyDescriptor) -> Result<UpstreamResponse, ProxyError> {
        let mode = select_transport(&descriptor.url, &self.config.transport_rules);
        debug!("Fetching {} ({:?})", descriptor.url, mode);

        let mut request = self.client.get(&descriptor.url);

        // Forward every descriptor header; forwarding is additive, nothing
        // is dropped without a trace
        let mut has_user_agent = false;
        for (name, value) in &descriptor.headers {
            if name.eq_ignore_ascii_case("user-agent") {
                has_user_agent = true;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(header_name), Ok(header_value)) => {
                    request = request.header(header_name, header_value);
                }
                _ => warn!("Skipping unrepresentable header {:?} for {}", name, descriptor.url),
            }
        }
        if !has_user_agent {
            request = request.header(USER_AGENT, &self.config.default_user_agent);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_send_error(&descriptor.url, e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProxyError::UpstreamServerError {
                status: status.as_u16(),
                url: descriptor.url.clone(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let headers = response.headers().clone();

        let body = match mode {
            TransportMode::Buffered => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| classify_send_error(&descriptor.url, e))?;
                debug!("Buffered {} bytes from {}", bytes.len(), descriptor.url);
                UpstreamBody::Buffered(bytes)
            }
            TransportMode::Streaming => UpstreamBody::Streaming(response),
        };

        Ok(UpstreamResponse {
            status,
            content_type,
            headers,
            mode,
            url: descriptor.url.clone(),
            body,
        })
    }
}

/// Map a reqwest failure onto the error taxonomy
fn classify_send_error(url: &str, err: reqwest::Error) -> ProxyError {
    if err.is_timeout() {
        ProxyError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_redirect() {
        ProxyError::TooManyRedirects {
            url: url.to_string(),
        }
    } else {
        ProxyError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
