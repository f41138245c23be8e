//! Proxy server implementation
//! Exposes the single proxy endpoint, decodes descriptors and relays
//! upstream responses in buffered or streaming form

use crate::descriptor::{decode_descriptor, DescriptorCodec, DATA_PARAM};
use crate::error::ProxyError;
use crate::fetch::UpstreamFetcher;
use crate::respond::{self, ProxyBody};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, RANGE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Path of the proxy endpoint
    pub route: String,
    /// Externally reachable base used when minting proxy URLs into
    /// rewritten manifests
    pub public_base: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            route: "/proxy".to_string(),
            public_base: "/proxy".to_string(),
        }
    }
}

/// Proxy server
pub struct ProxyServer {
    config: ServerConfig,
    codec: DescriptorCodec,
    fetcher: UpstreamFetcher,
}

impl ProxyServer {
    /// Create a new proxy server
    pub fn new(config: ServerConfig, fetcher: UpstreamFetcher) -> Self {
        let codec = DescriptorCodec::new(config.public_base.clone());
        Self {
            config,
            codec,
            fetcher,
        }
    }

    /// Codec minting URLs back into this server; the sanctioned way for
    /// collaborators to produce client-facing proxy URLs
    pub fn codec(&self) -> &DescriptorCodec {
        &self.codec
    }

    /// Start the server
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Proxy server listening on {}", addr);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = self.clone();

            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, remote_addr).await {
                    debug!("Connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }

    /// Handle a single HTTP connection
    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> Result<()> {
        let io = TokioIo::new(stream);
        let server = self.clone();

        http1::Builder::new()
            .serve_connection(
                io,
                service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req, remote_addr).await }
                }),
            )
            .await
            .map_err(|e| anyhow!("HTTP service error: {}", e))
    }

    /// Route an incoming request
    async fn handle_request(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Response<ProxyBody>, Infallible> {
        let path = req.uri().path();
        debug!("{} {} from {}", req.method(), path, remote_addr);

        // Health check endpoint
        if path == "/health" {
            return Ok(text_response(StatusCode::OK, "OK"));
        }

        if path != self.config.route {
            return Ok(text_response(StatusCode::NOT_FOUND, "Not Found"));
        }

        // Players send CORS preflights before touching media
        if req.method() == Method::OPTIONS {
            return Ok(Response::builder()
                .status(StatusCode::NO_CONTENT)
                .body(respond::empty_body())
                .unwrap());
        }

        let head_only = req.method() == Method::HEAD;

        match self.proxy(&req).await {
            Ok(mut response) => {
                if head_only {
                    *response.body_mut() = respond::empty_body();
                }
                Ok(response)
            }
            Err(e) => {
                error!("Proxy error: {}", e);
                Ok(error_response(&e))
            }
        }
    }

    /// Decode the descriptor, perform the upstream fetch and adapt the reply
    async fn proxy(&self, req: &Request<Incoming>) -> Result<Response<ProxyBody>, ProxyError> {
        let token =
            raw_query_param(req.uri().query(), DATA_PARAM).ok_or(ProxyError::MissingParameter)?;
        let mut descriptor = decode_descriptor(&token)?;

        // Merge the client's Range header into the descriptor (override-only)
        // so partial-content semantics flow end-to-end
        if let Some(range) = req.headers().get(RANGE).and_then(|v| v.to_str().ok()) {
            let range = range.to_string();
            descriptor
                .headers
                .retain(|name, _| !name.eq_ignore_ascii_case("range"));
            descriptor.headers.insert("Range".to_string(), range);
        }

        let upstream = self.fetcher.fetch(&descriptor).await?;
        Ok(respond::adapt(upstream, &descriptor.headers, &self.codec))
    }
}

/// Extract a query value without percent-decoding it; the descriptor token
/// is decoded exactly once, by the codec
fn raw_query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Create a plain-text response
fn text_response(status: StatusCode, body: &str) -> Response<ProxyBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain")
        .body(respond::full_body(Bytes::from(body.to_string())))
        .unwrap()
}

/// Create the structured error envelope for a failed request
fn error_response(err: &ProxyError) -> Response<ProxyBody> {
    let envelope = serde_json::json!({
        "error": {
            "code": err.code(),
            "message": err.to_string(),
            "target": err.target(),
        }
    });

    Response::builder()
        .status(err.status())
        .header(CONTENT_TYPE, "application/json")
        .body(respond::full_body(Bytes::from(envelope.to_string())))
        .unwrap()
}
