//! StreamProxy - Main entry point
//!
//! A media-aware upstream proxy with HLS/DASH manifest rewriting

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use streamproxy::{FetchConfig, ProxyServer, ServerConfig, TransportRule, UpstreamFetcher};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// StreamProxy - A media-aware upstream proxy
#[derive(Parser, Debug)]
#[command(name = "streamproxy")]
#[command(author = "StreamProxy Contributors")]
#[command(version = "1.0.0")]
#[command(about = "A media-aware upstream proxy with HLS/DASH manifest rewriting")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Path of the proxy endpoint
    #[arg(long, env = "PROXY_ROUTE", default_value = "/proxy")]
    route: String,

    /// Externally reachable base URL minted into rewritten manifests
    /// (defaults to the proxy route itself)
    #[arg(long, env = "PUBLIC_BASE")]
    public_base: Option<String>,

    /// Upstream request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30")]
    timeout: u64,

    /// Maximum number of upstream redirects to follow
    #[arg(long, env = "MAX_REDIRECTS", default_value = "5")]
    max_redirects: usize,

    /// Comma-separated URL patterns that select streaming transport,
    /// replacing the built-in media-extension table
    #[arg(long, env = "STREAM_PATTERNS")]
    stream_patterns: Option<String>,

    /// User-Agent sent when a descriptor does not carry one
    #[arg(long, env = "DEFAULT_USER_AGENT")]
    user_agent: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting StreamProxy v1.0.0");
    info!("Port: {}", args.port);
    info!("Proxy route: {}", args.route);

    // Assemble the fetch configuration
    let mut fetch_config = FetchConfig {
        request_timeout: Duration::from_secs(args.timeout),
        max_redirects: args.max_redirects,
        ..FetchConfig::default()
    };

    if let Some(patterns) = args.stream_patterns {
        fetch_config.transport_rules = patterns
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(TransportRule::streaming)
            .collect();
        info!(
            "Streaming transport patterns: {} configured",
            fetch_config.transport_rules.len()
        );
    }

    if let Some(user_agent) = args.user_agent {
        fetch_config.default_user_agent = user_agent;
    }

    let fetcher = UpstreamFetcher::new(fetch_config)?;

    let config = ServerConfig {
        port: args.port,
        route: args.route.clone(),
        public_base: args.public_base.unwrap_or(args.route),
    };

    // Create and run the proxy server
    let server = Arc::new(ProxyServer::new(config, fetcher));

    info!("StreamProxy started successfully");

    server.run().await?;

    Ok(())
}
