//! StreamProxy - a media-aware upstream proxy
//!
//! Sits between media players and third-party hosting origins, providing:
//! - Opaque `{url, headers}` descriptors carried as a single query value
//! - HLS/DASH manifest rewriting so every embedded URL flows back through
//!   the proxy
//! - Buffered or streaming transport selected per target URL
//! - Range/partial-content forwarding for large binary media

pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod resolve;
pub mod respond;
pub mod server;

pub use descriptor::{decode_descriptor, encode_descriptor, DescriptorCodec, ProxyDescriptor};
pub use error::ProxyError;
pub use fetch::{FetchConfig, TransportMode, TransportRule, UpstreamFetcher};
pub use server::{ProxyServer, ServerConfig};
