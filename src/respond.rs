//! Response adaptation
//! Shapes an upstream response into the outbound reply for both transport
//! modes, rewriting manifest bodies before their headers are finalized

use crate::descriptor::DescriptorCodec;
use crate::fetch::{UpstreamBody, UpstreamResponse};
use crate::manifest;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{
    HeaderMap, HeaderName, ACCEPT_RANGES, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH,
    CONTENT_RANGE, CONTENT_TYPE, ETAG, LAST_MODIFIED,
};
use hyper::{Response, StatusCode};
use std::collections::HashMap;

/// Body type shared by every outbound response
pub type ProxyBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Ordered extension -> content-type fallback for upstreams that omit the
/// header; first match wins
const CONTENT_TYPES: &[(&str, &str)] = &[
    (".m3u8", "application/vnd.apple.mpegurl"),
    (".mpd", "application/dash+xml"),
    (".vtt", "text/vtt"),
    (".webvtt", "text/vtt"),
    (".srt", "application/x-subrip"),
    (".ts", "video/mp2t"),
    (".m4s", "video/iso.segment"),
    (".mp4", "video/mp4"),
    (".m4v", "video/mp4"),
    (".m4a", "audio/mp4"),
    (".mp3", "audio/mpeg"),
    (".aac", "audio/aac"),
    (".flac", "audio/flac"),
    (".wav", "audio/wav"),
    (".webm", "video/webm"),
    (".mkv", "video/x-matroska"),
    (".key", "application/octet-stream"),
    (".bin", "application/octet-stream"),
];

/// Relayed verbatim in streaming mode when the upstream supplied them
const STREAM_RELAY_HEADERS: [HeaderName; 5] = [
    CONTENT_RANGE,
    CONTENT_LENGTH,
    ACCEPT_RANGES,
    ETAG,
    LAST_MODIFIED,
];

/// Build a finite body
pub fn full_body(bytes: Bytes) -> ProxyBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

/// Build an empty body
pub fn empty_body() -> ProxyBody {
    full_body(Bytes::new())
}

/// Infer a content type from the target URL's extension
pub fn infer_content_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(ext, _)| path.ends_with(ext))
        .map(|(_, content_type)| *content_type)
        .unwrap_or("application/octet-stream")
}

/// Shape the outbound reply. The upstream status always passes through, so
/// 206 and 4xx reach the client unchanged.
pub fn adapt(
    upstream: UpstreamResponse,
    forwarded: &HashMap<String, String>,
    codec: &DescriptorCodec,
) -> Response<ProxyBody> {
    let UpstreamResponse {
        status,
        content_type,
        headers,
        mode: _,
        url,
        body,
    } = upstream;

    match body {
        UpstreamBody::Buffered(bytes) => {
            if manifest::looks_like_manifest(content_type.as_deref(), &url) {
                buffered_manifest(status, bytes, content_type, &headers, &url, forwarded, codec)
            } else {
                buffered_passthrough(status, content_type, &headers, bytes)
            }
        }
        UpstreamBody::Streaming(response) => {
            streaming(status, content_type, &headers, &url, response)
        }
    }
}

/// Buffered manifest: rewrite the body, then finalize length and type
fn buffered_manifest(
    status: StatusCode,
    bytes: Bytes,
    content_type: Option<String>,
    upstream_headers: &HeaderMap,
    url: &str,
    forwarded: &HashMap<String, String>,
    codec: &DescriptorCodec,
) -> Response<ProxyBody> {
    // Manifests are text; a body that does not decode is relayed untouched
    let text = match std::str::from_utf8(&bytes) {
        Ok(text) => text,
        Err(_) => return buffered_passthrough(status, content_type, upstream_headers, bytes),
    };

    let rewritten = manifest::rewrite_manifest(text, url, forwarded, codec);

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, manifest_content_type(content_type.as_deref(), url))
        .header(CONTENT_LENGTH, rewritten.len().to_string())
        .header(CACHE_CONTROL, "no-cache")
        .body(full_body(Bytes::from(rewritten)))
        .unwrap()
}

/// Content type emitted for a rewritten manifest
fn manifest_content_type(upstream: Option<&str>, url: &str) -> &'static str {
    let is_dash = upstream
        .map(|ct| ct.to_ascii_lowercase().contains("dash+xml"))
        .unwrap_or(false);
    if is_dash || infer_content_type(url) == "application/dash+xml" {
        "application/dash+xml"
    } else {
        "application/vnd.apple.mpegurl"
    }
}

/// Buffered non-manifest: body and content type pass through, with defaults
/// only where the upstream stayed silent
fn buffered_passthrough(
    status: StatusCode,
    content_type: Option<String>,
    upstream_headers: &HeaderMap,
    bytes: Bytes,
) -> Response<ProxyBody> {
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());

    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, bytes.len().to_string());

    builder = match upstream_headers.get(CACHE_CONTROL) {
        Some(value) => builder.header(CACHE_CONTROL, value),
        None => builder.header(CACHE_CONTROL, "public, max-age=3600"),
    };
    builder = match upstream_headers.get(ACCEPT_RANGES) {
        Some(value) => builder.header(ACCEPT_RANGES, value),
        None => builder.header(ACCEPT_RANGES, "bytes"),
    };
    builder = match upstream_headers.get(CONTENT_DISPOSITION) {
        Some(value) => builder.header(CONTENT_DISPOSITION, value),
        None => builder.header(CONTENT_DISPOSITION, "inline"),
    };
    // A buffered 206 still needs its range header relayed
    if let Some(value) = upstream_headers.get(CONTENT_RANGE) {
        builder = builder.header(CONTENT_RANGE, value);
    }

    builder.body(full_body(bytes)).unwrap()
}

/// Streaming: relay range/caching headers and hand the live byte sequence
/// straight through. Dropping the body (client gone) drops the upstream
/// response and releases its connection.
fn streaming(
    status: StatusCode,
    content_type: Option<String>,
    upstream_headers: &HeaderMap,
    url: &str,
    response: reqwest::Response,
) -> Response<ProxyBody> {
    let content_type = content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| infer_content_type(url).to_string());

    let mut builder = Response::builder().status(status).header(CONTENT_TYPE, content_type);

    for name in STREAM_RELAY_HEADERS {
        if let Some(value) = upstream_headers.get(&name) {
            builder = builder.header(name, value);
        }
    }

    let stream = response
        .bytes_stream()
        .map_ok(Frame::data)
        .map_err(std::io::Error::other);

    builder.body(StreamBody::new(stream).boxed_unsync()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_content_type_manifests_and_subtitles() {
        assert_eq!(
            infer_content_type("https://a.example/master.m3u8"),
            "application/vnd.apple.mpegurl"
        );
        assert_eq!(
            infer_content_type("https://a.example/manifest.mpd"),
            "application/dash+xml"
        );
        assert_eq!(infer_content_type("https://a.example/subs.vtt"), "text/vtt");
        assert_eq!(
            infer_content_type("https://a.example/subs.srt"),
            "application/x-subrip"
        );
    }

    #[test]
    fn test_infer_content_type_media_containers() {
        assert_eq!(infer_content_type("https://a.example/seg1.ts"), "video/mp2t");
        assert_eq!(infer_content_type("https://a.example/movie.mp4"), "video/mp4");
        assert_eq!(infer_content_type("https://a.example/audio.m4a"), "audio/mp4");
        assert_eq!(infer_content_type("https://a.example/track.mp3"), "audio/mpeg");
    }

    #[test]
    fn test_infer_content_type_ignores_query_and_defaults() {
        assert_eq!(
            infer_content_type("https://a.example/seg1.ts?token=abc"),
            "video/mp2t"
        );
        assert_eq!(
            infer_content_type("https://a.example/unknown.xyz"),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_manifest_content_type_prefers_dash_markers() {
        assert_eq!(
            manifest_content_type(Some("application/dash+xml"), "https://a.example/x"),
            "application/dash+xml"
        );
        assert_eq!(
            manifest_content_type(Some("text/plain"), "https://a.example/m.mpd"),
            "application/dash+xml"
        );
        assert_eq!(
            manifest_content_type(None, "https://a.example/master.m3u8"),
            "application/vnd.apple.mpegurl"
        );
    }
}
