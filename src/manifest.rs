//! Manifest rewriting
//! Line-by-line classification and URL substitution for HLS/DASH playlists,
//! so every segment, variant and key fetch flows back through the proxy

use crate::descriptor::DescriptorCodec;
use crate::resolve::resolve;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

/// Media/subtitle/key extensions that mark a plain line as URL-like
const URL_LIKE_EXTENSIONS: &[&str] = &[
    ".m3u8", ".mpd", ".ts", ".m4s", ".mp4", ".m4a", ".m4v", ".mp3", ".aac", ".vtt", ".srt",
    ".webvtt", ".key", ".bin",
];

/// Quoted URI attribute inside a manifest directive, either quote style
static URI_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"URI=(?:"([^"]*)"|'([^']*)')"#).unwrap());

/// Bare `name.ext` shape, optionally with a query string
static BARE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.\-]+\.[A-Za-z0-9]{1,5}(\?\S*)?$").unwrap());

/// Shape of a single manifest line. Recomputed per line on every rewrite;
/// the only cross-line state is the base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    /// Directive or comment without an embedded URI attribute
    Directive,
    /// Directive carrying one or more quoted URI attributes
    DirectiveWithUri,
    /// Plain line that looks like a segment/variant/key URL
    UrlLine,
    /// Anything else; passed through untouched
    Opaque,
}

/// Classify one manifest line
pub fn classify_line(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with('#') {
        if URI_ATTRIBUTE.is_match(trimmed) {
            return LineKind::DirectiveWithUri;
        }
        return LineKind::Directive;
    }
    if is_url_like(trimmed) {
        return LineKind::UrlLine;
    }
    LineKind::Opaque
}

/// URL-likeness heuristic for non-directive lines
fn is_url_like(candidate: &str) -> bool {
    if candidate.starts_with("http://")
        || candidate.starts_with("https://")
        || candidate.starts_with("//")
        || candidate.starts_with('/')
    {
        return true;
    }
    if candidate.contains('/') {
        return true;
    }
    let lower = candidate.to_ascii_lowercase();
    if URL_LIKE_EXTENSIONS.iter().any(|ext| lower.contains(ext)) {
        return true;
    }
    BARE_FILE.is_match(candidate)
}

/// Replace every quoted `URI` attribute value on a directive line with a
/// proxy URL, preserving the original quote character and every other
/// attribute verbatim
pub fn rewrite_uri_attributes(
    line: &str,
    base_url: &str,
    headers: &HashMap<String, String>,
    codec: &DescriptorCodec,
) -> String {
    URI_ATTRIBUTE
        .replace_all(line, |caps: &Captures<'_>| {
            let (value, quote) = if let Some(double_quoted) = caps.get(1) {
                (double_quoted.as_str(), '"')
            } else if let Some(single_quoted) = caps.get(2) {
                (single_quoted.as_str(), '\'')
            } else {
                return caps[0].to_string();
            };
            let absolute = resolve(base_url, value);
            format!(
                "URI={quote}{url}{quote}",
                quote = quote,
                url = codec.proxy_url(&absolute, headers)
            )
        })
        .into_owned()
}

/// Rewrite a manifest body so every embedded URL points back through the
/// proxy.
///
/// Operates line by line, preserving line order, leading whitespace and the
/// trailing-newline structure; only URL text is substituted.
pub fn rewrite_manifest(
    content: &str,
    base_url: &str,
    headers: &HashMap<String, String>,
    codec: &DescriptorCodec,
) -> String {
    let lines: Vec<String> = content
        .lines()
        .map(|line| match classify_line(line) {
            LineKind::Blank | LineKind::Directive | LineKind::Opaque => line.to_string(),
            LineKind::DirectiveWithUri => rewrite_uri_attributes(line, base_url, headers, codec),
            LineKind::UrlLine => {
                let indent_len = line.len() - line.trim_start().len();
                let (indent, rest) = line.split_at(indent_len);
                let absolute = resolve(base_url, rest.trim_end());
                format!("{}{}", indent, codec.proxy_url(&absolute, headers))
            }
        })
        .collect();

    let mut rewritten = lines.join("\n");
    if content.ends_with('\n') {
        rewritten.push('\n');
    }
    rewritten
}

/// Whether a response body should be treated as a manifest at all.
///
/// Driven by the response Content-Type (HLS/DASH MIME markers), with the
/// request URL's extension as a fallback for mislabeled upstreams. Bodies
/// that fail this gate are never rewritten, URL-shaped substrings or not.
pub fn looks_like_manifest(content_type: Option<&str>, url: &str) -> bool {
    if let Some(content_type) = content_type {
        let lowered = content_type.to_ascii_lowercase();
        if lowered.contains("mpegurl") || lowered.contains("dash+xml") {
            return true;
        }
    }
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".mpd")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::decode_descriptor;

    const BASE: &str = "https://cdn.example/live/stream/master.m3u8";

    fn codec() -> DescriptorCodec {
        DescriptorCodec::new("/proxy")
    }

    fn no_headers() -> HashMap<String, String> {
        HashMap::new()
    }

    /// Pull the descriptor back out of a rewritten line. Tokens only ever
    /// contain alphanumerics and percent escapes, so everything else ends
    /// the token.
    fn decode_line(line: &str) -> crate::descriptor::ProxyDescriptor {
        let token: String = line
            .split("data=")
            .nth(1)
            .unwrap()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '%')
            .collect();
        decode_descriptor(&token).unwrap()
    }

    #[test]
    fn test_classify_blank() {
        assert_eq!(classify_line(""), LineKind::Blank);
        assert_eq!(classify_line("   "), LineKind::Blank);
    }

    #[test]
    fn test_classify_directives() {
        assert_eq!(classify_line("#EXTM3U"), LineKind::Directive);
        assert_eq!(classify_line("#EXTINF:4.0,"), LineKind::Directive);
        assert_eq!(
            classify_line("#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\""),
            LineKind::DirectiveWithUri
        );
        assert_eq!(
            classify_line("#EXT-X-MEDIA:TYPE=SUBTITLES,URI='subs.m3u8'"),
            LineKind::DirectiveWithUri
        );
    }

    #[test]
    fn test_classify_url_lines() {
        assert_eq!(classify_line("https://cdn.example/seg1.ts"), LineKind::UrlLine);
        assert_eq!(classify_line("//cdn.example/seg1.ts"), LineKind::UrlLine);
        assert_eq!(classify_line("/live/seg1.ts"), LineKind::UrlLine);
        assert_eq!(classify_line("video/seg1.ts"), LineKind::UrlLine);
        assert_eq!(classify_line("seg1.ts"), LineKind::UrlLine);
        assert_eq!(classify_line("subtitles.vtt"), LineKind::UrlLine);
    }

    #[test]
    fn test_classify_opaque() {
        assert_eq!(classify_line("not a url at all"), LineKind::Opaque);
    }

    #[test]
    fn test_key_directive_preserves_quotes_and_attributes() {
        let line = "#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x0123456789";
        let rewritten = rewrite_uri_attributes(line, BASE, &no_headers(), &codec());

        assert!(rewritten.starts_with("#EXT-X-KEY:METHOD=AES-128,URI=\"/proxy?data="));
        assert!(rewritten.ends_with("\",IV=0x0123456789"));

        let descriptor = decode_line(&rewritten);
        assert_eq!(descriptor.url, "https://cdn.example/live/stream/key.bin");
    }

    #[test]
    fn test_single_quoted_uri_keeps_single_quotes() {
        let line = "#EXT-X-MEDIA:TYPE=AUDIO,URI='audio/lang.m3u8',NAME=\"English\"";
        let rewritten = rewrite_uri_attributes(line, BASE, &no_headers(), &codec());

        assert!(rewritten.contains("URI='/proxy?data="));
        assert!(rewritten.contains("NAME=\"English\""));

        let descriptor = decode_line(&rewritten);
        assert_eq!(descriptor.url, "https://cdn.example/live/stream/audio/lang.m3u8");
    }

    #[test]
    fn test_multiple_uri_attributes_on_one_line() {
        let line = "#EXT-X-CUSTOM:URI=\"a.ts\",FALLBACK-URI=\"b.ts\"";
        let rewritten = rewrite_uri_attributes(line, BASE, &no_headers(), &codec());
        assert_eq!(rewritten.matches("data=").count(), 2);
    }

    #[test]
    fn test_rewrite_manifest_end_to_end() {
        let manifest = "#EXTM3U\n\
                        #EXT-X-VERSION:3\n\
                        #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
                        #EXTINF:4.0,\n\
                        seg1.ts\n\
                        #EXTINF:4.0,\n\
                        /abs/seg2.ts\n";
        let rewritten = rewrite_manifest(manifest, BASE, &no_headers(), &codec());
        let lines: Vec<&str> = rewritten.lines().collect();

        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXT-X-VERSION:3");
        assert!(lines[2].contains("URI=\"/proxy?data="));
        assert_eq!(lines[3], "#EXTINF:4.0,");
        assert!(lines[4].starts_with("/proxy?data="));
        assert!(lines[6].starts_with("/proxy?data="));

        assert_eq!(
            decode_line(lines[4]).url,
            "https://cdn.example/live/stream/seg1.ts"
        );
        assert_eq!(decode_line(lines[6]).url, "https://cdn.example/abs/seg2.ts");
    }

    #[test]
    fn test_rewrite_preserves_indentation_and_trailing_newline() {
        let manifest = "#EXTM3U\n  seg1.ts\n";
        let rewritten = rewrite_manifest(manifest, BASE, &no_headers(), &codec());

        assert!(rewritten.lines().nth(1).unwrap().starts_with("  /proxy?data="));
        assert!(rewritten.ends_with('\n'));

        let no_newline = rewrite_manifest("#EXTM3U\nseg1.ts", BASE, &no_headers(), &codec());
        assert!(!no_newline.ends_with('\n'));
    }

    #[test]
    fn test_rewrite_passes_blank_and_opaque_through() {
        let manifest = "#EXTM3U\n\nsome opaque text\n";
        let rewritten = rewrite_manifest(manifest, BASE, &no_headers(), &codec());
        assert_eq!(rewritten, manifest);
    }

    #[test]
    fn test_minted_descriptors_inherit_headers() {
        let mut headers = HashMap::new();
        headers.insert("Referer".to_string(), "https://player.example/".to_string());

        let rewritten = rewrite_manifest("seg1.ts", BASE, &headers, &codec());
        let descriptor = decode_line(&rewritten);

        assert_eq!(
            descriptor.headers.get("Referer").map(String::as_str),
            Some("https://player.example/")
        );
    }

    #[test]
    fn test_manifest_detection_by_content_type() {
        assert!(looks_like_manifest(
            Some("application/vnd.apple.mpegurl"),
            "https://a.example/playlist"
        ));
        assert!(looks_like_manifest(
            Some("audio/x-mpegurl"),
            "https://a.example/playlist"
        ));
        assert!(looks_like_manifest(
            Some("application/dash+xml"),
            "https://a.example/manifest"
        ));
        assert!(!looks_like_manifest(
            Some("video/mp2t"),
            "https://a.example/seg1.ts"
        ));
    }

    #[test]
    fn test_manifest_detection_by_extension_fallback() {
        assert!(looks_like_manifest(
            Some("text/plain"),
            "https://a.example/master.m3u8"
        ));
        assert!(looks_like_manifest(None, "https://a.example/manifest.mpd?x=1"));
        assert!(!looks_like_manifest(None, "https://a.example/seg1.ts"));
    }
}
