//! URL resolution for manifest entries
//! Turns the candidates found in a playlist (absolute, protocol-relative,
//! root-relative or plain relative) into absolute origin URLs

use url::Url;

/// Directory component of a URL string: everything up to and including the
/// final `/`, or empty when there is none
fn base_directory(base_url: &str) -> &str {
    match base_url.rfind('/') {
        Some(idx) => &base_url[..=idx],
        None => "",
    }
}

/// Resolve a manifest candidate against the manifest's own URL.
///
/// Pure and total: a base URL that fails to parse degrades to plain
/// `base_dir + candidate` concatenation instead of raising. Some upstreams
/// ship malformed base URLs and players cope with the concatenated result, so
/// the degraded output is kept as-is.
pub fn resolve(base_url: &str, candidate: &str) -> String {
    // Already absolute
    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        return candidate.to_string();
    }

    let base = match Url::parse(base_url) {
        Ok(parsed) => parsed,
        Err(_) => return format!("{}{}", base_directory(base_url), candidate),
    };

    // Protocol-relative: inherit the base scheme
    if let Some(rest) = candidate.strip_prefix("//") {
        return format!("{}://{}", base.scheme(), rest);
    }

    // Root-relative: inherit scheme + host (+ port)
    if candidate.starts_with('/') {
        let mut origin = format!("{}://{}", base.scheme(), base.host_str().unwrap_or(""));
        if let Some(port) = base.port() {
            origin.push_str(&format!(":{}", port));
        }
        return format!("{}{}", origin, candidate);
    }

    // Plain relative: join against the base directory with . / .. handling
    match base.join(candidate) {
        Ok(joined) => joined.to_string(),
        Err(_) => format!("{}{}", base_directory(base_url), candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_unchanged() {
        assert_eq!(
            resolve("https://a.com/x/y.m3u8", "https://b.com/z.ts"),
            "https://b.com/z.ts"
        );
        assert_eq!(
            resolve("https://a.com/x/y.m3u8", "http://b.com/z.ts"),
            "http://b.com/z.ts"
        );
    }

    #[test]
    fn test_relative_against_directory() {
        assert_eq!(
            resolve("https://a.com/x/y.m3u8", "seg1.ts"),
            "https://a.com/x/seg1.ts"
        );
    }

    #[test]
    fn test_root_relative() {
        assert_eq!(
            resolve("https://a.com/x/y.m3u8", "/z.ts"),
            "https://a.com/z.ts"
        );
    }

    #[test]
    fn test_protocol_relative() {
        assert_eq!(
            resolve("https://a.com/x/y.m3u8", "//cdn.com/z.ts"),
            "https://cdn.com/z.ts"
        );
        assert_eq!(
            resolve("http://a.com/x/y.m3u8", "//cdn.com/z.ts"),
            "http://cdn.com/z.ts"
        );
    }

    #[test]
    fn test_dot_segments_normalized() {
        assert_eq!(
            resolve("https://a.com/x/y/z.m3u8", "../up.ts"),
            "https://a.com/x/up.ts"
        );
        assert_eq!(
            resolve("https://a.com/x/y.m3u8", "./seg.ts"),
            "https://a.com/x/seg.ts"
        );
    }

    #[test]
    fn test_root_relative_keeps_port() {
        assert_eq!(
            resolve("http://a.com:8080/x/y.m3u8", "/z.ts"),
            "http://a.com:8080/z.ts"
        );
    }

    #[test]
    fn test_malformed_base_degrades_to_concatenation() {
        assert_eq!(resolve("a.com/x/y.m3u8", "seg1.ts"), "a.com/x/seg1.ts");
        // No directory separator at all: the candidate comes back alone
        assert_eq!(resolve("garbage", "seg1.ts"), "seg1.ts");
    }

    #[test]
    fn test_relative_with_query() {
        assert_eq!(
            resolve("https://a.com/x/y.m3u8?tok=1", "seg1.ts?tok=2"),
            "https://a.com/x/seg1.ts?tok=2"
        );
    }
}
