//! Descriptor codec
//! Encodes the opaque {url, headers} unit of work as a percent-encoded JSON
//! token so it can travel as a single URL query value

use crate::error::ProxyError;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the query parameter carrying the descriptor token
pub const DATA_PARAM: &str = "data";

/// Everything needed to perform one upstream fetch.
///
/// Immutable once constructed: rewriting a URL mints a new descriptor rather
/// than mutating an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ProxyDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Encode a target URL and its forwarded headers into a token.
///
/// Never fails for well-formed inputs and is stable per input; the token is
/// consumable only by [`decode_descriptor`].
pub fn encode_descriptor(url: &str, headers: &HashMap<String, String>) -> String {
    let descriptor = ProxyDescriptor {
        url: url.to_string(),
        headers: headers.clone(),
    };
    let json = serde_json::to_string(&descriptor).expect("descriptor serialization is infallible");
    utf8_percent_encode(&json, NON_ALPHANUMERIC).to_string()
}

/// Decode a token back into a descriptor.
///
/// Fails with `MalformedDescriptor` when the token cannot be percent-decoded,
/// the decoded text is not a JSON object, or the mandatory `url` field is
/// absent or not a string. A missing `headers` field decodes as an empty map.
pub fn decode_descriptor(token: &str) -> Result<ProxyDescriptor, ProxyError> {
    let decoded = percent_decode_str(token)
        .decode_utf8()
        .map_err(|e| ProxyError::MalformedDescriptor(format!("invalid encoding: {}", e)))?;

    let value: serde_json::Value = serde_json::from_str(&decoded)
        .map_err(|e| ProxyError::MalformedDescriptor(format!("invalid descriptor JSON: {}", e)))?;

    if !value.is_object() {
        return Err(ProxyError::MalformedDescriptor(
            "descriptor must be a JSON object".to_string(),
        ));
    }

    match value.get("url") {
        Some(serde_json::Value::String(_)) => {}
        Some(_) => {
            return Err(ProxyError::MalformedDescriptor(
                "url field must be a string".to_string(),
            ))
        }
        None => {
            return Err(ProxyError::MalformedDescriptor(
                "missing url field".to_string(),
            ))
        }
    }

    serde_json::from_value(value).map_err(|e| ProxyError::MalformedDescriptor(e.to_string()))
}

/// Mints client-facing proxy URLs against a fixed public base.
///
/// The only sanctioned producer of URLs pointing back into this core. The
/// public base is injected at construction and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct DescriptorCodec {
    public_base: String,
}

impl DescriptorCodec {
    /// Create a codec minting URLs under the given base, e.g. `/proxy` or
    /// `https://edge.example.com/proxy`
    pub fn new(public_base: impl Into<String>) -> Self {
        let mut public_base = public_base.into();
        while public_base.ends_with('/') {
            public_base.pop();
        }
        Self { public_base }
    }

    /// Build a proxy URL for the given origin resource
    pub fn proxy_url(&self, url: &str, headers: &HashMap<String, String>) -> String {
        format!(
            "{}?{}={}",
            self.public_base,
            DATA_PARAM,
            encode_descriptor(url, headers)
        )
    }

    pub fn public_base(&self) -> &str {
        &self.public_base
    }
}
