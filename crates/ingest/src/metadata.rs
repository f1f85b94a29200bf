//! Request metadata derived from HTTP headers.
//!
//! # Responsibilities
//!
//! - **Content type gate**: only JSON and plain text bodies are accepted
//! - **Client IP**: best-effort, from a prioritized header chain
//! - **Write key**: explicit header, then `Authorization`
//! - **Forwarded headers**: what the canonical message keeps of the request
//!
//! # Client IP chain
//!
//! ```text
//! X-Real-Ip ──► X-Forwarded-For (first hop) ──► socket peer address
//! ```
use std::collections::BTreeMap;
use std::net::IpAddr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use http::HeaderMap;

use crate::error::LocatorError;

pub const X_REAL_IP: &str = "x-real-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_WRITE_KEY: &str = "x-write-key";

/// Headers never copied into the canonical message.
const REDACTED_HEADERS: [&str; 3] = ["authorization", "cookie", X_WRITE_KEY];

fn header_str<'a>(headers: &'a HeaderMap, name: impl http::header::AsHeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Media type of the request without parameters, lower-cased.
pub fn content_type(headers: &HeaderMap) -> String {
    header_str(headers, CONTENT_TYPE)
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .unwrap_or_default()
}

/// JSON and plain text are accepted; matched by suffix on the media type.
pub fn is_accepted_content_type(media_type: &str) -> bool {
    media_type.ends_with("application/json") || media_type.ends_with("text/plain")
}

/// Best-effort client IP.
pub fn client_ip(headers: &HeaderMap, remote_addr: Option<IpAddr>) -> Option<String> {
    if let Some(ip) = header_str(headers, X_REAL_IP) {
        return Some(ip.to_string());
    }
    if let Some(first) = header_str(headers, X_FORWARDED_FOR)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Some(first.to_string());
    }
    remote_addr.map(|a| a.to_string())
}

/// Write key from `X-Write-Key`, `Authorization: Bearer` or
/// `Authorization: Basic`. For Basic auth an empty password means the user
/// part alone is the key.
pub fn write_key(headers: &HeaderMap) -> Result<Option<String>, LocatorError> {
    if let Some(key) = header_str(headers, X_WRITE_KEY) {
        return Ok(Some(key.to_string()));
    }
    let Some(auth) = header_str(headers, AUTHORIZATION) else {
        return Ok(None);
    };
    if let Some(token) = auth.strip_prefix("Bearer ") {
        let token = token.trim();
        return Ok((!token.is_empty()).then(|| token.to_string()));
    }
    if let Some(encoded) = auth.strip_prefix("Basic ") {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| LocatorError::MalformedAuthorization(e.to_string()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|e| LocatorError::MalformedAuthorization(e.to_string()))?;
        let key = match decoded.split_once(':') {
            Some((user, "")) => user.to_string(),
            _ => decoded.clone(),
        };
        return Ok((!key.is_empty()).then_some(key));
    }
    Ok(None)
}

/// Host without port, lower-cased.
pub fn host(headers: &HeaderMap) -> Option<String> {
    header_str(headers, HOST).map(|h| {
        let h = h.rsplit_once(':').map_or(h, |(name, port)| {
            if port.chars().all(|c| c.is_ascii_digit()) {
                name
            } else {
                h
            }
        });
        h.to_ascii_lowercase()
    })
}

/// Request headers kept in the canonical message, minus credentials.
pub fn forwarded_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !REDACTED_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for &(k, v) in pairs {
            h.append(k, HeaderValue::from_static(v));
        }
        h
    }

    #[test]
    fn content_type_strips_parameters() {
        let h = headers(&[("content-type", "Application/JSON; charset=utf-8")]);
        assert_eq!(content_type(&h), "application/json");
        assert!(is_accepted_content_type(&content_type(&h)));
        assert!(is_accepted_content_type("text/plain"));
        assert!(!is_accepted_content_type("application/xml"));
        assert!(!is_accepted_content_type(&content_type(&HeaderMap::new())));
    }

    #[test]
    fn client_ip_follows_priority_chain() {
        let remote: IpAddr = "10.0.0.1".parse().unwrap();
        let h = headers(&[("x-real-ip", "1.1.1.1"), ("x-forwarded-for", "2.2.2.2")]);
        assert_eq!(client_ip(&h, Some(remote)).as_deref(), Some("1.1.1.1"));

        let h = headers(&[("x-forwarded-for", "2.2.2.2, 3.3.3.3")]);
        assert_eq!(client_ip(&h, Some(remote)).as_deref(), Some("2.2.2.2"));

        assert_eq!(client_ip(&HeaderMap::new(), Some(remote)).as_deref(), Some("10.0.0.1"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }

    #[test]
    fn write_key_sources() {
        let h = headers(&[("x-write-key", "k1:s1"), ("authorization", "Bearer other")]);
        assert_eq!(write_key(&h).unwrap().as_deref(), Some("k1:s1"));

        let h = headers(&[("authorization", "Bearer k2")]);
        assert_eq!(write_key(&h).unwrap().as_deref(), Some("k2"));

        // base64("k3:s3")
        let h = headers(&[("authorization", "Basic azM6czM=")]);
        assert_eq!(write_key(&h).unwrap().as_deref(), Some("k3:s3"));

        // base64("k4:")
        let h = headers(&[("authorization", "Basic azQ6")]);
        assert_eq!(write_key(&h).unwrap().as_deref(), Some("k4"));

        let h = headers(&[("authorization", "Basic !!!")]);
        assert!(matches!(write_key(&h), Err(LocatorError::MalformedAuthorization(_))));

        assert_eq!(write_key(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn host_drops_port() {
        let h = headers(&[("host", "Acme.Data.Example.com:8080")]);
        assert_eq!(host(&h).as_deref(), Some("acme.data.example.com"));
    }

    #[test]
    fn credentials_are_not_forwarded() {
        let h = headers(&[
            ("authorization", "Bearer k"),
            ("cookie", "a=b"),
            ("x-write-key", "k"),
            ("user-agent", "test"),
        ]);
        let fwd = forwarded_headers(&h);
        assert_eq!(fwd.len(), 1);
        assert_eq!(fwd.get("user-agent").map(String::as_str), Some("test"));
    }
}
