//! Request helpers shared by the handlers.

use axum::{
    extract::ConnectInfo,
    http::{
        header::{AUTHORIZATION, USER_AGENT},
        HeaderMap,
    },
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::{IpAddr, SocketAddr};

use crate::auth::ClientContext;

/// Address recorded when neither proxy headers nor the socket peer are known.
pub const UNKNOWN_ADDRESS: &str = "unknown";

static EMAIL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Whether `X-Forwarded-For`/`X-Real-IP` may be used as the source address.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProxyPolicy {
    pub trust_forwarded_headers: bool,
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(email))
}

/// Extract the client IP recorded by the fronting proxy.
///
/// The proxy appends the peer it saw to `X-Forwarded-For`, so only the
/// rightmost hop is taken; earlier hops are client supplied. Values that are
/// not IP addresses are ignored.
#[must_use]
pub fn extract_forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.rsplit(',').next())
        .and_then(parse_ip);
    if forwarded.is_some() {
        return forwarded;
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(parse_ip)
}

fn parse_ip(value: &str) -> Option<String> {
    value
        .trim()
        .parse::<IpAddr>()
        .ok()
        .map(|ip| ip.to_string())
}

/// Build the ledger/audit context for a request.
///
/// Proxy headers are only honored when the policy trusts them; otherwise a
/// caller could pick its own throttle bucket.
#[must_use]
pub fn client_context(
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
    policy: ProxyPolicy,
) -> ClientContext {
    let forwarded = if policy.trust_forwarded_headers {
        extract_forwarded_ip(headers)
    } else {
        None
    };
    let source_address = forwarded
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string());
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    ClientContext::new(source_address, user_agent)
}

/// Raw token from `Authorization: Bearer <token>`.
#[must_use]
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::net::Ipv4Addr;

    fn trusted() -> ProxyPolicy {
        ProxyPolicy {
            trust_forwarded_headers: true,
        }
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@x.com"));
        assert!(!valid_email("a@x"));
        assert!(!valid_email("a x@x.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn forwarded_uses_hop_appended_by_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_forwarded_ip(&headers), Some("5.6.7.8".to_string()));
    }

    #[test]
    fn forwarded_ignores_garbage_hops() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, not-an-ip"),
        );
        assert_eq!(extract_forwarded_ip(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static(" 2001:db8::1 "));
        assert_eq!(
            extract_forwarded_ip(&headers),
            Some("2001:db8::1".to_string())
        );
    }

    #[test]
    fn forwarded_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_forwarded_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn untrusted_headers_use_peer_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8"));
        let peer = ConnectInfo(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 5000));

        let ctx = client_context(&headers, Some(&peer), ProxyPolicy::default());
        assert_eq!(ctx.source_address, "10.0.0.7");
        assert_eq!(ctx.user_agent, "curl/8");

        let ctx = client_context(&headers, Some(&peer), trusted());
        assert_eq!(ctx.source_address, "1.2.3.4");
    }

    #[test]
    fn missing_peer_is_unknown() {
        let ctx = client_context(&HeaderMap::new(), None, ProxyPolicy::default());
        assert_eq!(ctx.source_address, UNKNOWN_ADDRESS);
        assert_eq!(ctx.user_agent, "");
    }

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123".to_string()));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
