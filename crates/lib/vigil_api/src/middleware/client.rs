//! Client metadata extraction (IP, user agent) for audit records and
//! rate-limit identities.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};

/// Origin metadata captured for audit records.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientMeta {
            ip: client_ip(&parts.headers, &parts.extensions),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }
}

/// Best-effort client IP: proxy headers first, then the socket address.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok())
        && let Some(first) = forwarded.split(',').next()
        && !first.trim().is_empty()
    {
        return Some(first.trim().to_string());
    }
    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok())
        && !real.trim().is_empty()
    {
        return Some(real.trim().to_string());
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        let ip = client_ip(&headers, &Extensions::new());
        assert_eq!(ip.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn real_ip_is_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        let ip = client_ip(&headers, &Extensions::new());
        assert_eq!(ip.as_deref(), Some("198.51.100.7"));
    }

    #[test]
    fn no_source_yields_none() {
        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new()), None);
    }
}
