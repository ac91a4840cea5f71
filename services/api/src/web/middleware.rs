//! services/api/src/web/middleware.rs
//!
//! Resolves who is calling and at which tier.
//!
//! There is no authentication here. `X-User-ID` is trusted as given, and callers
//! without one are identified by a fingerprint of their network address and
//! `User-Agent`. That fingerprint is a best-effort session proxy for quota
//! bookkeeping, not a security boundary.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use study_assistant_core::{Caller, Identity, Tier};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const TIER_HEADER: &str = "x-user-tier";

/// Inserts the resolved [`Caller`] into the request extensions for handlers to use.
pub async fn attach_caller(mut req: Request, next: Next) -> Response {
    let origin = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let caller = resolve_caller(req.headers(), origin.as_deref());
    req.extensions_mut().insert(caller);
    next.run(req).await
}

pub fn resolve_caller(headers: &HeaderMap, origin: Option<&str>) -> Caller {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let tier = Tier::normalize(header_value(TIER_HEADER));
    let identity = match header_value(USER_ID_HEADER) {
        Some(user_id) => Identity::Authenticated(user_id.to_string()),
        None => Identity::Anonymous(fingerprint(
            origin.unwrap_or("unknown"),
            header_value(header::USER_AGENT.as_str()).unwrap_or(""),
        )),
    };
    Caller::new(identity, tier)
}

fn fingerprint(origin: &str, user_agent: &str) -> String {
    let digest = Sha256::digest(format!("{origin}|{user_agent}").as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn explicit_user_id_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("ada"));
        headers.insert(TIER_HEADER, HeaderValue::from_static("PRO"));
        let caller = resolve_caller(&headers, Some("10.0.0.1"));
        assert_eq!(caller.identity, Identity::Authenticated("ada".to_string()));
        assert_eq!(caller.tier, Tier::Pro);
    }

    #[test]
    fn anonymous_callers_are_told_apart_by_agent() {
        let mut firefox = HeaderMap::new();
        firefox.insert(header::USER_AGENT, HeaderValue::from_static("Firefox"));
        let mut chrome = HeaderMap::new();
        chrome.insert(header::USER_AGENT, HeaderValue::from_static("Chrome"));

        let a = resolve_caller(&firefox, Some("10.0.0.1"));
        let b = resolve_caller(&chrome, Some("10.0.0.1"));
        let a_again = resolve_caller(&firefox, Some("10.0.0.1"));

        assert_ne!(a.identity, b.identity);
        assert_eq!(a.identity, a_again.identity);
        assert_eq!(a.tier, Tier::Free);
        assert!(a.identity.key().starts_with("anon:"));
    }
}
