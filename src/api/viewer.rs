use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;

use crate::app::AppState;

/// Address of the client submitting a code; the key for unlock throttling.
///
/// Taken from the peer socket, or from the leftmost `X-Forwarded-For` entry
/// when `server.trust_forwarded_for` is set. Requests without either (such
/// as in-process test transports) share the unspecified address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddress(pub IpAddr);

impl FromRequestParts<AppState> for ClientAddress {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let forwarded = if state.config.server.trust_forwarded_for {
            forwarded_for(&parts.headers)
        } else {
            None
        };

        let ip = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ci| ci.0.ip())
            })
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        Ok(ClientAddress(ip))
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
}

/// Accept only tokens shaped like the ones we mint.
fn is_valid_session_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 64
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Resolve the viewer session id from `cookie_name`, minting one if absent.
///
/// The returned jar carries the new cookie and must be part of the response.
/// The cookie has no expiry, so it lives as long as the browser session.
pub fn viewer_session(jar: CookieJar, cookie_name: &str) -> (CookieJar, String) {
    if let Some(existing) = jar
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| is_valid_session_id(v))
    {
        return (jar, existing);
    }

    let session_id = uuid::Uuid::new_v4().simple().to_string();
    tracing::debug!("Starting new viewer session");

    let cookie = Cookie::build((cookie_name.to_string(), session_id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    (jar.add(cookie), session_id)
}
