pub mod forward_auth;
pub use self::forward_auth::forward_auth;

pub mod health;
pub use self::health::health;

pub mod login;
pub use self::login::{index, login, logout};

pub mod puzzle;
pub use self::puzzle::{cap_challenge, cap_redeem};

// common pieces: session discovery middleware and client addressing
use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

use super::{AppState, SESSION_COOKIE, SESSION_HEADER, SESSION_QUERY};
use crate::auth::token::TokenError;

/// Identity attached to the request once a session token validates.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
    /// unix seconds
    pub expires_at: i64,
}

/// Validates the session token, if any, and attaches [`AuthUser`].
/// Invalid tokens are treated as an anonymous request, never an error.
pub async fn session(
    Extension(state): Extension<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = session_token(&req) {
        match state.tokens.verify(&token) {
            Ok(claims) => {
                req.extensions_mut().insert(AuthUser {
                    username: claims.sub,
                    expires_at: claims.exp,
                });
            }
            Err(TokenError::Expired) => debug!("session token expired"),
            Err(err) => debug!("session token rejected: {err}"),
        }
    }

    next.run(req).await
}

/// Token discovery: query parameter, then cookie, then header. Blank values
/// count as absent; the first non-blank source wins.
fn session_token(req: &Request) -> Option<String> {
    let from_query = req.uri().query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == SESSION_QUERY)
            .map(|(_, value)| value.into_owned())
    });
    let from_cookie = CookieJar::from_headers(req.headers())
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());
    let from_header = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    [from_query, from_cookie, from_header]
        .into_iter()
        .flatten()
        .find(|token| !token.trim().is_empty())
}

/// Client address for limiter keys and audit logs. The first
/// `X-Forwarded-For` entry is believed only when the socket peer is a
/// configured trusted proxy (or the peer is unknown); a direct client
/// cannot rotate fabricated addresses past the limiters.
pub(crate) fn client_ip(
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
    trusted_proxies: &[IpAddr],
) -> String {
    let peer_trusted = peer.map_or(true, |ConnectInfo(addr)| {
        trusted_proxies.contains(&addr.ip())
    });

    let forwarded = peer_trusted
        .then(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(|ip| ip.trim().to_string())
                .filter(|ip| !ip.is_empty())
        })
        .flatten();

    forwarded.unwrap_or_else(|| {
        peer.map_or_else(
            || "unknown".to_string(),
            |ConnectInfo(addr)| addr.ip().to_string(),
        )
    })
}
