use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};

use super::client_ip;
use crate::{auth::puzzle::Solution, doorward::AppState};

/// Issues a proof-of-work challenge. Throttled per client address so the
/// challenge store cannot be flooded.
pub async fn cap_challenge(
    Extension(state): Extension<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let addr = client_ip(&headers, peer.as_ref(), &state.config.trusted_proxies);
    if state.cap_limiter.is_limited(&addr) {
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    }
    state.cap_limiter.record(&addr);

    Json(state.puzzle.create_challenge()).into_response()
}

/// Redeems solved challenges for a one-shot verification token.
pub async fn cap_redeem(
    Extension(state): Extension<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(solution): Json<Solution>,
) -> Response {
    let addr = client_ip(&headers, peer.as_ref(), &state.config.trusted_proxies);
    if state.cap_limiter.is_limited(&addr) {
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    }
    state.cap_limiter.record(&addr);

    Json(state.puzzle.redeem(&solution)).into_response()
}
