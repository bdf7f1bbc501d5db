use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use tracing::debug;

use super::AuthUser;
use crate::doorward::AppState;

/// Decision endpoint reverse proxies call per request. Valid session:
/// identity headers for the upstream plus 204. Otherwise GET requests are
/// redirected to the login page with the original URI attached, and any
/// other method gets a bare 401 (non-GET requests cannot safely be replayed
/// after a redirect).
pub async fn forward_auth(
    Extension(state): Extension<AppState>,
    auth: Option<Extension<AuthUser>>,
    headers: HeaderMap,
) -> Response {
    let method = header_str(&headers, "x-forwarded-method");
    let uri = format!(
        "{}://{}{}",
        header_str(&headers, "x-forwarded-proto"),
        header_str(&headers, "x-forwarded-host"),
        header_str(&headers, "x-forwarded-uri"),
    );
    debug!("forward-auth {method} {uri}");

    let Some(Extension(user)) = auth else {
        if method.eq_ignore_ascii_case("GET") {
            let mut login = state.config.origin.clone();
            login.query_pairs_mut().append_pair("r", &uri);
            return Redirect::to(login.as_str()).into_response();
        }
        return StatusCode::UNAUTHORIZED.into_response();
    };

    debug!("forward-auth pass user:{}", user.username);
    (
        StatusCode::NO_CONTENT,
        [
            ("remote-user", user.username.clone()),
            ("x-forwarded-user", user.username),
        ],
    )
        .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}
