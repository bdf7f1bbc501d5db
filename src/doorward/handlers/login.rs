use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::{ConnectInfo, FromRequest, Query, Request},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, error, warn};
use url::Url;

use super::{client_ip, AuthUser};
use crate::{
    auth::redirect,
    config::Config,
    doorward::{pages, AppState, SESSION_COOKIE},
};

// request-supplied session durations are honored only within these bounds
const MIN_REQUEST_TTL: i64 = 3600;
const MAX_REQUEST_TTL: i64 = 31_536_000;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub redirect: String,
    #[serde(default)]
    pub cap_token: String,
    #[serde(default)]
    pub duration: Option<i64>,
    /// checkbox value; any non-empty value other than "0"/"false" counts
    #[serde(default)]
    pub remember: Option<String>,
}

/// Login submission: puzzle gate, then jail, then credentials. The puzzle
/// runs first so bot traffic cannot spend limiter budget.
pub async fn login(
    Extension(state): Extension<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    jar: CookieJar,
    req: Request,
) -> Response {
    let addr = client_ip(req.headers(), peer.as_ref(), &state.config.trusted_proxies);

    let form = match parse_body(req).await {
        Ok(form) => form,
        Err(status) => return status.into_response(),
    };

    if form.cap_token.trim().is_empty() || !state.puzzle.validate_token(form.cap_token.trim()) {
        warn!("Login without valid captcha token {addr}");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if let Some(jail) = &state.jail {
        if jail.is_limited(&addr) {
            warn!("Too many login attempts {addr}");
            return (StatusCode::TOO_MANY_REQUESTS, "Too many login attempts").into_response();
        }
    }
    debug!("Access Remote IP {addr}");

    let Some(username) = state.verifier.verify(&form.username, &form.password) else {
        if let Some(jail) = &state.jail {
            jail.record(&addr);
        }
        warn!("Invalid login attempt {addr}");
        return Redirect::to(failure_url(&state.config.origin, &form.redirect).as_str())
            .into_response();
    };

    let ttl = session_ttl(&state.config, &form);
    let persistent = form
        .duration
        .is_some_and(|d| (MIN_REQUEST_TTL..=MAX_REQUEST_TTL).contains(&d))
        || remember_set(form.remember.as_deref());

    let token = match state.tokens.issue(&username, ttl) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue session token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let expires_at = Utc::now()
        .timestamp()
        .saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
    let jar = jar.add(session_cookie(
        &state.config.origin,
        token,
        persistent.then_some(ttl),
    ));

    if !form.redirect.is_empty() {
        if redirect::is_safe(&form.redirect, &state.config.origin, &state.config.trusted_domains) {
            return (jar, Redirect::to(&form.redirect)).into_response();
        }
        warn!("Unsafe redirect target rejected {addr}: {:?}", form.redirect);
    }

    (jar, Html(pages::index(&username, expires_at))).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct IndexParams {
    /// set to "1" by a failed login redirect
    pub e: Option<String>,
    /// destination to return to after login
    pub r: Option<String>,
}

/// Login page, or the authenticated view when a valid session exists.
pub async fn index(
    auth: Option<Extension<AuthUser>>,
    params: Option<Query<IndexParams>>,
) -> Html<String> {
    match auth {
        Some(Extension(user)) => Html(pages::index(&user.username, user.expires_at)),
        None => {
            let Query(params) = params.unwrap_or_default();
            Html(pages::login(
                params.e.as_deref() == Some("1"),
                params.r.as_deref().unwrap_or(""),
            ))
        }
    }
}

/// Logout is purely a client-side cookie clear; tokens cannot be revoked.
/// The expired cookie is sent unconditionally, whether or not the request
/// carried one, and must match the attributes the session cookie was set with.
pub async fn logout(Extension(state): Extension<AppState>, jar: CookieJar) -> Response {
    let mut removal = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(cookie::time::Duration::ZERO);
    if let Some(root) = state.config.origin.host_str().and_then(redirect::root_domain) {
        removal = removal.domain(format!(".{root}"));
    }
    let jar = jar.add(removal.build());

    (jar, Html(pages::logout())).into_response()
}

async fn parse_body(req: Request) -> Result<LoginRequest, StatusCode> {
    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    if is_json {
        let Json(form) = Json::<LoginRequest>::from_request(req, &())
            .await
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        Ok(form)
    } else {
        let Form(form) = Form::<LoginRequest>::from_request(req, &())
            .await
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        Ok(form)
    }
}

fn failure_url(origin: &Url, redirect: &str) -> Url {
    let mut back = origin.clone();
    {
        let mut query = back.query_pairs_mut();
        query.append_pair("e", "1");
        if !redirect.is_empty() {
            query.append_pair("r", redirect);
        }
    }
    back
}

fn session_ttl(config: &Config, form: &LoginRequest) -> Duration {
    if let Some(duration) = form.duration {
        if (MIN_REQUEST_TTL..=MAX_REQUEST_TTL).contains(&duration) {
            #[allow(clippy::cast_sign_loss)]
            return Duration::from_secs(duration as u64);
        }
    }
    if remember_set(form.remember.as_deref()) {
        config.remember_ttl
    } else {
        config.token_ttl
    }
}

fn remember_set(remember: Option<&str>) -> bool {
    matches!(remember, Some(v) if !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
}

fn session_cookie(origin: &Url, token: String, max_age: Option<Duration>) -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(origin.scheme() == "https");

    // shared across subdomains of the auth origin's root domain
    if let Some(root) = origin.host_str().and_then(redirect::root_domain) {
        cookie = cookie.domain(format!(".{root}"));
    }

    // session cookie unless the login asked to be remembered
    if let Some(ttl) = max_age {
        cookie = cookie.max_age(cookie::time::Duration::seconds(
            i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        ));
    }

    cookie.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn form(duration: Option<i64>, remember: Option<&str>) -> LoginRequest {
        LoginRequest {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            redirect: String::new(),
            cap_token: String::new(),
            duration,
            remember: remember.map(str::to_owned),
        }
    }

    fn config() -> Result<Config> {
        use crate::config::{ConfigFile, JailConfig, UserEntry};
        Ok(ConfigFile {
            listen: "127.0.0.1:9008".to_string(),
            redirect: "https://auth.example.com".to_string(),
            secret: "s3cret".to_string(),
            users: vec![UserEntry {
                username: "alice".to_string(),
                password: "hunter2".to_string(),
            }],
            jail: JailConfig::default(),
            trusted_domains: Vec::new(),
            trusted_proxies: Vec::new(),
            token_ttl: 3600,
            remember_ttl: 30 * 24 * 3600,
        }
        .into_config()?)
    }

    #[test]
    fn ttl_defaults_to_session_lifetime() -> Result<()> {
        let config = config()?;
        assert_eq!(
            session_ttl(&config, &form(None, None)),
            Duration::from_secs(3600)
        );
        Ok(())
    }

    #[test]
    fn remember_selects_long_lifetime() -> Result<()> {
        let config = config()?;
        assert_eq!(
            session_ttl(&config, &form(None, Some("on"))),
            Duration::from_secs(30 * 24 * 3600)
        );
        assert_eq!(
            session_ttl(&config, &form(None, Some("false"))),
            Duration::from_secs(3600)
        );
        Ok(())
    }

    #[test]
    fn explicit_duration_wins_when_in_bounds() -> Result<()> {
        let config = config()?;
        assert_eq!(
            session_ttl(&config, &form(Some(7200), Some("on"))),
            Duration::from_secs(7200)
        );
        // out-of-bounds durations fall back
        assert_eq!(
            session_ttl(&config, &form(Some(10), None)),
            Duration::from_secs(3600)
        );
        assert_eq!(
            session_ttl(&config, &form(Some(MAX_REQUEST_TTL + 1), None)),
            Duration::from_secs(3600)
        );
        Ok(())
    }

    #[test]
    fn failure_url_carries_error_and_redirect() -> Result<()> {
        let origin = Url::parse("https://auth.example.com")?;
        let url = failure_url(&origin, "https://app.example.com/x");
        assert_eq!(url.host_str(), Some("auth.example.com"));
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("e".to_string(), "1".to_string())));
        assert!(pairs.contains(&(
            "r".to_string(),
            "https://app.example.com/x".to_string()
        )));

        assert_eq!(failure_url(&origin, "").query(), Some("e=1"));
        Ok(())
    }

    #[test]
    fn session_cookie_attributes() -> Result<()> {
        let origin = Url::parse("https://auth.example.com")?;
        let cookie = session_cookie(&origin, "tok".to_string(), None);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        // the getter strips the leading dot we set
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert!(cookie.max_age().is_none());

        let persistent =
            session_cookie(&origin, "tok".to_string(), Some(Duration::from_secs(3600)));
        assert_eq!(
            persistent.max_age(),
            Some(cookie::time::Duration::seconds(3600))
        );

        // http origin must not mark the cookie Secure
        let http_origin = Url::parse("http://127.0.0.1:9008")?;
        let local = session_cookie(&http_origin, "tok".to_string(), None);
        assert_eq!(local.secure(), Some(false));
        // IP origins get no Domain attribute
        assert!(local.domain().is_none());
        Ok(())
    }
}
