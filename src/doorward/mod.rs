use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer,
    set_header::{SetRequestHeaderLayer, SetResponseHeaderLayer},
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

use crate::{
    auth::{
        credentials::CredentialVerifier, jail::SlidingWindowLimiter, puzzle::PuzzleGate,
        token::TokenService,
    },
    config::Config,
};

pub mod handlers;
mod pages;

/// Session token carrier names, in discovery priority order: query parameter,
/// cookie, then header.
pub const SESSION_QUERY: &str = "doorward";
pub const SESSION_COOKIE: &str = "doorward";
pub const SESSION_HEADER: &str = "x-doorward";

// Throttle for the public puzzle endpoints
const CAP_LIMIT_MAX: usize = 20;
const CAP_LIMIT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<CredentialVerifier>,
    pub tokens: Arc<TokenService>,
    /// `None` when the jail is disabled in configuration
    pub jail: Option<Arc<SlidingWindowLimiter>>,
    pub puzzle: Arc<PuzzleGate>,
    pub cap_limiter: Arc<SlidingWindowLimiter>,
}

impl AppState {
    /// # Errors
    /// Fails if the credential verifier cannot be constructed.
    pub fn from_config(config: Config) -> Result<Self> {
        let verifier = CredentialVerifier::new(&config.users)?;
        let tokens = TokenService::new(&config.secret);
        let jail = config.jail.enabled.then(|| {
            Arc::new(SlidingWindowLimiter::new(
                config.jail.max_attempts,
                Duration::from_secs(config.jail.ban_duration),
            ))
        });

        Ok(Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            tokens: Arc::new(tokens),
            jail,
            puzzle: Arc::new(PuzzleGate::new()),
            cap_limiter: Arc::new(SlidingWindowLimiter::new(CAP_LIMIT_MAX, CAP_LIMIT_WINDOW)),
        })
    }
}

#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index).post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route("/api/forward-auth", get(handlers::forward_auth))
        .route("/api/cap/challenge", post(handlers::cap_challenge))
        .route("/api/cap/redeem", post(handlers::cap_redeem))
        .layer(middleware::from_fn(handlers::session))
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("SAMEORIGIN"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("strict-origin-when-cross-origin"),
                ))
                .layer(Extension(state)),
        )
}

/// Bind the listener and serve until shutdown.
///
/// # Errors
/// Returns an error if the server fails to start
pub async fn new(config: Config) -> Result<()> {
    let listen = config.listen;
    let state = AppState::from_config(config)?;
    let app = router(state);

    let listener = TcpListener::bind(listen).await?;

    info!("Listening on {listen}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
