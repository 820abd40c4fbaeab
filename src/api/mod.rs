//! HTTP API in front of the water classifier.

pub mod context;
pub mod handlers;
pub mod rate_limit;

use std::sync::Arc;

use axum::http::header::{
    CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::telemetry::Tracer;
use crate::WaterClassifier;

pub use context::{RequestContext, REQUEST_ID_HEADER};
pub use handlers::ApiError;
pub use rate_limit::{RateLimitResult, RateLimitState};

const CONTENT_SECURITY: &str = "default-src 'self'; \
    script-src 'self' 'unsafe-inline' https://unpkg.com; \
    style-src 'self' 'unsafe-inline' https://unpkg.com; \
    img-src 'self' data: https://tile.openstreetmap.org";

/// Application state shared across handlers
pub struct AppState {
    pub classifier: WaterClassifier,
    pub tracer: Tracer,
    pub rate_limit: Arc<RateLimitState>,
    pub trust_proxy: bool,
}

impl AppState {
    pub fn new(classifier: WaterClassifier, config: &Config) -> Self {
        Self {
            classifier,
            tracer: Tracer::new(&config.telemetry),
            rate_limit: Arc::new(RateLimitState::new(&config.rate_limit)),
            trust_proxy: config.trust_proxy,
        }
    }
}

/// Build the router.
///
/// The health check endpoint sits outside the rate limiter; the index page
/// and the lookup API are limited per client.
pub fn router(state: Arc<AppState>, config: &Config) -> Router {
    let index = ServeFile::new(config.static_dir.join("index.html"));

    let limited = Router::new()
        .route_service("/", index)
        .route(
            "/api/is-on-water",
            get(handlers::check_point).post(handlers::check_batch),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit::rate_limit_middleware,
        ));

    Router::new()
        .route(&config.health_check_endpoint, get(handlers::health))
        .merge(limited)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            context::request_context_middleware,
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
