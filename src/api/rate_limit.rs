//! Per-client rate limiting middleware.
//!
//! Each client IP may issue `max` requests per `window_ms`. The quota is a
//! token bucket: a full window's worth of requests can be spent at once and
//! tokens replenish evenly over the window.
//!
//! When limited, returns `429 Too Many Requests` with a `Retry-After` header.

use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

use super::context::RequestContext;
use super::AppState;
use crate::config::RateLimitConfig;

/// Key used for requests whose client address is unknown.
const UNKNOWN_CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Rate limiting state shared across all request handlers.
pub struct RateLimitState {
    limiter: Option<DefaultKeyedRateLimiter<IpAddr>>,
    max: u32,
}

impl std::fmt::Debug for RateLimitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitState")
            .field("enabled", &self.limiter.is_some())
            .field("max", &self.max)
            .finish()
    }
}

/// Result of a rate limit check.
#[derive(Debug, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited {
        /// Seconds until the client can retry.
        retry_after_secs: u64,
    },
}

impl RateLimitState {
    pub fn new(config: &RateLimitConfig) -> Self {
        let limiter = if config.enabled {
            quota(config).map(RateLimiter::keyed)
        } else {
            None
        };

        Self {
            limiter,
            max: config.max,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Checks and consumes one request for the client.
    pub fn check(&self, client: Option<IpAddr>) -> RateLimitResult {
        let Some(limiter) = &self.limiter else {
            return RateLimitResult::Allowed;
        };

        match limiter.check_key(&client.unwrap_or(UNKNOWN_CLIENT)) {
            Ok(()) => RateLimitResult::Allowed,
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                RateLimitResult::Limited {
                    // Round up so clients never retry too early
                    retry_after_secs: wait.as_secs() + u64::from(wait.subsec_nanos() > 0),
                }
            }
        }
    }

    /// Forget clients whose quota has fully replenished.
    pub fn prune(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
            limiter.shrink_to_fit();
            debug!("Rate limiter tracking {} clients", limiter.len());
        }
    }

    /// Periodically prune idle clients in the background.
    pub fn spawn_pruner(self: Arc<Self>, every: Duration) -> Option<tokio::task::JoinHandle<()>> {
        if !self.is_enabled() {
            return None;
        }

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                self.prune();
            }
        }))
    }
}

fn quota(config: &RateLimitConfig) -> Option<Quota> {
    let burst = NonZeroU32::new(config.max)?;
    let period = Duration::from_millis(config.window_ms) / config.max;
    Quota::with_period(period).map(|q| q.allow_burst(burst))
}

/// Rate limiting middleware for Axum.
///
/// Keys on the client IP from the request context (injected by the context
/// middleware).
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (client_ip, request_id) = req.extensions().get::<RequestContext>().map_or_else(
        || (None, "-".to_string()),
        |ctx| (ctx.client_ip, ctx.request_id.clone()),
    );

    match state.rate_limit.check(client_ip) {
        RateLimitResult::Allowed => next.run(req).await,
        RateLimitResult::Limited { retry_after_secs } => {
            warn!(
                request_id = %request_id,
                ip = ?client_ip,
                path = %req.uri().path(),
                retry_after_secs,
                "Rate limit exceeded"
            );
            rate_limit_response(state.rate_limit.max, retry_after_secs)
        }
    }
}

fn rate_limit_response(limit: u32, retry_after_secs: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        "Too many requests, please try again later.",
    )
        .into_response();

    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
        headers.insert(header::RETRY_AFTER, v);
    }
    if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert(header::HeaderName::from_static("x-ratelimit-limit"), v);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            window_ms: 60_000,
            max,
        }
    }

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_allows_within_quota_then_limits() {
        let state = RateLimitState::new(&config(3));
        for _ in 0..3 {
            assert_eq!(state.check(ip("192.0.2.1")), RateLimitResult::Allowed);
        }

        match state.check(ip("192.0.2.1")) {
            RateLimitResult::Limited { retry_after_secs } => {
                assert!(retry_after_secs >= 1 && retry_after_secs <= 20);
            }
            other => panic!("expected limit, got {other:?}"),
        }
    }

    #[test]
    fn test_clients_have_separate_quotas() {
        let state = RateLimitState::new(&config(1));
        assert_eq!(state.check(ip("192.0.2.1")), RateLimitResult::Allowed);
        assert_eq!(state.check(ip("192.0.2.2")), RateLimitResult::Allowed);
        assert!(matches!(
            state.check(ip("192.0.2.1")),
            RateLimitResult::Limited { .. }
        ));
    }

    #[test]
    fn test_unknown_clients_share_a_quota() {
        let state = RateLimitState::new(&config(1));
        assert_eq!(state.check(None), RateLimitResult::Allowed);
        assert!(matches!(state.check(None), RateLimitResult::Limited { .. }));
    }

    #[test]
    fn test_disabled_always_allows() {
        let state = RateLimitState::new(&RateLimitConfig {
            enabled: false,
            ..config(1)
        });
        assert!(!state.is_enabled());
        for _ in 0..100 {
            assert_eq!(state.check(ip("192.0.2.1")), RateLimitResult::Allowed);
        }
    }

    #[test]
    fn test_zero_max_disables() {
        let state = RateLimitState::new(&config(0));
        assert!(!state.is_enabled());
    }

    #[test]
    fn test_prune_keeps_limits_for_active_clients() {
        let state = RateLimitState::new(&config(1));
        assert_eq!(state.check(ip("192.0.2.1")), RateLimitResult::Allowed);
        state.prune();
        assert!(matches!(
            state.check(ip("192.0.2.1")),
            RateLimitResult::Limited { .. }
        ));
    }
}
