//! Request context extraction and request logging middleware.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{HeaderName, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;
use uuid::Uuid;

use super::AppState;

/// Header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request context, passed explicitly to handlers and middleware.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request ID for tracing/correlation.
    pub request_id: String,
    /// Client address, if it could be determined.
    pub client_ip: Option<IpAddr>,
}

impl RequestContext {
    fn from_request(req: &Request<Body>, trust_proxy: bool) -> Self {
        let request_id = request_id_from_headers(req.headers())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let forwarded = if trust_proxy {
            forwarded_ip(req.headers())
        } else {
            None
        };
        let client_ip = forwarded.or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        });

        Self {
            request_id,
            client_ip,
        }
    }
}

fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// First hop of `X-Forwarded-For`, falling back to `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let from_xff = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .and_then(|first| first.trim().parse().ok());

    from_xff.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| raw.trim().parse().ok())
    })
}

fn add_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
}

/// Middleware that injects a request context, echoes the request ID and
/// logs one line per handled request.
pub async fn request_context_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();

    let ctx = RequestContext::from_request(&req, state.trust_proxy);
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();

    req.extensions_mut().insert(ctx.clone());

    let mut response = next.run(req).await;
    add_request_id_header(&mut response, &ctx.request_id);

    info!(
        request_id = %ctx.request_id,
        duration_ms = start.elapsed().as_millis() as u64,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        ua = %user_agent,
        ip = %ctx.client_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string()),
        "Request handled"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/is-on-water");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_request_id_taken_from_header() {
        let ctx = RequestContext::from_request(&request(&[("x-request-id", "abc-123")]), false);
        assert_eq!(ctx.request_id, "abc-123");
    }

    #[test]
    fn test_request_id_generated_when_absent() {
        let a = RequestContext::from_request(&request(&[]), false);
        let b = RequestContext::from_request(&request(&[("x-request-id", "  ")]), false);
        assert!(Uuid::parse_str(&a.request_id).is_ok());
        assert!(Uuid::parse_str(&b.request_id).is_ok());
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_forwarded_for_needs_trust_proxy() {
        let req = request(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);

        let trusted = RequestContext::from_request(&req, true);
        assert_eq!(trusted.client_ip, Some("203.0.113.7".parse().unwrap()));

        let untrusted = RequestContext::from_request(&req, false);
        assert_eq!(untrusted.client_ip, None);
    }

    #[test]
    fn test_connect_info_used_without_proxy() {
        let mut req = request(&[("x-real-ip", "198.51.100.1")]);
        let peer: SocketAddr = "192.0.2.10:5555".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));

        let ctx = RequestContext::from_request(&req, false);
        assert_eq!(ctx.client_ip, Some(peer.ip()));

        let ctx = RequestContext::from_request(&req, true);
        assert_eq!(ctx.client_ip, Some("198.51.100.1".parse().unwrap()));
    }
}
