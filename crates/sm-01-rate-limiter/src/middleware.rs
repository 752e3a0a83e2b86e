//! Rate limiting middleware for HTTP routes.
//!
//! One [`RateLimitLayer`] per route, built at registration time from a
//! [`RoutePolicy`] and a shared limiter. Rejections answer 429 with a
//! `Retry-After` header; store failures answer 503 so clients never mistake
//! an outage for their own budget running out.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::warn;

use crate::domain::entities::UNKNOWN_SUBJECT;
use crate::domain::{Decision, RoutePolicy};
use crate::ports::RateLimiterApi;

/// Header carrying the authenticated user id, set by the auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// How a route derives the subject of its rate-limit key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyExtractor {
    /// Authenticated user id, falling back to the client address.
    #[default]
    UserOrIp,
    /// Client address only (gateway and unauthenticated identity routes).
    Ip,
}

impl KeyExtractor {
    /// Subject for `req`.
    pub fn subject<B>(&self, req: &Request<B>) -> String {
        if *self == Self::UserOrIp {
            if let Some(user) = header_str(req.headers(), USER_ID_HEADER) {
                return user.to_string();
            }
        }
        client_ip(req)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address from proxy headers, then the connection.
fn client_ip<B>(req: &Request<B>) -> String {
    // First X-Forwarded-For entry is the original client
    if let Some(first) =
        header_str(req.headers(), "x-forwarded-for").and_then(|v| v.split(',').next())
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    if let Some(real_ip) = header_str(req.headers(), "x-real-ip") {
        return real_ip.to_string();
    }

    if let Some(connect_info) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return connect_info.0.ip().to_string();
    }

    UNKNOWN_SUBJECT.to_string()
}

/// Rate limit layer
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<dyn RateLimiterApi>,
    policy: Arc<RoutePolicy>,
    extractor: KeyExtractor,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<dyn RateLimiterApi>, policy: RoutePolicy) -> Self {
        Self {
            limiter,
            policy: Arc::new(policy),
            extractor: KeyExtractor::default(),
        }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: KeyExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
            policy: Arc::clone(&self.policy),
            extractor: self.extractor,
        }
    }
}

/// Rate limit service
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<dyn RateLimiterApi>,
    policy: Arc<RoutePolicy>,
    extractor: KeyExtractor,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = Arc::clone(&self.limiter);
        let policy = Arc::clone(&self.policy);
        let subject = self.extractor.subject(&req);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match limiter.check(&policy, &subject).await {
                Ok(Decision::Allowed { remaining }) => {
                    let mut response = inner.call(req).await?;
                    let headers = response.headers_mut();
                    headers.insert("ratelimit-limit", HeaderValue::from(policy.capacity));
                    headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
                    Ok(response)
                }
                Ok(decision) => {
                    let retry_after = decision.retry_after_secs().unwrap_or(1);
                    warn!(
                        subject = %subject,
                        scope = %policy.scope,
                        retry_after_secs = retry_after,
                        "Rate limit exceeded"
                    );
                    Ok(rate_limit_response(retry_after))
                }
                Err(e) => {
                    warn!(
                        subject = %subject,
                        scope = %policy.scope,
                        error = %e,
                        "Rate limiter unavailable, rejecting request"
                    );
                    Ok(unavailable_response())
                }
            }
        })
    }
}

/// 429 with the window's remaining time.
fn rate_limit_response(retry_after_secs: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, HeaderValue::from(retry_after_secs))],
        Json(json!({
            "success": false,
            "message": "Too many requests",
            "retryAfter": retry_after_secs,
        })),
    )
        .into_response()
}

/// 503 for an unreachable store.
fn unavailable_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "success": false,
            "message": "Service temporarily unavailable",
        })),
    )
        .into_response()
}
