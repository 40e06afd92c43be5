use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use platform_types::AuditEntry;
use utils::storage::Store;
use uuid::Uuid;

use crate::error::ApiError;
use crate::policy::extract_tenant;

use super::state::HttpState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const ACCOUNT_ID_HEADER: &str = "x-account-id";

/// Stamps `X-Request-Id` on the response, generating one if the caller
/// didn't supply it. The id is also written into tracing span context so
/// every log line for the request can be correlated.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Clone)]
pub struct RequestId(pub String);

/// Extracts the tenant from `X-Account-Id`, rejecting the request outright
/// when it's missing or malformed. Strictness of "is this header trustworthy"
/// is governed by `config.strict_identity`.
pub async fn tenant_extraction(
    State(state): State<HttpState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(ACCOUNT_ID_HEADER)
        .and_then(|v| v.to_str().ok());
    let account_id = extract_tenant(header, state.config.strict_identity)?;
    request.extensions_mut().insert(account_id);
    Ok(next.run(request).await)
}

/// Writes one `AuditEntry` per request once a response is produced, per
/// spec.md §6's audit trail requirement. Best-effort: a storage failure is
/// logged, never surfaced to the caller.
pub async fn audit(
    State(state): State<HttpState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let account_id = request
        .extensions()
        .get::<platform_types::AccountId>()
        .copied();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_default();

    let response = next.run(request).await;

    let entry = AuditEntry::new(account_id, method, path, response.status().as_u16(), request_id);
    let account_for_store = account_id.unwrap_or_else(platform_types::AccountId::new);
    if let Err(err) = state.audit.put(&account_for_store, entry.id, entry) {
        tracing::warn!(error = %err, "failed to write audit entry");
    }

    response
}

/// Fixed-window per-account rate limiter: at most `limit` requests per
/// `window`. Unauthenticated requests (no tenant yet resolved) are exempt,
/// since `tenant_extraction` runs after this layer in the stack and a 401
/// there already rejects them.
#[derive(Clone)]
pub struct RateLimiter {
    limit: u64,
    window: Duration,
    buckets: Arc<DashMap<String, Bucket>>,
}

struct Bucket {
    window_start: Instant,
    count: AtomicU64,
}

impl RateLimiter {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            buckets: Arc::new(DashMap::new()),
        }
    }

    fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            window_start: now,
            count: AtomicU64::new(0),
        });
        if now.duration_since(entry.window_start) > self.window {
            entry.window_start = now;
            entry.count.store(0, Ordering::SeqCst);
        }
        entry.count.fetch_add(1, Ordering::SeqCst) < self.limit
    }
}

pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = request
        .headers()
        .get(ACCOUNT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    if limiter.check(&key) {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::new(
            crate::error::ApiErrorKind::RateLimited,
            "RATE_LIMITED",
            "too many requests",
        ))
    }
}

/// Emits an opaque 500 with no body detail for panics caught by
/// `tower_http::catch_panic`, matching the boundary contract: internal
/// details never leak to the client.
pub fn panic_response() -> Response {
    axum::response::IntoResponse::into_response(ApiError::internal("internal error"))
}
