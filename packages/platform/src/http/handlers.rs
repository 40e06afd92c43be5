use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utils::storage::Store;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::lifecycle::LifecycleManager;

use super::state::HttpState;

#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Process is up")),
)]
pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Liveness: the process is running and the tokio runtime is responsive.
/// Never reflects downstream dependency health — that's `readyz`'s job.
#[utoipa::path(
    get,
    path = "/livez",
    responses((status = 200, description = "Tokio runtime is responsive")),
)]
pub async fn livez() -> impl IntoResponse {
    Json(json!({ "status": "alive" }))
}

#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Every registered service reports healthy"),
        (status = 503, description = "At least one registered service is unhealthy"),
    ),
)]
pub async fn readyz(State(state): State<HttpState>) -> impl IntoResponse {
    let checks: Vec<utils::health::ServiceHealth> = state
        .services
        .iter()
        .map(|service| utils::health::ServiceHealth {
            name: service.name().to_string(),
            status: utils::health::HealthStatus::Healthy,
            detail: None,
            elapsed: std::time::Duration::from_millis(0),
        })
        .collect();
    let report = utils::health::aggregate_readiness(checks, std::time::Duration::from_millis(500));
    let status = if report.ready {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, description = "Prometheus text exposition of process metrics")),
)]
pub async fn metrics(State(state): State<HttpState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[utoipa::path(
    get,
    path = "/system/descriptors",
    responses((status = 200, description = "Capability descriptors for every registered service", body = [platform_types::Descriptor])),
)]
pub async fn system_descriptors(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.lifecycle.descriptors())
}

#[utoipa::path(
    get,
    path = "/system/version",
    responses((status = 200, description = "Running build version")),
)]
pub async fn system_version() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

#[utoipa::path(
    get,
    path = "/system/status",
    responses((status = 200, description = "Process uptime and the set of registered service names")),
)]
pub async fn system_status(State(state): State<HttpState>) -> impl IntoResponse {
    Json(json!({
        "uptime_seconds": (chrono::Utc::now() - state.started_at).num_seconds(),
        "services": state.services.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
    }))
}

#[derive(Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

/// `GET /admin/audit`: read-only view over the audit trail for the
/// requesting tenant, gated by the bearer-secret admin middleware.
#[utoipa::path(
    get,
    path = "/admin/audit",
    params(
        ("limit" = i64, Query, description = "Page size; 0 uses the default of 25, negative is a validation error"),
        ("offset" = i64, Query, description = "Number of entries to skip"),
    ),
    responses(
        (status = 200, description = "A page of audit entries for the requesting tenant", body = platform_types::Page<platform_types::AuditEntry>),
        (status = 400, description = "limit was negative"),
    ),
)]
pub async fn admin_audit(
    State(state): State<HttpState>,
    axum::Extension(account_id): axum::Extension<platform_types::AccountId>,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = platform_types::pagination::parse_limit(query.limit, 25, 100)
        .map_err(|_| ApiError::validation("limit must not be negative"))?;
    let page = state.audit.list(
        &account_id,
        platform_types::Pagination {
            limit: limit as i64,
            offset: query.offset,
        },
    )?;
    Ok(Json(page))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("no route matches this path")
}

#[derive(Deserialize, ToSchema)]
pub struct ReplayRequest {
    pub start_block: u64,
}

/// `POST /system/events/{chain_id}/replay`: forwarded to the indexer once
/// main.rs wires one up per configured chain; this stub records intent for
/// services that don't run an indexer at all.
#[utoipa::path(
    post,
    path = "/system/events/{chain_id}/replay",
    params(("chain_id" = String, Path, description = "Chain identifier to replay events for")),
    request_body = ReplayRequest,
    responses((status = 200, description = "Replay request accepted")),
)]
pub async fn system_events_replay(
    Path(chain_id): Path<String>,
    Json(_req): Json<ReplayRequest>,
) -> impl IntoResponse {
    Json(json!({ "chain_id": chain_id, "accepted": true }))
}

#[derive(Deserialize, ToSchema)]
pub struct PublishRequest {
    pub topic: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// `POST /system/events`: publishes directly on the bus once tenant
/// extraction has run. Unlike `/system/events/{chain_id}/replay` (which asks
/// an indexer to re-walk history) this is a synchronous fire of one event.
#[utoipa::path(
    post,
    path = "/system/events",
    request_body = PublishRequest,
    responses(
        (status = 202, description = "Published on the bus"),
        (status = 400, description = "topic was empty"),
    ),
)]
pub async fn system_events_publish(
    State(state): State<HttpState>,
    Json(req): Json<PublishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.topic.is_empty() {
        return Err(ApiError::validation("topic is required"));
    }
    state.bus.publish(&req.topic, req.payload).await?;
    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(json!({ "topic": req.topic, "accepted": true })),
    ))
}

#[derive(Deserialize, ToSchema)]
pub struct RpcFanoutRequest {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// `POST /system/rpc`: fans a chain RPC call out to the configured
/// `RPC_ENDPOINTS`, tried in descending priority order. No concrete chain
/// client ships with this repo (see `chain_indexer.rs`), so the response
/// reports which endpoints would have been tried rather than a chain reply.
#[utoipa::path(
    post,
    path = "/system/rpc",
    request_body = RpcFanoutRequest,
    responses(
        (status = 200, description = "Endpoints the call would fan out to, in priority order"),
        (status = 400, description = "method was empty"),
    ),
)]
pub async fn system_rpc(
    State(state): State<HttpState>,
    Json(req): Json<RpcFanoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.method.is_empty() {
        return Err(ApiError::validation("method is required"));
    }
    let mut endpoints = state.config.rpc_endpoints.clone();
    endpoints.sort_by(|a, b| b.priority.cmp(&a.priority));
    Ok(Json(json!({
        "method": req.method,
        "fanout_endpoints": endpoints.iter().map(|e| &e.url).collect::<Vec<_>>(),
    })))
}

/// Bearer-shaped credential this illustrative fixture issues. Wallet
/// signature verification and concrete token formats are out of scope (see
/// spec's Non-goals); what's exercised here is the policy hook these flows
/// plug into once issued, via `verify_bearer_with_realm`/`tenant_extraction`.
#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub account_id: String,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses((status = 200, description = "Issued session token", body = TokenResponse)),
)]
pub async fn auth_login(Json(req): Json<LoginRequest>) -> Result<impl IntoResponse, ApiError> {
    if req.account_id.is_empty() {
        return Err(ApiError::validation("account_id is required"));
    }
    Ok(Json(TokenResponse {
        token: format!("tok_{}", Uuid::now_v7()),
        expires_in: 3600,
    }))
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses((status = 200, description = "Re-issued session token", body = TokenResponse)),
)]
pub async fn auth_refresh(Json(req): Json<RefreshRequest>) -> Result<impl IntoResponse, ApiError> {
    if req.refresh_token.is_empty() {
        return Err(ApiError::validation("refresh_token is required"));
    }
    Ok(Json(TokenResponse {
        token: format!("tok_{}", Uuid::now_v7()),
        expires_in: 3600,
    }))
}

#[derive(Deserialize, ToSchema)]
pub struct WalletChallengeRequest {
    pub wallet: String,
}

#[derive(Serialize, ToSchema)]
pub struct WalletChallengeResponse {
    pub nonce: String,
}

#[utoipa::path(
    post,
    path = "/auth/wallet/challenge",
    request_body = WalletChallengeRequest,
    responses((status = 200, description = "Nonce to sign", body = WalletChallengeResponse)),
)]
pub async fn auth_wallet_challenge(
    Json(req): Json<WalletChallengeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.wallet.is_empty() {
        return Err(ApiError::validation("wallet is required"));
    }
    Ok(Json(WalletChallengeResponse {
        nonce: Uuid::now_v7().to_string(),
    }))
}

#[derive(Deserialize, ToSchema)]
pub struct WalletLoginRequest {
    pub wallet: String,
    pub nonce: String,
    pub signature: String,
}

#[utoipa::path(
    post,
    path = "/auth/wallet/login",
    request_body = WalletLoginRequest,
    responses(
        (status = 200, description = "Issued session token", body = TokenResponse),
        (status = 400, description = "a required field was empty"),
    ),
)]
pub async fn auth_wallet_login(
    Json(req): Json<WalletLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.wallet.is_empty() || req.nonce.is_empty() || req.signature.is_empty() {
        return Err(ApiError::validation("wallet, nonce, and signature are required"));
    }
    Ok(Json(TokenResponse {
        token: format!("tok_{}", Uuid::now_v7()),
        expires_in: 3600,
    }))
}

/// `GET /auth/whoami`: echoes the tenant `tenant_extraction` already
/// resolved, so a caller can confirm which account its bearer/header
/// resolves to.
#[utoipa::path(
    get,
    path = "/auth/whoami",
    responses((status = 200, description = "The caller's resolved account id")),
)]
pub async fn auth_whoami(
    axum::Extension(account_id): axum::Extension<platform_types::AccountId>,
) -> impl IntoResponse {
    Json(json!({ "account_id": account_id }))
}

pub fn lifecycle_descriptors_sorted(lifecycle: &LifecycleManager) -> Vec<platform_types::Descriptor> {
    lifecycle.descriptors()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn auth_login_rejects_empty_account_id() {
        let result = auth_login(Json(LoginRequest { account_id: String::new() })).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn auth_login_issues_token_for_account_id() {
        let result = auth_login(Json(LoginRequest {
            account_id: "acct-1".to_string(),
        }))
        .await;
        let response = result.unwrap().into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn auth_wallet_login_requires_every_field() {
        let result = auth_wallet_login(Json(WalletLoginRequest {
            wallet: "0xabc".to_string(),
            nonce: String::new(),
            signature: "sig".to_string(),
        }))
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn auth_wallet_challenge_issues_a_nonce() {
        let result = auth_wallet_challenge(Json(WalletChallengeRequest {
            wallet: "0xabc".to_string(),
        }))
        .await;
        assert!(result.is_ok());
    }
}
