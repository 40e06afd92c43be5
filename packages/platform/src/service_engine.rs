use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{http::Method, response::Response};
use platform_types::{AccountId, Metadata};
use serde_json::Value;
use thiserror::Error;

use crate::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum ServiceEngineError {
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Validates that an account exists before a service acts on its behalf.
#[async_trait]
pub trait AccountChecker: Send + Sync {
    async fn validate_account_exists(&self, account_id: &AccountId) -> Result<(), ServiceEngineError>;
}

/// Validates wallet ownership before a signer set is accepted on a
/// channel or key.
#[async_trait]
pub trait WalletChecker: Send + Sync {
    async fn wallet_owned_by(
        &self,
        account_id: &AccountId,
        wallet: &str,
    ) -> Result<(), ServiceEngineError>;
}

/// Normalized request handed to a route handler: tenant, headers, parsed
/// path/query params, and a JSON body (empty object when there is none).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub account_id: AccountId,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub path_params: HashMap<String, String>,
    pub body: Value,
}

pub type HandlerFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>;
pub type RouteHandler = Arc<dyn Fn(ApiRequest) -> HandlerFuture + Send + Sync>;

/// A single mounted route, built explicitly rather than discovered via
/// reflection (the builder strategy from Design Note §9).
#[derive(Clone)]
pub struct RouteDescriptor {
    pub method: Method,
    pub pattern: String,
    pub handler: RouteHandler,
}

impl std::fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .finish()
    }
}

/// Every domain service embeds this contract: identity, lifecycle, route
/// discovery via a builder, ownership/metadata helpers, and event publish.
#[async_trait]
pub trait ServiceEngine: Send + Sync {
    fn name(&self) -> &str;
    fn domain(&self) -> &str;
    fn capabilities(&self) -> Vec<String>;
    fn required_apis(&self) -> Vec<String>;
    fn version(&self) -> &str;

    /// Routes this service contributes, mounted under its domain prefix.
    fn routes(&self) -> Vec<RouteDescriptor>;

    async fn start(&self) -> Result<(), String> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Adapts a `ServiceEngine` to `LifecycleManager`'s `Lifecycle` trait, so
/// every registered service starts and stops in the same deterministic
/// ordered sequence as any other lifecycle participant.
pub struct ServiceEngineLifecycle {
    pub service: Arc<dyn ServiceEngine>,
}

#[async_trait]
impl crate::lifecycle::Lifecycle for ServiceEngineLifecycle {
    fn name(&self) -> &str {
        self.service.name()
    }

    async fn start(&self) -> Result<(), String> {
        self.service.start().await
    }

    async fn stop(&self) -> Result<(), String> {
        self.service.stop().await
    }

    fn descriptor(&self) -> Option<platform_types::Descriptor> {
        Some(platform_types::Descriptor {
            name: self.service.name().to_string(),
            domain: self.service.domain().to_string(),
            layer: "service".to_string(),
            capabilities: self.service.capabilities(),
            required_apis: self.service.required_apis(),
            version: self.service.version().to_string(),
        })
    }
}

/// `EnsureOwnership`: rejects access when the resource's recorded
/// `account_id` doesn't match the requester's.
pub fn ensure_ownership(
    stored_account_id: &AccountId,
    request_account_id: &AccountId,
    kind: &str,
    id: impl std::fmt::Display,
) -> Result<(), ServiceEngineError> {
    if stored_account_id == request_account_id {
        Ok(())
    } else {
        Err(ServiceEngineError::Forbidden(format!(
            "{kind} {id} does not belong to the requesting account"
        )))
    }
}

/// Best-effort event publish: logs and continues on `BusUnavailable`
/// rather than surfacing it, except on the caller-declared critical path.
pub async fn publish_best_effort(bus: &EventBus, topic: &str, payload: Value) {
    if let Err(err) = bus.publish(topic, payload).await {
        tracing::warn!(topic, error = %err, "best-effort event publish failed");
    }
}

pub fn normalize_metadata(metadata: &Metadata) -> Metadata {
    platform_types::metadata::normalize_metadata(metadata)
}

pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    platform_types::metadata::normalize_tags(tags)
}

/// Wraps a JSON-serializable value as a `200 OK` handler response.
pub fn json_response<T: serde::Serialize>(status: axum::http::StatusCode, value: &T) -> Response {
    let mut response = axum::response::IntoResponse::into_response(axum::Json(
        serde_json::to_value(value).unwrap_or(Value::Null),
    ));
    *response.status_mut() = status;
    response
}

/// Converts a handler error into its `ApiError` HTTP response.
pub fn error_response(err: impl Into<crate::error::ApiError>) -> Response {
    axum::response::IntoResponse::into_response(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_ownership_allows_matching_account() {
        let account = AccountId::new();
        assert!(ensure_ownership(&account, &account, "channel", "c1").is_ok());
    }

    #[test]
    fn ensure_ownership_rejects_mismatch() {
        let owner = AccountId::new();
        let requester = AccountId::new();
        assert!(ensure_ownership(&owner, &requester, "channel", "c1").is_err());
    }
}
