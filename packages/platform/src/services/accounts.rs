use std::sync::Arc;

use axum::http::Method;
use platform_types::{Account, Metadata};
use utils::storage::{InMemoryStore, Store};

use crate::error::ApiError;
use crate::service_engine::{error_response, json_response, ApiRequest, RouteDescriptor, ServiceEngine};

/// Illustrative fixture exercising ownership enforcement and metadata
/// normalization: every account is scoped to the creating tenant's
/// `AccountId`, and a second tenant's `GET /accounts` never sees it.
pub struct AccountsService {
    store: Arc<InMemoryStore<Account>>,
}

impl Default for AccountsService {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountsService {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
        }
    }

    async fn create(&self, request: ApiRequest) -> axum::response::Response {
        let owner = request.body["owner"].as_str().unwrap_or("").to_string();
        if owner.is_empty() {
            return error_response(ApiError::validation("owner is required"));
        }
        let metadata: Metadata = request
            .body
            .get("metadata")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let tenant = request.account_id.to_string();
        let account = Account::new(owner, &tenant, metadata);
        if let Err(err) = self.store.put(&request.account_id, account.id.as_uuid(), account.clone()) {
            return error_response(ApiError::from(err));
        }
        json_response(axum::http::StatusCode::CREATED, &account)
    }

    async fn get(&self, request: ApiRequest) -> axum::response::Response {
        let Some(id_raw) = request.path_params.get("id") else {
            return error_response(ApiError::validation("missing id"));
        };
        let Ok(id) = id_raw.parse::<uuid::Uuid>() else {
            return error_response(ApiError::validation("invalid account id"));
        };
        // `InMemoryStore` already partitions by `account_id`, so a hit here
        // is by construction owned by the requesting tenant (see
        // `ensure_ownership` for the cross-check used by services that
        // instead look records up by a global id).
        match self.store.get(&request.account_id, id) {
            Ok(Some(account)) => json_response(axum::http::StatusCode::OK, &account),
            Ok(None) => error_response(ApiError::not_found("account not found")),
            Err(err) => error_response(ApiError::from(err)),
        }
    }

    async fn list(&self, request: ApiRequest) -> axum::response::Response {
        let limit = request
            .query
            .get("limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let offset = request
            .query
            .get("offset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        match self.store.list(&request.account_id, platform_types::Pagination { limit, offset }) {
            Ok(page) => json_response(axum::http::StatusCode::OK, &page),
            Err(err) => error_response(ApiError::from(err)),
        }
    }
}

impl ServiceEngine for AccountsService {
    fn name(&self) -> &str {
        "accounts"
    }

    fn domain(&self) -> &str {
        "accounts"
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["accounts".to_string()]
    }

    fn required_apis(&self) -> Vec<String> {
        vec![]
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn routes(&self) -> Vec<RouteDescriptor> {
        let create_store = self.store.clone();
        let get_store = self.store.clone();
        let list_store = self.store.clone();

        vec![
            RouteDescriptor {
                method: Method::POST,
                pattern: String::new(),
                handler: Arc::new(move |req| {
                    let service = AccountsService { store: create_store.clone() };
                    Box::pin(async move { service.create(req).await })
                }),
            },
            RouteDescriptor {
                method: Method::GET,
                pattern: "/{id}".to_string(),
                handler: Arc::new(move |req| {
                    let service = AccountsService { store: get_store.clone() };
                    Box::pin(async move { service.get(req).await })
                }),
            },
            RouteDescriptor {
                method: Method::GET,
                pattern: String::new(),
                handler: Arc::new(move |req| {
                    let service = AccountsService { store: list_store.clone() };
                    Box::pin(async move { service.list(req).await })
                }),
            },
        ]
    }
}
