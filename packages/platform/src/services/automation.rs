use std::sync::Arc;

use axum::http::Method;
use platform_types::{AccountId, ResourceRecord, ResourceStatus};
use uuid::Uuid;

use utils::storage::{InMemoryStore, Store};
use utils::telemetry::Metrics;

use crate::dispatcher::{Dispatcher, DispatcherError, NoopHooks, RetryPolicy};
use crate::error::ApiError;
use crate::service_engine::{error_response, json_response, ApiRequest, RouteDescriptor, ServiceEngine};

/// Illustrative fixture exercising `Dispatcher`: `POST /automation/jobs/{id}/tick`
/// runs the job's (fake) function through the retry wrapper and records the
/// outcome on the job's `ResourceRecord`.
pub struct AutomationService {
    store: Arc<InMemoryStore<ResourceRecord>>,
    dispatcher: Arc<Dispatcher>,
}

impl AutomationService {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            dispatcher: Arc::new(Dispatcher::new(
                RetryPolicy::default(),
                Arc::new(Metrics::new().dispatcher),
            )),
        }
    }

    async fn create_job(&self, request: ApiRequest) -> axum::response::Response {
        let function_id = request.body["function_id"].as_str().unwrap_or("").to_string();
        if function_id.is_empty() {
            return error_response(ApiError::validation("function_id is required"));
        }
        let trigger = request.body.get("trigger").cloned().unwrap_or(serde_json::Value::Null);
        let payload = serde_json::json!({ "function_id": function_id, "trigger": trigger, "last_run_at": null });
        let record = ResourceRecord::new(
            request.account_id,
            "job",
            platform_types::Metadata::new(),
            payload,
        );
        if let Err(err) = self.store.put(&request.account_id, record.id.as_uuid(), record.clone()) {
            return error_response(ApiError::from(err));
        }
        json_response(axum::http::StatusCode::CREATED, &record)
    }

    async fn tick(&self, request: ApiRequest) -> axum::response::Response {
        let Some(id_raw) = request.path_params.get("id") else {
            return error_response(ApiError::validation("missing id"));
        };
        let Ok(id) = id_raw.parse::<Uuid>() else {
            return error_response(ApiError::validation("invalid job id"));
        };

        let mut record = match self.store.get(&request.account_id, id) {
            Ok(Some(record)) => record,
            Ok(None) => return error_response(ApiError::not_found("job not found")),
            Err(err) => return error_response(ApiError::from(err)),
        };

        if record.status == ResourceStatus::Pending {
            let _ = record.transition(ResourceStatus::Running);
        }

        let (_tx, kill) = tokio::sync::broadcast::channel(1);
        let outcome: Result<(), DispatcherError<String>> = self
            .dispatcher
            .run(
                "automation.tick",
                kill,
                |_err: &String| true,
                &NoopHooks,
                |_attempt| async { Ok::<(), String>(()) },
            )
            .await;

        match outcome {
            Ok(()) => {
                let _ = record.transition(ResourceStatus::Succeeded);
                record.payload["last_run_at"] = serde_json::json!(chrono::Utc::now());
            }
            Err(err) => {
                record.last_error = Some(err.to_string());
                let _ = record.transition(ResourceStatus::Failed);
            }
        }

        if let Err(err) = self.store.put(&request.account_id, id, record.clone()) {
            return error_response(ApiError::from(err));
        }
        json_response(axum::http::StatusCode::OK, &record)
    }
}

impl Default for AutomationService {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceEngine for AutomationService {
    fn name(&self) -> &str {
        "automation"
    }

    fn domain(&self) -> &str {
        "automation"
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["automation".to_string()]
    }

    fn required_apis(&self) -> Vec<String> {
        vec![]
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn routes(&self) -> Vec<RouteDescriptor> {
        let create_store = self.store.clone();
        let create_dispatcher = self.dispatcher.clone();
        let tick_store = self.store.clone();
        let tick_dispatcher = self.dispatcher.clone();

        vec![
            RouteDescriptor {
                method: Method::POST,
                pattern: "/jobs".to_string(),
                handler: Arc::new(move |req| {
                    let service = AutomationService {
                        store: create_store.clone(),
                        dispatcher: create_dispatcher.clone(),
                    };
                    Box::pin(async move { service.create_job(req).await })
                }),
            },
            RouteDescriptor {
                method: Method::POST,
                pattern: "/jobs/{id}/tick".to_string(),
                handler: Arc::new(move |req| {
                    let service = AutomationService {
                        store: tick_store.clone(),
                        dispatcher: tick_dispatcher.clone(),
                    };
                    Box::pin(async move { service.tick(req).await })
                }),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(account_id: AccountId, body: serde_json::Value, path_id: Option<Uuid>) -> ApiRequest {
        let mut path_params = std::collections::HashMap::new();
        if let Some(id) = path_id {
            path_params.insert("id".to_string(), id.to_string());
        }
        ApiRequest {
            account_id,
            headers: Default::default(),
            query: Default::default(),
            path_params,
            body,
        }
    }

    #[tokio::test]
    async fn tick_transitions_job_to_succeeded() {
        let service = AutomationService::new();
        let tenant = AccountId::new();

        let created = service
            .create_job(request(tenant, serde_json::json!({"function_id": "fn-1"}), None))
            .await;
        assert_eq!(created.status(), axum::http::StatusCode::CREATED);

        let page = service
            .store
            .list(&tenant, platform_types::Pagination { limit: 0, offset: 0 })
            .unwrap();
        let id = page.items[0].id.as_uuid();
        let ticked = service.tick(request(tenant, serde_json::Value::Null, Some(id))).await;
        assert_eq!(ticked.status(), axum::http::StatusCode::OK);
    }
}
