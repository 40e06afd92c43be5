use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use platform_types::{AccountId, ResourceRecord, ResourceStatus, SubmissionPriority, SubmissionRequest};
use uuid::Uuid;

use utils::storage::{InMemoryStore, Store};
use utils::telemetry::Metrics;

use crate::error::ApiError;
use crate::policy::check_runner_token;
use crate::service_engine::{error_response, json_response, ApiRequest, RouteDescriptor, ServiceEngine};
use crate::tx_submitter::{ChainClient, TxSubmitter};

const RUNNER_TOKEN_HEADER: &str = "x-oracle-runner-token";

struct NoopChainClient;

#[async_trait]
impl ChainClient for NoopChainClient {
    async fn broadcast(&self, _chain_id: &str, _payload: &serde_json::Value) -> Result<String, String> {
        Ok(format!("0x{}", Uuid::now_v7().simple()))
    }

    async fn confirmation_depth(&self, _chain_id: &str, _tx_hash: &str) -> Result<Option<u64>, String> {
        Ok(Some(0))
    }
}

/// Returns `true` when `url` is allowed by the outbound allowlist. An empty
/// allowlist means open, matching the runner-token allowlist's convention.
fn is_allowlisted(allowlist: &[String], url: &str) -> bool {
    allowlist.is_empty() || allowlist.iter().any(|prefix| url.starts_with(prefix.as_str()))
}

/// Illustrative fixture exercising runner-token policy and transaction
/// submission: any tenant can file a price request, optionally backed by an
/// outbound fetch from `source_url`, but only a holder of a configured
/// runner token can fulfill it, which in turn files a chain submission
/// through `TxSubmitter`.
pub struct OracleService {
    requests: Arc<InMemoryStore<ResourceRecord>>,
    runner_allowlist: Vec<String>,
    http_client: reqwest::Client,
    http_allowlist: Vec<String>,
    max_response_bytes: u64,
    submitter: Arc<TxSubmitter<InMemoryStore<platform_types::SubmissionEnvelope>>>,
}

impl OracleService {
    pub fn new(runner_allowlist: Vec<String>, http_allowlist: Vec<String>, max_response_bytes: u64) -> Self {
        Self {
            requests: Arc::new(InMemoryStore::new()),
            runner_allowlist,
            http_client: reqwest::Client::new(),
            http_allowlist,
            max_response_bytes,
            submitter: TxSubmitter::new(
                Arc::new(InMemoryStore::new()),
                Arc::new(NoopChainClient),
                0,
                0,
                Arc::new(Metrics::new().submission),
            ),
        }
    }

    /// Fetches `url`, rejecting it up front if it isn't covered by
    /// `ORACLE_HTTP_ALLOWLIST` and capping the response at `ORACLE_MAX_SIZE`
    /// (checked against `Content-Length` where present, then re-checked
    /// against the bytes actually read).
    async fn fetch_source(&self, url: &str) -> Result<serde_json::Value, ApiError> {
        if !is_allowlisted(&self.http_allowlist, url) {
            return Err(ApiError::forbidden("source_url is not covered by the outbound allowlist"));
        }
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|err| ApiError::validation(format!("failed to fetch source_url: {err}")))?;
        if !response.status().is_success() {
            return Err(ApiError::validation(format!(
                "source_url returned status {}",
                response.status()
            )));
        }
        if response.content_length().is_some_and(|len| len > self.max_response_bytes) {
            return Err(ApiError::validation("source_url response exceeds oracle_max_size"));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ApiError::validation(format!("failed to read source_url response: {err}")))?;
        if bytes.len() as u64 > self.max_response_bytes {
            return Err(ApiError::validation("source_url response exceeds oracle_max_size"));
        }
        Ok(serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())))
    }

    async fn create_request(&self, request: ApiRequest) -> axum::response::Response {
        let pair = request.body["pair"].as_str().unwrap_or("").to_string();
        if pair.is_empty() {
            return error_response(ApiError::validation("pair is required"));
        }
        let mut payload = serde_json::json!({ "pair": pair });
        if let Some(source_url) = request.body.get("source_url").and_then(|v| v.as_str()) {
            match self.fetch_source(source_url).await {
                Ok(value) => payload["source_value"] = value,
                Err(err) => return error_response(err),
            }
        }
        let record = ResourceRecord::new(
            request.account_id,
            "oracle_request",
            platform_types::Metadata::new(),
            payload,
        );
        if let Err(err) = self.requests.put(&request.account_id, record.id.as_uuid(), record.clone()) {
            return error_response(ApiError::from(err));
        }
        json_response(axum::http::StatusCode::CREATED, &record)
    }

    async fn fulfill(&self, request: ApiRequest) -> axum::response::Response {
        let presented = request
            .headers
            .get(RUNNER_TOKEN_HEADER)
            .cloned()
            .or_else(|| {
                request
                    .headers
                    .get("authorization")
                    .and_then(|v| v.strip_prefix("Bearer ").map(str::to_string))
            });
        if let Err(err) = check_runner_token(&self.runner_allowlist, presented.as_deref()) {
            return error_response(ApiError::from(err));
        }

        let Some(id_raw) = request.path_params.get("id") else {
            return error_response(ApiError::validation("missing id"));
        };
        let Ok(id) = id_raw.parse::<Uuid>() else {
            return error_response(ApiError::validation("invalid request id"));
        };
        let mut record = match self.requests.get(&request.account_id, id) {
            Ok(Some(record)) => record,
            Ok(None) => return error_response(ApiError::not_found("oracle request not found")),
            Err(err) => return error_response(ApiError::from(err)),
        };

        let value = request.body.get("value").cloned().unwrap_or(serde_json::Value::Null);
        let submission = SubmissionRequest {
            request_id: id.to_string(),
            account_id: request.account_id,
            chain_id: "oracle-chain".to_string(),
            signing_account: "oracle-fulfiller".to_string(),
            payload: serde_json::json!({ "request_id": id, "value": value }),
            priority: SubmissionPriority::High,
            wait_for_confirmation: false,
            timeout_ms: Some(5_000),
        };

        let _ = record.transition(ResourceStatus::Running);
        match self.submitter.submit(submission).await {
            Ok(envelope) => {
                let _ = record.transition(ResourceStatus::Succeeded);
                record.payload["tx_hash"] = serde_json::json!(envelope.tx_hash);
            }
            Err(err) => {
                record.last_error = Some(err.to_string());
                let _ = record.transition(ResourceStatus::Failed);
            }
        }
        if let Err(err) = self.requests.put(&request.account_id, id, record.clone()) {
            return error_response(ApiError::from(err));
        }
        json_response(axum::http::StatusCode::OK, &record)
    }
}

impl ServiceEngine for OracleService {
    fn name(&self) -> &str {
        "oracle"
    }

    fn domain(&self) -> &str {
        "oracle"
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["oracle".to_string()]
    }

    fn required_apis(&self) -> Vec<String> {
        vec![]
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn routes(&self) -> Vec<RouteDescriptor> {
        let create_requests = self.requests.clone();
        let create_client = self.http_client.clone();
        let create_http_allowlist = self.http_allowlist.clone();
        let create_max_response_bytes = self.max_response_bytes;
        let create_submitter = self.submitter.clone();
        let fulfill_requests = self.requests.clone();
        let fulfill_client = self.http_client.clone();
        let fulfill_http_allowlist = self.http_allowlist.clone();
        let fulfill_max_response_bytes = self.max_response_bytes;
        let fulfill_allowlist = self.runner_allowlist.clone();
        let fulfill_submitter = self.submitter.clone();

        vec![
            RouteDescriptor {
                method: Method::POST,
                pattern: "/requests".to_string(),
                handler: Arc::new(move |req| {
                    let service = OracleService {
                        requests: create_requests.clone(),
                        runner_allowlist: Vec::new(),
                        http_client: create_client.clone(),
                        http_allowlist: create_http_allowlist.clone(),
                        max_response_bytes: create_max_response_bytes,
                        submitter: create_submitter.clone(),
                    };
                    Box::pin(async move { service.create_request(req).await })
                }),
            },
            RouteDescriptor {
                method: Method::POST,
                pattern: "/requests/{id}/fulfill".to_string(),
                handler: Arc::new(move |req| {
                    let service = OracleService {
                        requests: fulfill_requests.clone(),
                        runner_allowlist: fulfill_allowlist.clone(),
                        http_client: fulfill_client.clone(),
                        http_allowlist: fulfill_http_allowlist.clone(),
                        max_response_bytes: fulfill_max_response_bytes,
                        submitter: fulfill_submitter.clone(),
                    };
                    Box::pin(async move { service.fulfill(req).await })
                }),
            },
        ]
    }
}
