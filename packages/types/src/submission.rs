use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::id::AccountId;

/// Relative ordering within a single signing account's submission queue.
/// Declared low-to-high so the derived `Ord` sorts `High` greatest, matching
/// `std::collections::BinaryHeap`'s max-heap behavior directly.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Caller-facing request to submit a signed transaction through a chain
/// account's serialized queue. `request_id` is the idempotency key: two
/// requests with the same `request_id` resolve to the same submission.
#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct SubmissionRequest {
    pub request_id: String,
    pub account_id: AccountId,
    pub chain_id: String,
    pub signing_account: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: SubmissionPriority,
    #[serde(default)]
    pub wait_for_confirmation: bool,
    pub timeout_ms: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Queued,
    Submitted,
    Confirmed,
    Failed,
}

/// The durable record written before a transaction is signed, so a process
/// restart can resume a submission without ever signing the same payload
/// twice. Keyed by `request_id` for idempotent `Submit`.
#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct SubmissionEnvelope {
    pub request_id: String,
    pub account_id: AccountId,
    pub chain_id: String,
    pub signing_account: String,
    pub payload: serde_json::Value,
    pub priority: SubmissionPriority,
    pub status: SubmissionStatus,
    pub tx_hash: Option<String>,
    pub submit_attempts: u32,
    pub resubmit_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SubmissionEnvelope {
    pub fn from_request(request: &SubmissionRequest) -> Self {
        let now = Utc::now();
        Self {
            request_id: request.request_id.clone(),
            account_id: request.account_id,
            chain_id: request.chain_id.clone(),
            signing_account: request.signing_account.clone(),
            payload: request.payload.clone(),
            priority: request.priority,
            status: SubmissionStatus::Queued,
            tx_hash: None,
            submit_attempts: 0,
            resubmit_count: 0,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_high_above_normal_above_low() {
        let mut priorities = vec![
            SubmissionPriority::Normal,
            SubmissionPriority::Low,
            SubmissionPriority::High,
        ];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![
                SubmissionPriority::Low,
                SubmissionPriority::Normal,
                SubmissionPriority::High
            ]
        );
    }

    #[test]
    fn envelope_from_request_starts_queued_with_zero_attempts() {
        let request = SubmissionRequest {
            request_id: "req-1".to_string(),
            account_id: AccountId::new(),
            chain_id: "chain-a".to_string(),
            signing_account: "signer-1".to_string(),
            payload: serde_json::json!({"to": "0x0"}),
            priority: SubmissionPriority::High,
            wait_for_confirmation: true,
            timeout_ms: Some(5_000),
        };
        let envelope = SubmissionEnvelope::from_request(&request);
        assert_eq!(envelope.status, SubmissionStatus::Queued);
        assert_eq!(envelope.submit_attempts, 0);
        assert_eq!(envelope.request_id, "req-1");
    }
}
