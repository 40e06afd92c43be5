use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    id::{AccountId, ResourceId},
    metadata::Metadata,
};

/// Generic per-entity status. Transitions form a DAG:
/// `Pending -> Running -> {Succeeded, Failed, Retry}`, `Retry -> Pending`.
/// Every other edge, including self-loops, is rejected.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Retry,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid status transition {from:?} -> {to:?}")]
pub struct StatusTransitionError {
    pub from: ResourceStatus,
    pub to: ResourceStatus,
}

impl ResourceStatus {
    fn allowed_next(self) -> &'static [ResourceStatus] {
        use ResourceStatus::*;
        match self {
            Pending => &[Running],
            Running => &[Succeeded, Failed, Retry],
            Retry => &[Pending],
            Succeeded | Failed => &[],
        }
    }

    pub fn can_transition_to(self, next: ResourceStatus) -> bool {
        self.allowed_next().contains(&next)
    }
}

/// A generic account-scoped record. Every domain resource kind (channel,
/// delivery, job, request, secret, submission, sealed key, attestation)
/// is represented as a `ResourceRecord` distinguished by `kind`, carrying
/// an opaque JSON `payload` for kind-specific fields.
#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub account_id: AccountId,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: ResourceStatus,
    pub metadata: Metadata,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl ResourceRecord {
    pub fn new(
        account_id: AccountId,
        kind: impl Into<String>,
        metadata: Metadata,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ResourceId::new(),
            account_id,
            kind: kind.into(),
            created_at: now,
            updated_at: now,
            status: ResourceStatus::Pending,
            metadata: crate::metadata::normalize_metadata(&metadata),
            payload,
            attempts: 0,
            last_error: None,
        }
    }

    /// Applies a status transition, validating it against the DAG and
    /// bumping `updated_at`. On `Retry` it also increments `attempts`.
    pub fn transition(&mut self, next: ResourceStatus) -> Result<(), StatusTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusTransitionError {
                from: self.status,
                to: next,
            });
        }
        if next == ResourceStatus::Retry {
            self.attempts += 1;
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResourceStatus::*;

    fn record() -> ResourceRecord {
        ResourceRecord::new(AccountId::new(), "delivery", Metadata::new(), serde_json::json!({}))
    }

    #[test]
    fn new_record_starts_pending() {
        assert_eq!(record().status, Pending);
    }

    #[test]
    fn legal_transition_chain_succeeds() {
        let mut r = record();
        r.transition(Running).unwrap();
        r.transition(Retry).unwrap();
        r.transition(Pending).unwrap();
        r.transition(Running).unwrap();
        r.transition(Succeeded).unwrap();
        assert_eq!(r.status, Succeeded);
        assert_eq!(r.attempts, 1);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut r = record();
        let err = r.transition(Succeeded).unwrap_err();
        assert_eq!(err.from, Pending);
        assert_eq!(err.to, Succeeded);
        // state is unchanged on failure
        assert_eq!(r.status, Pending);
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        let mut r = record();
        r.transition(Running).unwrap();
        r.transition(Failed).unwrap();
        assert!(r.transition(Pending).is_err());
        assert!(r.transition(Running).is_err());
    }
}
