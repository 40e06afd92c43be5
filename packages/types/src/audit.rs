use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::id::AccountId;

/// One immutable row written by the audit middleware for every mutating
/// request that reaches a handler, exposed read-only via `GET /system/audit`.
#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct AuditEntry {
    pub id: uuid::Uuid,
    pub account_id: Option<AccountId>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        account_id: Option<AccountId>,
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            account_id,
            method: method.into(),
            path: path.into(),
            status,
            request_id: request_id.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_records_given_fields() {
        let entry = AuditEntry::new(Some(AccountId::new()), "POST", "/v1/channels", 201, "req-1");
        assert_eq!(entry.method, "POST");
        assert_eq!(entry.status, 201);
        assert_eq!(entry.request_id, "req-1");
    }
}
