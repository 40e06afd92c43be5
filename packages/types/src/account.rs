use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    id::AccountId,
    metadata::{normalize_metadata, with_tenant, Metadata},
};

/// A tenant-owned principal and parent of all domain resources.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, ToSchema)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new account, stamping the reserved `tenant` metadata key.
    pub fn new(owner: impl Into<String>, tenant: &str, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            owner: owner.into(),
            metadata: with_tenant(normalize_metadata(&metadata), tenant),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tenant(&self) -> Option<&str> {
        self.metadata.get(crate::metadata::TENANT_KEY).map(String::as_str)
    }
}
