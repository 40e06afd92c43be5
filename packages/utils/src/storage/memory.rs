use std::collections::BTreeMap;
use std::sync::RwLock;

use dashmap::DashMap;
use platform_types::{pagination::clamp_limit, AccountId, Page, Pagination};
use tracing::instrument;
use uuid::Uuid;

use super::{Store, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::error::StoreError;

/// DashMap-backed `Store`, grounded on `WavsDb`'s type-erased per-table
/// maps. Each account gets its own ordered map so listing iterates in
/// ascending UUIDv7 (creation) order without a separate sort step.
pub struct InMemoryStore<V> {
    accounts: DashMap<AccountId, RwLock<BTreeMap<Uuid, V>>>,
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }
}

impl<V> InMemoryStore<V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V: Clone + Send + Sync + 'static> Store<V> for InMemoryStore<V> {
    #[instrument(skip(self, value), fields(subsys = "InMemoryStore"))]
    fn put(&self, account_id: &AccountId, id: Uuid, value: V) -> Result<(), StoreError> {
        let entry = self
            .accounts
            .entry(*account_id)
            .or_insert_with(|| RwLock::new(BTreeMap::new()));
        entry
            .write()
            .map_err(|_| StoreError::NotFound)?
            .insert(id, value);
        Ok(())
    }

    #[instrument(skip(self), fields(subsys = "InMemoryStore"))]
    fn get(&self, account_id: &AccountId, id: Uuid) -> Result<Option<V>, StoreError> {
        match self.accounts.get(account_id) {
            Some(records) => Ok(records
                .read()
                .map_err(|_| StoreError::NotFound)?
                .get(&id)
                .cloned()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(subsys = "InMemoryStore"))]
    fn delete(&self, account_id: &AccountId, id: Uuid) -> Result<Option<V>, StoreError> {
        match self.accounts.get(account_id) {
            Some(records) => Ok(records.write().map_err(|_| StoreError::NotFound)?.remove(&id)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(subsys = "InMemoryStore"))]
    fn list(&self, account_id: &AccountId, page: Pagination) -> Result<Page<V>, StoreError> {
        let limit = clamp_limit(page.limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT);
        let offset = page.offset.max(0) as usize;

        let values: Vec<V> = match self.accounts.get(account_id) {
            Some(records) => records
                .read()
                .map_err(|_| StoreError::NotFound)?
                .values()
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let total = values.len();
        let items = values.into_iter().skip(offset).take(limit).collect();

        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::conformance;

    #[test]
    fn put_get_delete_list() {
        conformance::put_get_delete_list(InMemoryStore::<String>::new());
    }

    #[test]
    fn accounts_are_isolated() {
        conformance::accounts_are_isolated(InMemoryStore::<String>::new());
    }

    #[test]
    fn list_paginates_in_insertion_order() {
        conformance::list_paginates_in_insertion_order(InMemoryStore::<String>::new());
    }
}
