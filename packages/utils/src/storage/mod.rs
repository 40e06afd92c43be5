pub mod fs;
pub mod memory;
#[cfg(test)]
pub mod conformance;

pub use fs::FileStore;
pub use memory::InMemoryStore;

use platform_types::{AccountId, Page, Pagination};
use uuid::Uuid;

use crate::error::StoreError;

pub const DEFAULT_PAGE_LIMIT: usize = 25;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Account-scoped persistence, generalizing the teacher's `WavsDb`
/// `Table`/`TableHandle` pattern into a single generic contract every
/// domain service's store handle implements.
pub trait Store<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    fn put(&self, account_id: &AccountId, id: Uuid, value: V) -> Result<(), StoreError>;
    fn get(&self, account_id: &AccountId, id: Uuid) -> Result<Option<V>, StoreError>;
    fn delete(&self, account_id: &AccountId, id: Uuid) -> Result<Option<V>, StoreError>;
    fn list(&self, account_id: &AccountId, page: Pagination) -> Result<Page<V>, StoreError>;
}
