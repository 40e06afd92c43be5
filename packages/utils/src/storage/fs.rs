use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use platform_types::{pagination::clamp_limit, AccountId, Page, Pagination};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::{Store, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::error::StoreError;

#[derive(Serialize, Deserialize)]
struct Record<V> {
    account_id: AccountId,
    id: Uuid,
    // `None` marks a tombstone (delete) entry.
    value: Option<V>,
}

/// Append-only JSON-lines `Store`, grounded on `utils::storage::fs::FileStorage`.
/// Every `put`/`delete` is appended as a line before it is reflected in the
/// in-memory index, satisfying the "persist before sign" restart-recovery
/// requirement for `TxSubmitter` envelopes: replaying the file on `new`
/// reconstructs the same index a crashed process held.
pub struct FileStore<V> {
    path: PathBuf,
    file: Mutex<File>,
    index: Mutex<BTreeMap<AccountId, BTreeMap<Uuid, V>>>,
}

impl<V> FileStore<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    #[instrument(skip(path), fields(subsys = "FileStore"))]
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut index: BTreeMap<AccountId, BTreeMap<Uuid, V>> = BTreeMap::new();
        if path.exists() {
            let file = File::open(&path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: Record<V> = serde_json::from_str(&line)?;
                let account_records = index.entry(record.account_id).or_default();
                match record.value {
                    Some(value) => {
                        account_records.insert(record.id, value);
                    }
                    None => {
                        account_records.remove(&record.id);
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            index: Mutex::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &Record<V>) -> Result<(), StoreError> {
        let line = serde_json::to_string(record)?;
        let mut file = self.file.lock().map_err(|_| StoreError::NotFound)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

impl<V> Store<V> for FileStore<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    #[instrument(skip(self, value), fields(subsys = "FileStore"))]
    fn put(&self, account_id: &AccountId, id: Uuid, value: V) -> Result<(), StoreError> {
        self.append(&Record {
            account_id: *account_id,
            id,
            value: Some(value.clone()),
        })?;
        let mut index = self.index.lock().map_err(|_| StoreError::NotFound)?;
        index.entry(*account_id).or_default().insert(id, value);
        Ok(())
    }

    #[instrument(skip(self), fields(subsys = "FileStore"))]
    fn get(&self, account_id: &AccountId, id: Uuid) -> Result<Option<V>, StoreError> {
        let index = self.index.lock().map_err(|_| StoreError::NotFound)?;
        Ok(index.get(account_id).and_then(|m| m.get(&id).cloned()))
    }

    #[instrument(skip(self), fields(subsys = "FileStore"))]
    fn delete(&self, account_id: &AccountId, id: Uuid) -> Result<Option<V>, StoreError> {
        let removed = {
            let mut index = self.index.lock().map_err(|_| StoreError::NotFound)?;
            index.get_mut(account_id).and_then(|m| m.remove(&id))
        };
        if removed.is_some() {
            self.append(&Record {
                account_id: *account_id,
                id,
                value: None,
            })?;
        }
        Ok(removed)
    }

    #[instrument(skip(self), fields(subsys = "FileStore"))]
    fn list(&self, account_id: &AccountId, page: Pagination) -> Result<Page<V>, StoreError> {
        let limit = clamp_limit(page.limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT);
        let offset = page.offset.max(0) as usize;

        let index = self.index.lock().map_err(|_| StoreError::NotFound)?;
        let values: Vec<V> = index
            .get(account_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();

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

    fn store() -> (FileStore<String>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store.jsonl")).unwrap();
        (store, dir)
    }

    #[test]
    fn put_get_delete_list() {
        let (store, _dir) = store();
        conformance::put_get_delete_list(store);
    }

    #[test]
    fn accounts_are_isolated() {
        let (store, _dir) = store();
        conformance::accounts_are_isolated(store);
    }

    #[test]
    fn survives_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.jsonl");
        let account = AccountId::new();
        let id = Uuid::now_v7();

        {
            let store = FileStore::<String>::new(&path).unwrap();
            store.put(&account, id, "value".to_string()).unwrap();
        }

        let reopened = FileStore::<String>::new(&path).unwrap();
        assert_eq!(reopened.get(&account, id).unwrap(), Some("value".to_string()));
    }

    #[test]
    fn tombstone_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.jsonl");
        let account = AccountId::new();
        let id = Uuid::now_v7();

        {
            let store = FileStore::<String>::new(&path).unwrap();
            store.put(&account, id, "value".to_string()).unwrap();
            store.delete(&account, id).unwrap();
        }

        let reopened = FileStore::<String>::new(&path).unwrap();
        assert_eq!(reopened.get(&account, id).unwrap(), None);
    }
}
