use std::path::Path;
use std::sync::Arc;

use redb::{Database, TableDefinition};
use tracing::debug;

use crate::error::KVError;
use crate::traits::KVStore;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("local_storage");

fn storage_err(e: impl std::fmt::Display) -> KVError {
    KVError::Storage(e.to_string())
}

/// RedbStore is a KVStore backed by redb, a pure-Rust embedded database.
/// Every mutation is its own committed write transaction.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create the storage database at the given path.
    pub fn open(path: &Path) -> Result<Self, KVError> {
        let db = Database::create(path).map_err(storage_err)?;

        // Create the table up front so read transactions never miss it.
        let write_txn = db.begin_write().map_err(storage_err)?;
        write_txn.open_table(TABLE).map_err(storage_err)?;
        write_txn.commit().map_err(storage_err)?;

        debug!("opened local storage at {}", path.display());
        Ok(Self { db: Arc::new(db) })
    }
}

impl KVStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TABLE).map_err(storage_err)?;
        let value = table.get(key).map_err(storage_err)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(storage_err)?;
            table.insert(key, value).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)
    }

    fn delete(&self, key: &str) -> Result<(), KVError> {
        self.batch_delete(&[key])
    }

    fn batch_delete(&self, keys: &[&str]) -> Result<(), KVError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(storage_err)?;
            for key in keys {
                table.remove(*key).map_err(storage_err)?;
            }
        }
        write_txn.commit().map_err(storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, RedbStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("storage.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn set_get_delete() {
        let (_dir, store) = open_temp();
        assert!(store.get("token").unwrap().is_none());

        store.set("token", b"abc").unwrap();
        assert_eq!(store.get("token").unwrap(), Some(b"abc".to_vec()));
        assert!(store.contains("token").unwrap());

        store.delete("token").unwrap();
        assert!(store.get("token").unwrap().is_none());
    }

    #[test]
    fn delete_missing_is_ok() {
        let (_dir, store) = open_temp();
        store.delete("never-set").unwrap();
    }

    #[test]
    fn batch_delete_removes_all_listed_keys() {
        let (_dir, store) = open_temp();
        store.set("token", b"t").unwrap();
        store.set("user", b"{}").unwrap();
        store.set("darkMode", b"true").unwrap();

        store.batch_delete(&["token", "user", "permissions"]).unwrap();

        assert!(store.get("token").unwrap().is_none());
        assert!(store.get("user").unwrap().is_none());
        assert_eq!(store.get("darkMode").unwrap(), Some(b"true".to_vec()));
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store.set("token", b"persisted").unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get("token").unwrap(), Some(b"persisted".to_vec()));
    }
}
