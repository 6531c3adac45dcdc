//! Key-value backends for the persister.

use crate::error::PersistError;
use async_trait::async_trait;
use redb::{Database, TableDefinition, TableError};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Async key-value storage holding JSON values.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Value>, PersistError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), PersistError>;

    async fn remove(&self, key: &str) -> Result<(), PersistError>;

    /// Drops every key of this storage instance.
    async fn clear(&self) -> Result<(), PersistError>;
}

// =============================================================================
// MEMORY
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, PersistError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), PersistError> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.entries().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistError> {
        self.entries().clear();
        Ok(())
    }
}

// =============================================================================
// REDB
// =============================================================================

/// Storage backed by an embedded redb file. Each instance owns one table, named
/// after the persister, so several persisters can share a database file.
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
    table: Arc<str>,
}

impl RedbStorage {
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, PersistError> {
        let db = Database::create(path.as_ref()).map_err(PersistError::storage)?;

        let write_txn = db.begin_write().map_err(PersistError::storage)?;
        {
            let _table = write_txn
                .open_table(definition(table))
                .map_err(PersistError::storage)?;
        }
        write_txn.commit().map_err(PersistError::storage)?;

        Ok(Self {
            db: Arc::new(db),
            table: Arc::from(table),
        })
    }

    /// Runs blocking redb work off the async executor.
    async fn blocking<T, F>(&self, work: F) -> Result<T, PersistError>
    where
        T: Send + 'static,
        F: FnOnce(&Database, &str) -> Result<T, PersistError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let table = Arc::clone(&self.table);
        tokio::task::spawn_blocking(move || work(&db, &table))
            .await
            .map_err(PersistError::storage)?
    }
}

impl std::fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorage").field("table", &self.table).finish()
    }
}

fn definition(table: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(table)
}

#[async_trait]
impl Storage for RedbStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, PersistError> {
        let key = key.to_string();
        self.blocking(move |db, table| {
            let read_txn = db.begin_read().map_err(PersistError::storage)?;
            let table = match read_txn.open_table(definition(table)) {
                Ok(table) => table,
                // cleared
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(PersistError::storage(e)),
            };
            match table.get(key.as_str()).map_err(PersistError::storage)? {
                Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), PersistError> {
        let key = key.to_string();
        let bytes = serde_json::to_vec(&value)?;
        self.blocking(move |db, table| {
            let write_txn = db.begin_write().map_err(PersistError::storage)?;
            {
                let mut table = write_txn
                    .open_table(definition(table))
                    .map_err(PersistError::storage)?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(PersistError::storage)?;
            }
            write_txn.commit().map_err(PersistError::storage)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        let key = key.to_string();
        self.blocking(move |db, table| {
            let write_txn = db.begin_write().map_err(PersistError::storage)?;
            {
                let mut table = write_txn
                    .open_table(definition(table))
                    .map_err(PersistError::storage)?;
                table.remove(key.as_str()).map_err(PersistError::storage)?;
            }
            write_txn.commit().map_err(PersistError::storage)
        })
        .await
    }

    async fn clear(&self) -> Result<(), PersistError> {
        self.blocking(move |db, table| {
            let write_txn = db.begin_write().map_err(PersistError::storage)?;
            write_txn
                .delete_table(definition(table))
                .map_err(PersistError::storage)?;
            write_txn.commit().map_err(PersistError::storage)
        })
        .await
    }
}
