//! Shell-side storage backends for the key-value capability.
//!
//! The core never touches storage directly. A native shell (or a test)
//! resolves [`KvOperation`] requests by passing them to [`KvStore::handle`].

use std::collections::HashMap;

use crate::capabilities::{KvError, KvOperation, KvOutput, KvResult, MAX_VALUE_SIZE};

pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), KvError>;
    /// Returns whether a value was present.
    fn delete(&mut self, key: &str) -> Result<bool, KvError>;

    fn handle(&mut self, operation: &KvOperation) -> KvResult {
        match operation {
            KvOperation::Get { key } => self.get(key).map(KvOutput::Value),
            KvOperation::Set { key, value } => {
                if value.len() > MAX_VALUE_SIZE {
                    return Err(KvError::ValueTooLarge {
                        size: value.len(),
                        max: MAX_VALUE_SIZE,
                    });
                }
                self.set(key, value).map(|()| KvOutput::Written)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, KvError> {
        Ok(self.entries.remove(key).is_some())
    }
}

#[cfg(all(feature = "native-store", not(target_arch = "wasm32")))]
pub use self::sqlite::SqliteKvStore;

#[cfg(all(feature = "native-store", not(target_arch = "wasm32")))]
mod sqlite {
    use std::path::Path;

    use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
    use tracing::debug;

    use super::KvStore;
    use crate::capabilities::{KvError, StorageErrorCode};
    use crate::get_current_time_ms;

    const SCHEMA: &str = "
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL,
            updated_at INTEGER NOT NULL
        );
    ";

    /// SQLite-backed blob storage, one row per key.
    pub struct SqliteKvStore {
        conn: Connection,
    }

    impl SqliteKvStore {
        pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
            let conn = Connection::open(path.as_ref()).map_err(storage_error)?;
            Self::migrate(conn)
        }

        pub fn open_in_memory() -> Result<Self, KvError> {
            let conn = Connection::open_in_memory().map_err(storage_error)?;
            Self::migrate(conn)
        }

        fn migrate(conn: Connection) -> Result<Self, KvError> {
            conn.execute_batch(SCHEMA).map_err(storage_error)?;
            debug!("kv schema ready");
            Ok(Self { conn })
        }
    }

    impl KvStore for SqliteKvStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
            self.conn
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(storage_error)
        }

        fn set(&mut self, key: &str, value: &[u8]) -> Result<(), KvError> {
            let updated_at = i64::try_from(get_current_time_ms()).unwrap_or(i64::MAX);
            self.conn
                .execute(
                    "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                         value = excluded.value,
                         updated_at = excluded.updated_at",
                    params![key, value, updated_at],
                )
                .map_err(storage_error)?;
            Ok(())
        }

        fn delete(&mut self, key: &str) -> Result<bool, KvError> {
            let removed = self
                .conn
                .execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map_err(storage_error)?;
            Ok(removed > 0)
        }
    }

    fn storage_error(e: rusqlite::Error) -> KvError {
        let code = match &e {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy => StorageErrorCode::Busy,
                ErrorCode::DatabaseLocked => StorageErrorCode::Locked,
                ErrorCode::DiskFull => StorageErrorCode::DiskFull,
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                    StorageErrorCode::Corrupted
                }
                ErrorCode::PermissionDenied | ErrorCode::ReadOnly => {
                    StorageErrorCode::PermissionDenied
                }
                _ => StorageErrorCode::IoError,
            },
            _ => StorageErrorCode::Unknown,
        };
        KvError::storage(code, e.to_string())
    }
}
