//! Typed access to the persisted session snapshot.

use crate::{SecureStorage, StorageError, StorageKeys, StorageResult};
use serde::Serialize;
use tracing::{debug, warn};

/// Reads and writes the session snapshot blob.
///
/// The snapshot schema itself belongs to the session layer; this store only
/// moves JSON in and out of the backend.
pub struct SnapshotStore {
    storage: Box<dyn SecureStorage>,
}

impl SnapshotStore {
    /// Create a snapshot store over the given storage backend
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Serialize and persist a snapshot, replacing any previous one.
    pub fn write<T: Serialize>(&self, snapshot: &T) -> StorageResult<()> {
        let json =
            serde_json::to_string(snapshot).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(StorageKeys::SESSION_SNAPSHOT, &json)?;
        debug!("Session snapshot written");
        Ok(())
    }

    /// Read the raw snapshot as JSON.
    ///
    /// Unreadable or unparseable snapshots are reported as absent: a broken
    /// snapshot must never keep the client from starting.
    pub fn read(&self) -> Option<serde_json::Value> {
        let raw = match self.storage.get(StorageKeys::SESSION_SNAPSHOT) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Session snapshot unreadable, treating as absent");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Session snapshot is not valid JSON, treating as absent");
                None
            }
        }
    }

    /// Delete the persisted snapshot.
    pub fn clear(&self) -> StorageResult<()> {
        let existed = self.storage.delete(StorageKeys::SESSION_SNAPSHOT)?;
        if existed {
            debug!("Session snapshot deleted");
        }
        Ok(())
    }
}
