//! Persistence for the client's session snapshot.
//!
//! This crate provides:
//! - The [`SecureStorage`] key/value trait the session core persists through
//! - [`MemoryStorage`] for tests and throwaway sessions
//! - [`FileStorage`], a JSON file with owner-only permissions
//! - [`SnapshotStore`], the typed read/write/delete API over a storage backend

mod file;
mod keys;
mod memory;
mod snapshot;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use snapshot::SnapshotStore;
pub use traits::SecureStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
