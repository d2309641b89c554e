//! Storage key constants.

/// Keys used in the storage backend.
pub struct StorageKeys;

impl StorageKeys {
    /// Serialized session snapshot (user + tokens).
    pub const SESSION_SNAPSHOT: &'static str = "khotruyen.session.snapshot";
}
