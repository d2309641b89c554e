//! Persisted session snapshot schema and startup validation.
//!
//! The canonical snapshot is `{"version": 1, "session": {...}}`. Older clients
//! wrote untagged shapes, either nested under an `"auth"` key (sometimes as a
//! JSON-encoded string) or flat at the top level; [`restore`] still reads those
//! and the store rewrites them in the canonical form on adoption.

use crate::types::{Credentials, User};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

const LEGACY_CONTAINER_KEY: &str = "auth";

/// Which on-disk shape a snapshot was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotShape {
    Versioned,
    LegacyNested,
    LegacyFlat,
}

impl SnapshotShape {
    pub fn is_legacy(&self) -> bool {
        !matches!(self, SnapshotShape::Versioned)
    }
}

/// A snapshot that passed validation.
#[derive(Debug, Clone)]
pub struct RestoredSession {
    pub user: Option<User>,
    pub credentials: Credentials,
    pub shape: SnapshotShape,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SnapshotEnvelope<S> {
    pub version: u32,
    pub session: S,
}

/// Write form of the session body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PersistedSessionRef<'a> {
    pub user: Option<&'a User>,
    pub access_token: &'a str,
    pub refresh_token: &'a str,
}

/// Read form of the session body; every field may be missing or null.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedSession {
    #[serde(default)]
    user: Option<Value>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Build the canonical snapshot for a session.
pub(crate) fn envelope<'a>(
    user: Option<&'a User>,
    credentials: &'a Credentials,
) -> SnapshotEnvelope<PersistedSessionRef<'a>> {
    SnapshotEnvelope {
        version: SNAPSHOT_VERSION,
        session: PersistedSessionRef {
            user,
            access_token: credentials.access_token(),
            refresh_token: credentials.refresh_token(),
        },
    }
}

/// Validate a raw snapshot.
///
/// Returns `None` when the snapshot is absent, unparseable, or lacks either
/// token. A user record or an `isAuthenticated` flag on its own is never enough.
pub fn restore(raw: Option<&Value>) -> Option<RestoredSession> {
    let raw = raw?;
    let (session, shape) = parse(raw)?;

    let credentials = match Credentials::new(
        session.access_token.unwrap_or_default(),
        session.refresh_token.unwrap_or_default(),
    ) {
        Some(credentials) => credentials,
        None => {
            debug!(shape = ?shape, "Snapshot is missing a token, discarding");
            return None;
        }
    };

    let user = session
        .user
        .filter(|value| !value.is_null())
        .and_then(|value| match serde_json::from_value::<User>(value) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Snapshot user record is malformed, dropping it");
                None
            }
        });

    Some(RestoredSession {
        user,
        credentials,
        shape,
    })
}

fn parse(raw: &Value) -> Option<(PersistedSession, SnapshotShape)> {
    let object = raw.as_object()?;

    if let Some(version) = object.get("version") {
        if version.as_u64() != Some(u64::from(SNAPSHOT_VERSION)) {
            warn!(version = %version, "Unsupported snapshot version");
            return None;
        }
        let envelope: SnapshotEnvelope<PersistedSession> =
            serde_json::from_value(raw.clone()).ok()?;
        return Some((envelope.session, SnapshotShape::Versioned));
    }

    legacy::parse(raw)
}

// TODO: drop the legacy shapes once clients older than the versioned snapshot
// are no longer supported.
mod legacy {
    use super::{PersistedSession, SnapshotShape, LEGACY_CONTAINER_KEY};
    use serde_json::Value;

    pub(super) fn parse(raw: &Value) -> Option<(PersistedSession, SnapshotShape)> {
        let object = raw.as_object()?;

        if let Some(container) = object.get(LEGACY_CONTAINER_KEY) {
            // Persisted stores serialized each slice as a JSON string
            let nested = match container {
                Value::String(encoded) => serde_json::from_str::<Value>(encoded).ok()?,
                other => other.clone(),
            };
            let session = serde_json::from_value(nested).ok()?;
            return Some((session, SnapshotShape::LegacyNested));
        }

        if object.contains_key("user") || object.contains_key("accessToken") {
            let session = serde_json::from_value(raw.clone()).ok()?;
            return Some((session, SnapshotShape::LegacyFlat));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> Value {
        json!({
            "id": "u-1",
            "email": "reader@khotruyen.vn",
            "name": "Reader",
            "role": "USER",
            "createdAt": "2024-03-01T10:00:00Z"
        })
    }

    #[test]
    fn test_absent_snapshot() {
        assert!(restore(None).is_none());
    }

    #[test]
    fn test_versioned_snapshot() {
        let raw = json!({
            "version": 1,
            "session": {"user": user(), "accessToken": "a1", "refreshToken": "r1"}
        });
        let restored = restore(Some(&raw)).unwrap();
        assert_eq!(restored.shape, SnapshotShape::Versioned);
        assert_eq!(restored.credentials.access_token(), "a1");
        assert_eq!(restored.user.unwrap().id, "u-1");
    }

    #[test]
    fn test_unknown_version_rejected() {
        let raw = json!({
            "version": 2,
            "session": {"accessToken": "a1", "refreshToken": "r1"}
        });
        assert!(restore(Some(&raw)).is_none());
    }

    #[test]
    fn test_authenticated_flag_without_token_rejected() {
        let raw = json!({
            "auth": {"user": user(), "isAuthenticated": true, "accessToken": null, "refreshToken": "r1"}
        });
        assert!(restore(Some(&raw)).is_none());
    }

    #[test]
    fn test_user_alone_rejected() {
        let raw = json!({"user": user()});
        assert!(restore(Some(&raw)).is_none());
    }

    #[test]
    fn test_empty_token_rejected() {
        let raw = json!({
            "version": 1,
            "session": {"accessToken": "", "refreshToken": "r1"}
        });
        assert!(restore(Some(&raw)).is_none());
    }

    #[test]
    fn test_legacy_nested_string() {
        let inner = json!({"user": user(), "accessToken": "a1", "refreshToken": "r1"});
        let raw = json!({"auth": inner.to_string(), "_persist": "{\"version\":-1}"});
        let restored = restore(Some(&raw)).unwrap();
        assert_eq!(restored.shape, SnapshotShape::LegacyNested);
        assert!(restored.shape.is_legacy());
        assert_eq!(restored.credentials.refresh_token(), "r1");
    }

    #[test]
    fn test_legacy_flat() {
        let raw = json!({"user": user(), "accessToken": "a1", "refreshToken": "r1"});
        let restored = restore(Some(&raw)).unwrap();
        assert_eq!(restored.shape, SnapshotShape::LegacyFlat);
    }

    #[test]
    fn test_malformed_user_is_dropped_but_tokens_kept() {
        let raw = json!({
            "version": 1,
            "session": {"user": {"id": "u-1"}, "accessToken": "a1", "refreshToken": "r1"}
        });
        let restored = restore(Some(&raw)).unwrap();
        assert!(restored.user.is_none());
    }

    #[test]
    fn test_unrelated_blob_is_absent() {
        assert!(restore(Some(&json!({"theme": "dark"}))).is_none());
        assert!(restore(Some(&json!("just a string"))).is_none());
    }

    #[test]
    fn test_envelope_round_trips_through_restore() {
        let user: User = serde_json::from_value(user()).unwrap();
        let credentials = Credentials::new("a1", "r1").unwrap();
        let value = serde_json::to_value(envelope(Some(&user), &credentials)).unwrap();

        assert_eq!(value["version"], 1);
        let restored = restore(Some(&value)).unwrap();
        assert_eq!(restored.user, Some(user));
        assert_eq!(restored.credentials, credentials);
    }
}
