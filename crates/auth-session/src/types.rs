//! Domain and wire types for the auth API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Account role as sent by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "USER"),
            Role::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Authenticated user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Some backend builds send numeric ids.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Access and refresh token pair.
///
/// Only constructible with both tokens non-empty, so a session holding
/// `Some(Credentials)` always has a usable pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_token: String,
    refresh_token: String,
}

impl Credentials {
    /// Returns `None` when either token is empty.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Option<Self> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        if access_token.is_empty() || refresh_token.is_empty() {
            return None;
        }
        Some(Self {
            access_token,
            refresh_token,
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

// Wire types. Request bodies carrying a password deliberately do not derive Debug.

#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogoutRequest<'a> {
    pub refresh_token: &'a str,
}

/// Login and register response.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

/// Refresh response. The user is optional; the previous one is kept when absent.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    #[serde(default)]
    pub user: Option<User>,
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_json() -> serde_json::Value {
        json!({
            "id": "u-1",
            "email": "reader@khotruyen.vn",
            "name": "Reader",
            "role": "USER",
            "createdAt": "2024-03-01T10:00:00Z"
        })
    }

    #[test]
    fn test_user_deserializes_camel_case() {
        let user: User = serde_json::from_value(user_json()).unwrap();
        assert_eq!(user.id, "u-1");
        assert_eq!(user.role, Role::User);
        assert!(user.avatar.is_none());
        assert!(!user.is_admin());
    }

    #[test]
    fn test_user_numeric_id() {
        let mut value = user_json();
        value["id"] = json!(42);
        value["role"] = json!("ADMIN");
        let user: User = serde_json::from_value(value).unwrap();
        assert_eq!(user.id, "42");
        assert!(user.is_admin());
    }

    #[test]
    fn test_user_serializes_back_to_wire_names() {
        let user: User = serde_json::from_value(user_json()).unwrap();
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["role"], "USER");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("avatar").is_none());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let mut value = user_json();
        value["role"] = json!("MODERATOR");
        assert!(serde_json::from_value::<User>(value).is_err());
    }

    #[test]
    fn test_credentials_require_both_tokens() {
        assert!(Credentials::new("a", "r").is_some());
        assert!(Credentials::new("", "r").is_none());
        assert!(Credentials::new("a", "").is_none());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new("secret-access", "secret-refresh").unwrap();
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }

    #[test]
    fn test_refresh_response_without_user() {
        let resp: RefreshResponse =
            serde_json::from_value(json!({"accessToken": "a2", "refreshToken": "r2"})).unwrap();
        assert!(resp.user.is_none());
        assert_eq!(resp.access_token, "a2");
    }

    #[test]
    fn test_refresh_request_wire_name() {
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: "r1",
        })
        .unwrap();
        assert_eq!(body, json!({"refreshToken": "r1"}));
    }
}
