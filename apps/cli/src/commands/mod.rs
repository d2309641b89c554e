//! CLI command implementations.

mod api;
mod auth;

pub use api::get;
pub use auth::{login, logout, me, register, status};

use crate::output::{self, OutputFormat};
use anyhow::Result;
use auth_session::{
    ApiClient, AuthError, AuthService, AuthStateChangedPayload, ChangeReason, SessionStore,
};
use khotruyen_config::{Config, Paths};
use session_storage::{FileStorage, SnapshotStore};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, info};

/// Session core wired up for one CLI invocation.
pub struct Context {
    pub service: AuthService,
    pub client: Arc<ApiClient>,
    pub store: Arc<SessionStore>,
    pub format: OutputFormat,
}

impl Context {
    /// Open the persisted session and restore it.
    ///
    /// A stored session that fails restoration is already cleared by the core;
    /// the command then runs logged out.
    pub async fn open(
        paths: &Paths,
        config: &Config,
        format: &OutputFormat,
        verify: bool,
    ) -> Result<Self> {
        let storage = FileStorage::new(paths.session_file());
        let store = Arc::new(SessionStore::new(Some(SnapshotStore::new(Box::new(
            storage,
        )))));

        let notify_format = *format;
        store.set_state_callback(Arc::new(move |payload: AuthStateChangedPayload| {
            if matches!(
                payload.reason,
                Some(ChangeReason::SessionExpired | ChangeReason::SessionInvalidated)
            ) {
                output::print_error(
                    "Your session has expired. Run `khotruyen login` to sign in again.",
                    &notify_format,
                );
            }
        }));

        let client = Arc::new(ApiClient::from_config(config, store.clone())?);
        let service = AuthService::new(client.clone());

        match service.restore(verify).await {
            Ok(true) => info!("Using stored session"),
            Ok(false) => debug!("No stored session"),
            Err(e) => debug!(error = %e, "Stored session rejected"),
        }

        Ok(Self {
            service,
            client,
            store,
            format: *format,
        })
    }
}

/// Prompt for a line of input.
fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Use the given value or prompt for it; empty input is an error.
fn value_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    let value = match value {
        Some(v) => v.trim().to_string(),
        None => prompt(label)?,
    };
    if value.is_empty() {
        anyhow::bail!("{} is required", label);
    }
    Ok(value)
}

/// Read a password without echo.
fn prompt_password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("{}: ", label))?;
    if password.is_empty() {
        anyhow::bail!("{} is required", label);
    }
    Ok(password)
}

/// Describe an API failure for the user.
fn describe(err: &AuthError) -> String {
    if err.requires_login() {
        format!("{} (run `khotruyen login`)", err)
    } else if err.is_transient() {
        format!("{} (the server may be unavailable, try again)", err)
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_or_prompt_uses_given_value() {
        assert_eq!(
            value_or_prompt(Some("  reader@khotruyen.vn ".into()), "Email").unwrap(),
            "reader@khotruyen.vn"
        );
        assert!(value_or_prompt(Some("   ".into()), "Email").is_err());
    }

    #[test]
    fn test_describe_adds_hints() {
        assert!(describe(&AuthError::Unauthorized("expired".into())).contains("khotruyen login"));
        assert!(describe(&AuthError::Timeout).contains("try again"));
        assert_eq!(
            describe(&AuthError::InvalidCredentials("bad password".into())),
            "Invalid credentials: bad password"
        );
    }
}
