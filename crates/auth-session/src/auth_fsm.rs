//! Authentication state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐   Rehydrate    ┌─────────────────┐
//! │   NotLoggedIn   │ ─────────────► │   Rehydrating   │
//! └────────┬────────┘                └────────┬────────┘
//!          │ LoginAttempt                     │ SessionRestored / NoSession
//!          ▼                                  ▼
//! ┌─────────────────┐  LoginSuccess  ┌─────────────────┐  TokenRejected  ┌─────────────────┐
//! │   LoggingIn     │ ─────────────► │    LoggedIn     │ ──────────────► │   Refreshing    │
//! └─────────────────┘                └────────┬────────┘ ◄────────────── └────────┬────────┘
//!                                             │          RefreshSuccess           │ RefreshFailed
//!                                             │ LogoutRequested                   ▼
//!                                             ▼                              NotLoggedIn
//!                                    ┌─────────────────┐
//!                                    │   LoggingOut    │ ── LogoutComplete ──► NotLoggedIn
//!                                    └─────────────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(NotLoggedIn)

    NotLoggedIn => {
        Rehydrate => Rehydrating,
        LoginAttempt => LoggingIn
    },
    Rehydrating => {
        SessionRestored => LoggedIn,
        NoSession => NotLoggedIn
    },
    LoggingIn => {
        LoginSuccess => LoggedIn,
        LoginFailed => NotLoggedIn
    },
    LoggedIn => {
        // A request came back 401; a refresh is starting
        TokenRejected => Refreshing,
        LoginAttempt => LoggingIn,
        LogoutRequested => LoggingOut,
        // Profile check rejected a restored session
        SessionInvalidated => NotLoggedIn
    },
    Refreshing => {
        // Further 401s join the refresh already in progress
        TokenRejected => Refreshing,
        RefreshSuccess => LoggedIn,
        RefreshFailed => NotLoggedIn,
        // Profile check failed while another request was refreshing
        SessionInvalidated => NotLoggedIn,
        LoginAttempt => LoggingIn,
        LogoutRequested => LoggingOut
    },
    LoggingOut => {
        LogoutComplete => NotLoggedIn
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// User-facing authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    NotLoggedIn,
    /// Restoring the persisted snapshot at startup.
    Rehydrating,
    LoggingIn,
    LoggedIn,
    /// Exchanging the refresh token after a 401.
    Refreshing,
    LoggingOut,
}

impl AuthState {
    /// Returns true if the user has a usable session.
    ///
    /// `Refreshing` counts: the session is intact while a new access token is
    /// being minted.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::LoggedIn | AuthState::Refreshing)
    }

    /// Returns true if the state is a transient/in-progress state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthState::Rehydrating
                | AuthState::LoggingIn
                | AuthState::Refreshing
                | AuthState::LoggingOut
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::NotLoggedIn => AuthState::NotLoggedIn,
            AuthMachineState::Rehydrating => AuthState::Rehydrating,
            AuthMachineState::LoggingIn => AuthState::LoggingIn,
            AuthMachineState::LoggedIn => AuthState::LoggedIn,
            AuthMachineState::Refreshing => AuthState::Refreshing,
            AuthMachineState::LoggingOut => AuthState::LoggingOut,
        }
    }
}

/// Why a notification was emitted, when the state alone does not say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Refresh failed; the UI should send the user to its login surface.
    SessionExpired,
    /// The persisted session was rejected by the profile check.
    SessionInvalidated,
    /// The user logged out.
    LoggedOut,
}

/// Payload for auth state change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    /// Current auth state.
    pub state: AuthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ChangeReason>,
    /// User ID if logged in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// User email if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
