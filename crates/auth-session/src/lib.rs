//! Authenticated session core for the khotruyen client.
//!
//! This crate provides:
//! - A session store holding the user, the token pair and the auth flag
//! - An HTTP client that attaches the bearer token and recovers from `401`
//!   with a single refresh-and-retry
//! - A refresh coordinator that shares one in-flight refresh between callers
//! - Startup rehydration from a persisted, versioned session snapshot
//! - Explicit FSM-based auth state tracking with change notifications

mod auth_fsm;
mod auth_service;
mod client;
mod error;
mod rehydrate;
mod refresh;
mod session;
mod transport;
mod types;

#[cfg(test)]
mod tests;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{
    AuthMachine, AuthMachineInput, AuthMachineState, AuthState, AuthStateChangedPayload,
    ChangeReason,
};
pub use auth_service::AuthService;
pub use client::ApiClient;
pub use error::{AuthError, AuthResult};
pub use rehydrate::{RestoredSession, SnapshotShape, SNAPSHOT_VERSION};
pub use refresh::RefreshCoordinator;
pub use session::{AuthStateCallback, Session, SessionStore};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
pub use types::{Credentials, Role, User};
