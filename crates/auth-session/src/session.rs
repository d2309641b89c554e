//! Token store: the single source of truth for the authenticated session.
//!
//! All mutations swap the whole [`Session`] under one write lock, so readers
//! never see a half-updated record. Every successful mutation is mirrored to
//! the snapshot store after the lock is released; a revision number keeps a
//! slower write from overwriting a newer one. Persistence failures are logged
//! and never roll back the in-memory state.
//!
//! The store also owns the auth FSM and the state-change callback. Callbacks
//! run after every lock has been released.

use crate::auth_fsm::{
    AuthMachine, AuthMachineInput, AuthState, AuthStateChangedPayload, ChangeReason,
};
use crate::rehydrate::{self, RestoredSession};
use crate::types::{Credentials, User};
use crate::{AuthError, AuthResult};
use parking_lot::{Mutex, RwLock};
use session_storage::SnapshotStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Arc<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

/// In-memory session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: Option<User>,
    credentials: Option<Credentials>,
    error: Option<String>,
    is_loading: bool,
}

impl Default for Session {
    /// Pre-rehydration state: empty and loading.
    fn default() -> Self {
        Self {
            user: None,
            credentials: None,
            error: None,
            is_loading: true,
        }
    }
}

impl Session {
    fn cleared() -> Self {
        Self {
            is_loading: false,
            ..Self::default()
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.credentials.as_ref().map(Credentials::access_token)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.credentials.as_ref().map(Credentials::refresh_token)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Authenticated exactly when a token pair is held.
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }
}

struct Inner {
    session: Session,
    /// Bumped whenever the session is replaced or cleared.
    epoch: u64,
    /// Bumped for every change that must reach the snapshot.
    revision: u64,
}

enum SnapshotWrite {
    Save(Session),
    Delete,
}

/// Snapshot change staged under the session lock, flushed after it.
struct PendingWrite {
    revision: u64,
    write: SnapshotWrite,
}

/// Shared, lock-protected session state.
pub struct SessionStore {
    inner: RwLock<Inner>,
    snapshots: Option<SnapshotStore>,
    /// Revision of the last snapshot write.
    persisted_revision: Mutex<u64>,
    fsm: Mutex<AuthMachine>,
    state_callback: Mutex<Option<AuthStateCallback>>,
}

impl SessionStore {
    /// Create a store that mirrors every mutation to `snapshots`.
    pub fn new(snapshots: Option<SnapshotStore>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                session: Session::default(),
                epoch: 0,
                revision: 0,
            }),
            snapshots,
            persisted_revision: Mutex::new(0),
            fsm: Mutex::new(AuthMachine::new()),
            state_callback: Mutex::new(None),
        }
    }

    /// Store without persistence.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Set a callback to be notified of auth state changes.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        *self.state_callback.lock() = Some(callback);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn snapshot_view(&self) -> Session {
        self.inner.read().session.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.read().session.access_token().map(str::to_string)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.read().session.refresh_token().map(str::to_string)
    }

    pub fn user(&self) -> Option<User> {
        self.inner.read().session.user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().session.is_authenticated()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.read().epoch
    }

    /// Access token together with the epoch it belongs to.
    pub(crate) fn bearer(&self) -> (u64, Option<String>) {
        let inner = self.inner.read();
        (
            inner.epoch,
            inner.session.access_token().map(str::to_string),
        )
    }

    /// Refresh token together with the epoch it belongs to.
    pub(crate) fn refresh_context(&self) -> Option<(u64, String)> {
        let inner = self.inner.read();
        inner
            .session
            .refresh_token()
            .map(|token| (inner.epoch, token.to_string()))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Adopt a freshly authenticated session. Returns the new epoch.
    pub fn set_session(&self, user: User, credentials: Credentials) -> u64 {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.session = Session {
            user: Some(user),
            credentials: Some(credentials),
            error: None,
            is_loading: false,
        };
        let epoch = inner.epoch;
        let pending = self.stage_save(&mut inner);
        drop(inner);

        info!(epoch, "Session established");
        self.flush(pending);
        epoch
    }

    /// Install rotated tokens, but only if the session is still the one the
    /// refresh started from.
    ///
    /// The user record is kept when the refresh response carries none.
    pub(crate) fn apply_refresh(
        &self,
        epoch: u64,
        credentials: Credentials,
        user: Option<User>,
    ) -> AuthResult<()> {
        let mut inner = self.inner.write();
        if inner.epoch != epoch || !inner.session.is_authenticated() {
            debug!(
                started_epoch = epoch,
                current_epoch = inner.epoch,
                "Discarding refresh result for a replaced session"
            );
            return Err(AuthError::SessionCleared);
        }

        inner.session.credentials = Some(credentials);
        if user.is_some() {
            inner.session.user = user;
        }
        inner.session.error = None;
        let pending = self.stage_save(&mut inner);
        drop(inner);

        debug!(epoch, "Session tokens rotated");
        self.flush(pending);
        Ok(())
    }

    /// Replace the user record of an authenticated session.
    ///
    /// Returns false (and changes nothing) when not authenticated.
    pub fn set_user(&self, user: User) -> bool {
        let mut inner = self.inner.write();
        if !inner.session.is_authenticated() {
            return false;
        }
        inner.session.user = Some(user);
        let pending = self.stage_save(&mut inner);
        drop(inner);

        self.flush(pending);
        true
    }

    /// Record a user-visible error. Not persisted.
    pub fn set_error(&self, message: impl Into<String>) {
        self.inner.write().session.error = Some(message.into());
    }

    /// Drop the session and delete the snapshot.
    ///
    /// Bumps the epoch so that a refresh started before the clear cannot put
    /// tokens back.
    pub fn clear_session(&self) {
        let pending = self.clear_locked(&mut self.inner.write());
        self.flush(pending);
    }

    /// Clear only if nothing replaced or cleared the session since `epoch`.
    pub(crate) fn clear_session_if(&self, epoch: u64) -> bool {
        let mut inner = self.inner.write();
        if inner.epoch != epoch {
            return false;
        }
        let pending = self.clear_locked(&mut inner);
        drop(inner);

        self.flush(pending);
        true
    }

    fn clear_locked(&self, inner: &mut Inner) -> Option<PendingWrite> {
        inner.epoch += 1;
        inner.session = Session::cleared();
        info!(epoch = inner.epoch, "Session cleared");
        self.stage(inner, SnapshotWrite::Delete)
    }

    fn stage_save(&self, inner: &mut Inner) -> Option<PendingWrite> {
        self.snapshots.as_ref()?;
        let session = inner.session.clone();
        self.stage(inner, SnapshotWrite::Save(session))
    }

    fn stage(&self, inner: &mut Inner, write: SnapshotWrite) -> Option<PendingWrite> {
        self.snapshots.as_ref()?;
        inner.revision += 1;
        Some(PendingWrite {
            revision: inner.revision,
            write,
        })
    }

    /// Write a staged change unless a newer one already reached the snapshot.
    fn flush(&self, pending: Option<PendingWrite>) {
        let (Some(snapshots), Some(pending)) = (&self.snapshots, pending) else {
            return;
        };

        let mut persisted = self.persisted_revision.lock();
        if pending.revision <= *persisted {
            debug!(
                revision = pending.revision,
                persisted = *persisted,
                "Skipping superseded snapshot write"
            );
            return;
        }
        *persisted = pending.revision;

        let result = match &pending.write {
            SnapshotWrite::Save(session) => match session.credentials.as_ref() {
                Some(credentials) => {
                    snapshots.write(&rehydrate::envelope(session.user.as_ref(), credentials))
                }
                None => snapshots.clear(),
            },
            SnapshotWrite::Delete => snapshots.clear(),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session snapshot");
        }
    }

    // ------------------------------------------------------------------
    // Rehydration
    // ------------------------------------------------------------------

    /// Restore the persisted session. Call once at startup.
    ///
    /// Returns whether a session was adopted.
    pub fn rehydrate(&self) -> AuthResult<bool> {
        let raw = self.snapshots.as_ref().and_then(SnapshotStore::read);
        self.rehydrate_from(raw)
    }

    /// Restore from an already-read snapshot value.
    pub fn rehydrate_from(&self, raw: Option<serde_json::Value>) -> AuthResult<bool> {
        self.transition(&AuthMachineInput::Rehydrate)?;

        match rehydrate::restore(raw.as_ref()) {
            Some(restored) => {
                self.adopt(restored);
                self.transition(&AuthMachineInput::SessionRestored)?;
                Ok(true)
            }
            None => {
                if raw.is_some() {
                    info!("Persisted session is invalid, starting logged out");
                } else {
                    debug!("No persisted session");
                }
                let pending = self.clear_locked(&mut self.inner.write());
                self.flush(pending);
                self.transition(&AuthMachineInput::NoSession)?;
                Ok(false)
            }
        }
    }

    fn adopt(&self, restored: RestoredSession) {
        let RestoredSession {
            user,
            credentials,
            shape,
        } = restored;

        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.session = Session {
            user,
            credentials: Some(credentials),
            error: None,
            is_loading: false,
        };
        let epoch = inner.epoch;
        let pending = if shape.is_legacy() {
            info!(shape = ?shape, "Migrating legacy session snapshot");
            self.stage_save(&mut inner)
        } else {
            None
        };
        drop(inner);

        info!(epoch, "Session restored from snapshot");
        self.flush(pending);
    }

    // ------------------------------------------------------------------
    // FSM
    // ------------------------------------------------------------------

    /// Get the current FSM state.
    pub fn fsm_state(&self) -> AuthState {
        AuthState::from(self.fsm.lock().state())
    }

    /// Transition the FSM and notify the callback if the state changed.
    pub(crate) fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthState> {
        self.transition_with_reason(input, None)
    }

    pub(crate) fn transition_with_reason(
        &self,
        input: &AuthMachineInput,
        reason: Option<ChangeReason>,
    ) -> AuthResult<AuthState> {
        let mut fsm = self.fsm.lock();
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state || reason.is_some() {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                reason = ?reason,
                "Auth state transition"
            );
            self.notify_state_change(new_state.clone(), reason);
        }

        Ok(new_state)
    }

    /// Transition from the request path, where a concurrent login or logout
    /// may already have moved the machine on. Rejected inputs are ignored.
    pub(crate) fn advance(&self, input: &AuthMachineInput, reason: Option<ChangeReason>) {
        if let Err(e) = self.transition_with_reason(input, reason) {
            debug!(error = %e, "Ignoring stale auth transition");
        }
    }

    fn notify_state_change(&self, state: AuthState, reason: Option<ChangeReason>) {
        let Some(callback) = self.state_callback.lock().clone() else {
            return;
        };

        let (user_id, email) = self
            .user()
            .map(|u| (Some(u.id), Some(u.email)))
            .unwrap_or((None, None));

        callback(AuthStateChangedPayload {
            state,
            reason,
            user_id,
            email,
        });
    }
}
