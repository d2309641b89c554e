//! Login, registration, logout and startup restore.

use crate::auth_fsm::{AuthMachineInput, AuthState, ChangeReason};
use crate::client::ApiClient;
use crate::session::SessionStore;
use crate::transport::{ApiRequest, ApiResponse};
use crate::types::{AuthResponse, Credentials, LoginRequest, LogoutRequest, RegisterRequest, User};
use crate::{AuthError, AuthResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) const LOGIN_PATH: &str = "/auth/login";
pub(crate) const REGISTER_PATH: &str = "/auth/register";
pub(crate) const LOGOUT_PATH: &str = "/auth/logout";
pub(crate) const PROFILE_PATH: &str = "/auth/me";

/// High-level auth operations over an [`ApiClient`].
pub struct AuthService {
    client: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        self.client.store()
    }

    /// Log in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<User> {
        info!(email = %email, "Logging in");
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginRequest { email, password })?;
        self.authenticate(request).await
    }

    /// Create an account and log straight into it.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> AuthResult<User> {
        info!(email = %email, "Registering account");
        let request = ApiRequest::post(REGISTER_PATH).json(&RegisterRequest {
            name,
            email,
            password,
        })?;
        self.authenticate(request).await
    }

    async fn authenticate(&self, request: ApiRequest) -> AuthResult<User> {
        let store = self.store();
        store.transition(&AuthMachineInput::LoginAttempt)?;

        let result = self
            .client
            .send_auth_exchange(request)
            .await
            .and_then(parse_auth_response);

        match result {
            Ok((user, credentials)) => {
                store.set_session(user.clone(), credentials);
                store.transition(&AuthMachineInput::LoginSuccess)?;
                info!(user_id = %user.id, "Logged in");
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Authentication failed");
                store.set_error(e.to_string());
                store.transition(&AuthMachineInput::LoginFailed)?;
                Err(e)
            }
        }
    }

    /// Log out. The server call is best effort; local state is always cleared.
    pub async fn logout(&self) -> AuthResult<()> {
        let store = self.store();
        let authenticated = store.fsm_state().is_authenticated();
        if authenticated {
            store.transition(&AuthMachineInput::LogoutRequested)?;
        }

        if let Some(refresh_token) = store.refresh_token() {
            let request = ApiRequest::post(LOGOUT_PATH).json(&LogoutRequest {
                refresh_token: &refresh_token,
            })?;
            match self.client.send_auth_exchange(request).await {
                Ok(response) if response.is_success() => debug!("Server session revoked"),
                Ok(response) => warn!(
                    status = response.status,
                    body_summary = %response.body_summary(),
                    "Server rejected logout, clearing local session anyway"
                ),
                Err(e) => warn!(error = %e, "Logout request failed, clearing local session anyway"),
            }
        }

        store.clear_session();
        if authenticated {
            store.transition_with_reason(
                &AuthMachineInput::LogoutComplete,
                Some(ChangeReason::LoggedOut),
            )?;
        }
        info!("Logged out");
        Ok(())
    }

    /// Fetch the current user's profile and update the store.
    ///
    /// A failure that leaves the same session in place (the backend rejected
    /// it even after a refresh attempt, or it is otherwise unusable) clears it.
    pub async fn fetch_profile(&self) -> AuthResult<User> {
        let store = self.store();
        let epoch = store.epoch();
        if !store.is_authenticated() {
            return Err(AuthError::NotLoggedIn);
        }

        match self.client.get_json::<User>(PROFILE_PATH).await {
            Ok(user) => {
                store.set_user(user.clone());
                debug!(user_id = %user.id, "Profile refreshed");
                Ok(user)
            }
            Err(e) => {
                if store.clear_session_if(epoch) {
                    warn!(error = %e, "Profile check failed, session cleared");
                    store.advance(
                        &AuthMachineInput::SessionInvalidated,
                        Some(ChangeReason::SessionInvalidated),
                    );
                }
                Err(e)
            }
        }
    }

    /// Rehydrate the persisted session and optionally verify it with the
    /// backend.
    ///
    /// Returns:
    /// - `Ok(false)` if no session exists
    /// - `Ok(true)` if a session was restored (and verified, when asked)
    /// - `Err(...)` if the restored session was rejected and has been cleared
    pub async fn restore(&self, verify_profile: bool) -> AuthResult<bool> {
        let store = self.store();
        if !store.rehydrate()? {
            info!("No existing session found on startup");
            return Ok(false);
        }

        if verify_profile {
            let user = self.fetch_profile().await?;
            info!(user_id = %user.id, "Session restored and verified");
        } else {
            info!("Session restored");
        }
        Ok(true)
    }

    pub fn state(&self) -> AuthState {
        self.store().fsm_state()
    }
}

fn parse_auth_response(response: ApiResponse) -> AuthResult<(User, Credentials)> {
    if !response.is_success() {
        return Err(match response.status {
            400 | 401 | 403 => AuthError::InvalidCredentials(response.error_message()),
            _ => response.into_status_error(),
        });
    }

    let payload: AuthResponse = response.json()?;
    let credentials = Credentials::new(payload.access_token, payload.refresh_token)
        .ok_or_else(|| AuthError::MalformedResponse("auth response is missing a token".into()))?;
    Ok((payload.user, credentials))
}
