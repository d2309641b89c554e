//! Refresh-token exchange with single-flight coalescing.
//!
//! Concurrent callers that hit a `401` at the same time all await one shared
//! exchange and observe the same result. The exchange runs as its own task and
//! clears its slot when it resolves, so it completes even if every waiter is
//! dropped. A pending exchange is only joined by callers of the session it
//! started from.

use crate::auth_fsm::AuthMachineInput;
use crate::session::SessionStore;
use crate::transport::{ApiRequest, HttpTransport};
use crate::types::{Credentials, RefreshRequest, RefreshResponse};
use crate::{AuthError, AuthResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub(crate) const REFRESH_PATH: &str = "/auth/refresh";

type RefreshFuture = Shared<BoxFuture<'static, AuthResult<String>>>;
type RefreshSlot = Arc<Mutex<Option<InFlightRefresh>>>;

struct InFlightRefresh {
    id: u64,
    /// Session epoch the exchange was started for.
    epoch: u64,
    future: RefreshFuture,
}

/// Owns the refresh exchange for one session store.
pub struct RefreshCoordinator {
    store: Arc<SessionStore>,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    in_flight: RefreshSlot,
    next_id: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<SessionStore>,
        transport: Arc<dyn HttpTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            timeout,
            in_flight: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// Returns the new access token. Fails with `NoRefreshToken` without any
    /// network call when the store holds no refresh token, and with
    /// `SessionCleared` when the session was cleared or replaced while the
    /// exchange was in flight. On failure the store is left untouched.
    pub async fn refresh(&self) -> AuthResult<String> {
        let future = {
            let mut slot = self.in_flight.lock().await;

            let Some((epoch, refresh_token)) = self.store.refresh_context() else {
                warn!("No refresh token available");
                return Err(AuthError::NoRefreshToken);
            };

            let joinable = slot
                .as_ref()
                .filter(|in_flight| in_flight.epoch == epoch)
                .map(|in_flight| (in_flight.id, in_flight.future.clone()));
            if let Some((id, future)) = joinable {
                debug!(refresh_id = id, "Joining in-flight token refresh");
                drop(slot);
                return future.await;
            }

            if let Some(in_flight) = slot.as_ref() {
                debug!(
                    refresh_id = in_flight.id,
                    started_epoch = in_flight.epoch,
                    current_epoch = epoch,
                    "Not joining refresh of a replaced session"
                );
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            self.store.advance(&AuthMachineInput::TokenRejected, None);
            let future = self.spawn_exchange(id, epoch, refresh_token);
            *slot = Some(InFlightRefresh {
                id,
                epoch,
                future: future.clone(),
            });
            future
        };

        future.await
    }

    /// Whether an exchange is currently pending.
    pub async fn is_refreshing(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }

    fn spawn_exchange(&self, id: u64, epoch: u64, refresh_token: String) -> RefreshFuture {
        let store = self.store.clone();
        let transport = self.transport.clone();
        let timeout = self.timeout;
        let slot = self.in_flight.clone();

        let task = tokio::spawn(async move {
            let result = exchange(store, transport, timeout, id, epoch, refresh_token).await;

            let mut slot = slot.lock().await;
            if slot.as_ref().is_some_and(|in_flight| in_flight.id == id) {
                *slot = None;
            }
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                warn!(refresh_id = id, error = %e, "Token refresh task failed");
                Err(AuthError::Network(format!("refresh task failed: {}", e)))
            })
        }
        .boxed()
        .shared()
    }
}

async fn exchange(
    store: Arc<SessionStore>,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    refresh_id: u64,
    epoch: u64,
    refresh_token: String,
) -> AuthResult<String> {
    info!(refresh_id, epoch, "Refreshing access token");

    let request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest {
        refresh_token: &refresh_token,
    })?;
    let response = tokio::time::timeout(timeout, transport.execute(&request))
        .await
        .unwrap_or(Err(AuthError::Timeout))
        .map_err(|e| {
            warn!(refresh_id, error = %e, "Token refresh request failed");
            e
        })?;

    if !response.is_success() {
        warn!(
            refresh_id,
            status = response.status,
            body_summary = %response.body_summary(),
            "Token refresh rejected"
        );
        return Err(match response.status {
            400 | 401 | 403 => AuthError::InvalidCredentials(response.error_message()),
            _ => response.into_status_error(),
        });
    }

    let payload: RefreshResponse = response.json().map_err(|e| {
        warn!(refresh_id, body_summary = %response.body_summary(), "Token refresh payload malformed");
        e
    })?;
    let credentials = Credentials::new(payload.access_token, payload.refresh_token)
        .ok_or_else(|| AuthError::MalformedResponse("refresh returned an empty token".into()))?;
    let access_token = credentials.access_token().to_string();

    store.apply_refresh(epoch, credentials, payload.user)?;
    store.advance(&AuthMachineInput::RefreshSuccess, None);

    info!(refresh_id, "Access token refreshed");
    Ok(access_token)
}
