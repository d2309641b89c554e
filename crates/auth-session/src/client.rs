//! Authenticated HTTP client.
//!
//! Every request carries the current access token. A `401` triggers at most
//! one refresh and one retry per request; the retry's outcome is final. When
//! the session cannot be recovered it is cleared and a
//! [`ChangeReason::SessionExpired`] notification is emitted through the
//! store's state callback. The client never decides where the user goes next.

use crate::auth_fsm::{AuthMachineInput, ChangeReason};
use crate::refresh::RefreshCoordinator;
use crate::session::SessionStore;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
use crate::{AuthError, AuthResult};
use khotruyen_config::Config;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const UNAUTHORIZED: u16 = 401;

/// A request on its way through the client.
struct InFlightRequest {
    request: ApiRequest,
    retried: bool,
}

impl InFlightRequest {
    fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    /// Flip `retried` to true. Returns false if it already was.
    fn mark_retried(&mut self) -> bool {
        !std::mem::replace(&mut self.retried, true)
    }
}

/// HTTP client bound to one session store.
pub struct ApiClient {
    store: Arc<SessionStore>,
    transport: Arc<dyn HttpTransport>,
    refresher: RefreshCoordinator,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(
        store: Arc<SessionStore>,
        transport: Arc<dyn HttpTransport>,
        timeout: Duration,
    ) -> Self {
        let refresher = RefreshCoordinator::new(store.clone(), transport.clone(), timeout);
        Self {
            store,
            transport,
            refresher,
            timeout,
        }
    }

    /// Client talking to the configured API over `reqwest`.
    pub fn from_config(config: &Config, store: Arc<SessionStore>) -> AuthResult<Self> {
        let base_url = config.api_base_url()?;
        let timeout = config.request_timeout();
        let transport = ReqwestTransport::new(&base_url, timeout)?;
        info!(base_url = %base_url, timeout_secs = timeout.as_secs(), "API client configured");
        Ok(Self::new(store, Arc::new(transport), timeout))
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Send a request through the refresh interceptor.
    ///
    /// Non-2xx statuses other than a recoverable `401` come back as
    /// `AuthError::Status`; transport failures as `Network` or `Timeout`.
    pub async fn send(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        let mut in_flight = InFlightRequest::new(request);
        let (epoch, mut token) = self.store.bearer();
        let had_session = token.is_some();

        loop {
            let response = self.dispatch(&mut in_flight.request, token.as_deref()).await?;

            if response.status != UNAUTHORIZED {
                return if response.is_success() {
                    Ok(response)
                } else {
                    debug!(
                        method = %in_flight.request.method,
                        path = %in_flight.request.path,
                        status = response.status,
                        "Request failed"
                    );
                    Err(response.into_status_error())
                };
            }

            if !in_flight.mark_retried() {
                warn!(
                    method = %in_flight.request.method,
                    path = %in_flight.request.path,
                    "Request still unauthorized after token refresh"
                );
                return Err(AuthError::RetryExhausted);
            }

            match self.recover(token.as_deref()).await {
                Ok(fresh) => {
                    debug!(path = %in_flight.request.path, "Retrying with refreshed token");
                    token = Some(fresh);
                }
                Err(e) => {
                    if had_session && self.store.clear_session_if(epoch) {
                        warn!(error = %e, "Session expired, refresh failed");
                        self.store.advance(
                            &AuthMachineInput::RefreshFailed,
                            Some(ChangeReason::SessionExpired),
                        );
                    } else {
                        debug!(error = %e, "Refresh failed for a session that is already gone");
                    }
                    return Err(AuthError::Unauthorized(response.error_message()));
                }
            }
        }
    }

    /// Send an auth exchange (login, register, logout) as-is.
    ///
    /// No bearer token is attached and a `401` is returned to the caller
    /// instead of triggering a refresh.
    pub async fn send_auth_exchange(&self, mut request: ApiRequest) -> AuthResult<ApiResponse> {
        self.dispatch(&mut request, None).await
    }

    /// Token to retry with after a `401` sent with `stale`.
    ///
    /// If a concurrent refresh already rotated the token, use that instead of
    /// starting another exchange.
    async fn recover(&self, stale: Option<&str>) -> AuthResult<String> {
        if let Some(current) = self.store.access_token() {
            if stale != Some(current.as_str()) {
                debug!("Access token already rotated, skipping refresh");
                return Ok(current);
            }
        }
        self.refresher.refresh().await
    }

    async fn dispatch(
        &self,
        request: &mut ApiRequest,
        token: Option<&str>,
    ) -> AuthResult<ApiResponse> {
        request.with_bearer(token);
        match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    timeout_ms = millis(self.timeout),
                    "Request timed out"
                );
                Err(AuthError::Timeout)
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> AuthResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> AuthResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::put(path).json(body)?).await?.json()
    }

    pub async fn delete(&self, path: &str) -> AuthResult<()> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
