//! Test harness for the session core.
//!
//! Provides:
//! - MockTransport: a scripted backend that records every dispatched request
//! - TestHarness: store, client and service wired to a MockTransport, with a
//!   shared in-memory snapshot backend and captured state notifications

use crate::transport::{ApiRequest, ApiResponse, HttpTransport, AUTHORIZATION};
use crate::{
    ApiClient, AuthError, AuthResult, AuthService, AuthStateChangedPayload, SessionStore,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use session_storage::{MemoryStorage, SnapshotStore};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

impl RecordedRequest {
    pub fn bearer(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .and_then(|h| h.strip_prefix("Bearer "))
    }
}

/// Scripted reply for one request.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum MockResponse {
    Respond(u16, Value),
    /// Sleep before responding
    DelayThen(Duration, u16, Value),
    /// Wait for the gate to open before responding
    Gated(Arc<Notify>, u16, Value),
    /// Never respond (for timeout testing)
    NeverRespond,
    /// Transport-level failure
    Fail(AuthError),
}

/// Scripted backend.
///
/// Each path has its own queue of replies. A path with an empty queue falls
/// back to its protected token, if one was set (200 for a matching bearer,
/// 401 otherwise), and to a 404 otherwise.
#[derive(Default)]
pub struct MockTransport {
    queues: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    protected: Mutex<HashMap<String, (String, Value)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, path: &str, response: MockResponse) {
        self.queues
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.queue(path, MockResponse::Respond(status, body));
    }

    /// Serve `body` on `path` only to requests bearing `token`.
    pub fn protect(&self, path: &str, token: &str, body: Value) {
        self.protected
            .lock()
            .unwrap()
            .insert(path.to_string(), (token.to_string(), body));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn calls(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    fn next_response(&self, request: &RecordedRequest) -> MockResponse {
        if let Some(response) = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }

        match self.protected.lock().unwrap().get(&request.path) {
            Some((token, body)) if request.bearer() == Some(token.as_str()) => {
                MockResponse::Respond(200, body.clone())
            }
            Some(_) => MockResponse::Respond(401, json!({"message": "Unauthorized"})),
            None => MockResponse::Respond(404, json!({"message": "Not Found"})),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: &ApiRequest) -> AuthResult<ApiResponse> {
        let recorded = RecordedRequest {
            method: request.method.to_string(),
            path: request.path.clone(),
            authorization: request.header_value(AUTHORIZATION).map(str::to_string),
            body: request.body.clone(),
        };
        let response = self.next_response(&recorded);
        self.requests.lock().unwrap().push(recorded);

        let (status, body) = match response {
            MockResponse::Respond(status, body) => (status, body),
            MockResponse::DelayThen(delay, status, body) => {
                tokio::time::sleep(delay).await;
                (status, body)
            }
            MockResponse::Gated(gate, status, body) => {
                gate.notified().await;
                (status, body)
            }
            MockResponse::NeverRespond => std::future::pending().await,
            MockResponse::Fail(err) => return Err(err),
        };
        Ok(ApiResponse::new(status, body.to_string()))
    }
}

pub fn user_json(id: &str) -> Value {
    json!({
        "id": id,
        "email": format!("{}@khotruyen.vn", id),
        "name": "Reader",
        "role": "USER",
        "avatar": null,
        "createdAt": "2024-03-01T10:00:00Z"
    })
}

pub fn auth_body(access: &str, refresh: &str) -> Value {
    json!({
        "user": user_json("u-1"),
        "accessToken": access,
        "refreshToken": refresh
    })
}

pub fn token_body(access: &str, refresh: &str) -> Value {
    json!({"accessToken": access, "refreshToken": refresh})
}

pub fn snapshot(access: &str, refresh: &str) -> Value {
    json!({
        "version": 1,
        "session": {"user": user_json("u-1"), "accessToken": access, "refreshToken": refresh}
    })
}

/// Session core wired to a mock backend.
pub struct TestHarness {
    pub transport: Arc<MockTransport>,
    pub backend: Arc<MemoryStorage>,
    pub store: Arc<SessionStore>,
    pub client: Arc<ApiClient>,
    pub service: AuthService,
    events: Arc<Mutex<Vec<AuthStateChangedPayload>>>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_timeout(TEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_backend(Arc::new(MemoryStorage::new()), timeout)
    }

    /// Harness over an existing snapshot backend, as after a restart.
    pub fn with_backend(backend: Arc<MemoryStorage>, timeout: Duration) -> Self {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(SessionStore::new(Some(SnapshotStore::new(Box::new(
            backend.clone(),
        )))));

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        store.set_state_callback(Arc::new(move |payload| sink.lock().unwrap().push(payload)));

        let client = Arc::new(ApiClient::new(store.clone(), transport.clone(), timeout));
        let service = AuthService::new(client.clone());

        Self {
            transport,
            backend,
            store,
            client,
            service,
            events,
        }
    }

    /// Harness whose store was rehydrated into a logged-in session.
    pub fn logged_in(access: &str, refresh: &str) -> Self {
        Self::logged_in_with_timeout(access, refresh, TEST_TIMEOUT)
    }

    pub fn logged_in_with_timeout(access: &str, refresh: &str, timeout: Duration) -> Self {
        let harness = Self::with_timeout(timeout);
        assert!(harness
            .store
            .rehydrate_from(Some(snapshot(access, refresh)))
            .unwrap());
        harness.clear_events();
        harness
    }

    /// Persisted snapshot as another process would read it.
    pub fn persisted(&self) -> Option<Value> {
        SnapshotStore::new(Box::new(self.backend.clone())).read()
    }

    pub fn events(&self) -> Vec<AuthStateChangedPayload> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }
}
