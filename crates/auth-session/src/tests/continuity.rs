//! A refresh that straddles a logout or a new login must not resurrect or
//! overwrite the session.

use super::harness::{auth_body, token_body, MockResponse, TestHarness};
use crate::{ApiRequest, AuthError, AuthState, ChangeReason};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;

async fn wait_for_refresh_request(h: &TestHarness) {
    while h.transport.calls("/auth/refresh") == 0 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn logout_during_refresh_discards_refresh_result() {
    let h = TestHarness::logged_in("a1", "r1");
    let gate = Arc::new(Notify::new());
    h.transport.respond("/stories", 401, json!({"message": "expired"}));
    h.transport.queue(
        "/auth/refresh",
        MockResponse::Gated(gate.clone(), 200, token_body("a2", "r2")),
    );
    h.transport
        .respond("/auth/logout", 200, json!({"message": "Logged out"}));

    let request = h.client.send(ApiRequest::get("/stories"));
    let logout = async {
        wait_for_refresh_request(&h).await;
        assert_eq!(h.store.fsm_state(), AuthState::Refreshing);
        h.service.logout().await.unwrap();
        gate.notify_one();
    };
    let (result, ()) = tokio::join!(request, logout);

    assert_eq!(result.unwrap_err(), AuthError::Unauthorized("expired".into()));
    assert!(h.store.access_token().is_none());
    assert!(h.store.refresh_token().is_none());
    assert!(h.persisted().is_none());
    assert_eq!(h.store.fsm_state(), AuthState::NotLoggedIn);

    // The request is not retried with the discarded token
    assert_eq!(h.transport.calls("/stories"), 1);

    let reasons: Vec<_> = h.events().into_iter().filter_map(|e| e.reason).collect();
    assert_eq!(reasons, vec![ChangeReason::LoggedOut]);
}

#[tokio::test]
async fn login_during_refresh_keeps_new_session() {
    let h = TestHarness::logged_in("a1", "r1");
    let gate = Arc::new(Notify::new());
    h.transport.respond("/stories", 401, json!({}));
    h.transport.queue(
        "/auth/refresh",
        MockResponse::Gated(gate.clone(), 200, token_body("a2", "r2")),
    );
    h.transport.respond("/auth/login", 200, auth_body("b1", "s1"));

    let request = h.client.send(ApiRequest::get("/stories"));
    let relogin = async {
        wait_for_refresh_request(&h).await;
        h.service
            .login("u-1@khotruyen.vn", "correct horse")
            .await
            .unwrap();
        gate.notify_one();
    };
    let (result, ()) = tokio::join!(request, relogin);

    assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    assert_eq!(h.store.access_token().as_deref(), Some("b1"));
    assert_eq!(h.store.refresh_token().as_deref(), Some("s1"));
    assert_eq!(h.persisted().unwrap()["session"]["accessToken"], "b1");
    assert_eq!(h.store.fsm_state(), AuthState::LoggedIn);
}

#[tokio::test]
async fn failed_profile_check_during_refresh_logs_out_once() {
    let h = TestHarness::logged_in("a1", "r1");
    let gate = Arc::new(Notify::new());
    h.transport.respond("/stories", 401, json!({"message": "expired"}));
    h.transport.queue(
        "/auth/refresh",
        MockResponse::Gated(gate.clone(), 200, token_body("a2", "r2")),
    );
    h.transport
        .respond("/auth/me", 500, json!({"message": "Internal Server Error"}));

    let request = h.client.send(ApiRequest::get("/stories"));
    let profile = async {
        wait_for_refresh_request(&h).await;
        assert_eq!(h.store.fsm_state(), AuthState::Refreshing);
        let err = h.service.fetch_profile().await.unwrap_err();
        assert!(matches!(err, AuthError::Status { status: 500, .. }));
        gate.notify_one();
    };
    let (result, ()) = tokio::join!(request, profile);

    assert_eq!(result.unwrap_err(), AuthError::Unauthorized("expired".into()));
    assert!(!h.store.is_authenticated());
    assert!(h.persisted().is_none());
    assert_eq!(h.store.fsm_state(), AuthState::NotLoggedIn);
    assert!(!h.store.fsm_state().is_authenticated());

    let reasons: Vec<_> = h.events().into_iter().filter_map(|e| e.reason).collect();
    assert_eq!(reasons, vec![ChangeReason::SessionInvalidated]);
}

#[tokio::test]
async fn refresh_after_clear_reports_session_cleared() {
    let h = TestHarness::logged_in("a1", "r1");
    let gate = Arc::new(Notify::new());
    h.transport.queue(
        "/auth/refresh",
        MockResponse::Gated(gate.clone(), 200, token_body("a2", "r2")),
    );

    let refresh = h.client.refresher().refresh();
    let clear = async {
        wait_for_refresh_request(&h).await;
        h.store.clear_session();
        gate.notify_one();
    };
    let (result, ()) = tokio::join!(refresh, clear);

    assert_eq!(result, Err(AuthError::SessionCleared));
    assert!(h.store.access_token().is_none());
}

#[tokio::test]
async fn refresh_without_token_makes_no_network_call() {
    let h = TestHarness::new();

    let result = h.client.refresher().refresh().await;

    assert_eq!(result, Err(AuthError::NoRefreshToken));
    assert!(h.transport.requests().is_empty());
}
