//! Integration tests for the session core.
//!
//! - `harness.rs`     - Mock backend and wired-up store/client/service
//! - `interceptor.rs` - Bearer attachment, 401 refresh-and-retry, retry-once
//! - `expiry.rs`      - Unrecoverable refresh: session cleared, expiry notification
//! - `single_flight.rs` - Concurrent 401s share one refresh exchange
//! - `timeout.rs`     - Dispatch timeouts never trigger a refresh
//! - `continuity.rs`  - Logout or re-login while a refresh is in flight
//! - `cancellation.rs` - Callers dropped while their refresh is in flight
//! - `rehydration.rs` - Startup restore from persisted snapshots
//! - `auth_flows.rs`  - Login, register, logout, profile fetch

mod continuity;
pub(crate) mod harness;
