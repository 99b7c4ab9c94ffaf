// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for project room membership: authoritative join
//! confirmations, room exclusivity, leave semantics, and clearing on
//! disconnect.

use std::time::Duration;

use taskroom::config::{ClientConfig, RetryPolicy};
use taskroom::connection::ConnectionState;
use taskroom::session::SessionCoordinator;
use taskroom_harness::server::{HarnessConfig, ServerHandle, start_server};

async fn start_harness() -> (String, ServerHandle) {
    let (addr, handle, _join) = start_server("127.0.0.1:0", HarnessConfig::default())
        .await
        .expect("failed to start harness server");
    (format!("http://{addr}"), handle)
}

fn client_config(base: &str) -> ClientConfig {
    ClientConfig {
        server_url: Some(base.to_string()),
        rest_url: Some(base.to_string()),
        connect_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(100),
        },
        poll_wait: Duration::from_secs(1),
        ..Default::default()
    }
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timeout waiting for {what}");
}

async fn connected_coordinator(base: &str, token: &str) -> SessionCoordinator {
    let coordinator = SessionCoordinator::new(client_config(base));
    coordinator.set_token(Some(token));
    wait_until("coordinator connected", || {
        coordinator.connection_state() == ConnectionState::Connected
    })
    .await;
    coordinator
}

#[tokio::test]
async fn join_mirrors_the_server_confirmation() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let coordinator = connected_coordinator(&base, "alice").await;

    coordinator.join_project(&project.to_string()).await;

    wait_until("join confirmed", || coordinator.current_room().is_some()).await;
    let room = coordinator.current_room().unwrap();
    assert_eq!(room.project_id, project);
    assert_eq!(room.project_name, "Launch");
    assert_eq!(handle.room_members(project), vec!["alice".to_string()]);
}

#[tokio::test]
async fn non_numeric_project_id_is_a_silent_noop() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let coordinator = connected_coordinator(&base, "alice").await;

    coordinator.join_project("launch-board").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(coordinator.current_room().is_none());
    assert!(coordinator.last_error().is_none());
    assert!(handle.room_members(project).is_empty());
    assert_eq!(coordinator.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn membership_is_exclusive() {
    let (base, handle) = start_harness().await;
    let first = handle.seed_project("Launch");
    let second = handle.seed_project("Migration");
    let coordinator = connected_coordinator(&base, "alice").await;

    coordinator.join_project(&first.to_string()).await;
    wait_until("first join", || {
        coordinator.current_room().is_some_and(|r| r.project_id == first)
    })
    .await;

    // Joining elsewhere relies on the server evicting the old membership.
    coordinator.join_project(&second.to_string()).await;
    wait_until("second join", || {
        coordinator.current_room().is_some_and(|r| r.project_id == second)
    })
    .await;

    assert!(handle.room_members(first).is_empty());
    assert_eq!(handle.room_members(second), vec!["alice".to_string()]);
}

#[tokio::test]
async fn leave_clears_membership() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let coordinator = connected_coordinator(&base, "alice").await;

    coordinator.join_project(&project.to_string()).await;
    wait_until("joined", || coordinator.current_room().is_some()).await;

    coordinator.leave_project().await;
    wait_until("left", || coordinator.current_room().is_none()).await;
    assert!(handle.room_members(project).is_empty());

    // Leaving again with no room is a no-op.
    coordinator.leave_project().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(coordinator.current_room().is_none());
}

#[tokio::test]
async fn disconnect_clears_room_membership() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let coordinator = connected_coordinator(&base, "alice").await;

    coordinator.join_project(&project.to_string()).await;
    wait_until("joined", || coordinator.current_room().is_some()).await;

    handle.close_all_connections();

    // Room context does not survive the drop, whatever the prior state.
    wait_until("room cleared", || coordinator.current_room().is_none()).await;

    // The supervisor reconnects, but the membership stays gone until a
    // new join is requested.
    wait_until("reconnected", || {
        coordinator.connection_state() == ConnectionState::Connected
            && handle.connected_count() == 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(coordinator.current_room().is_none());
}

#[tokio::test]
async fn joining_an_unknown_project_surfaces_a_protocol_error() {
    let (base, handle) = start_harness().await;
    let coordinator = connected_coordinator(&base, "alice").await;

    coordinator.join_project("999").await;

    wait_until("error recorded", || coordinator.last_error().is_some()).await;
    let error = coordinator.last_error().unwrap();
    assert!(error.contains("999"), "unexpected error: {error}");
    // A protocol error alters neither membership nor connection state.
    assert!(coordinator.current_room().is_none());
    assert_eq!(coordinator.connection_state(), ConnectionState::Connected);
    drop(handle);
}
