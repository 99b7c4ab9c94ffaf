// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for session lifecycle: one connection per credential,
//! teardown on token change and logout, and discarded in-flight events.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use taskroom::config::{ClientConfig, RetryPolicy};
use taskroom::connection::ConnectionState;
use taskroom::session::SessionCoordinator;
use taskroom_harness::server::{HarnessConfig, ServerHandle, start_server};
use taskroom_proto::event::ServerEvent;
use taskroom_proto::task::{ProjectId, Task, TaskId};

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

#[tokio::test]
async fn token_change_replaces_the_connection() {
    let (base, handle) = start_harness().await;
    let coordinator = SessionCoordinator::new(client_config(&base));

    coordinator.set_token(Some("alice"));
    wait_until("alice connected", || {
        handle.connected_usernames() == vec!["alice".to_string()]
    })
    .await;

    coordinator.set_token(Some("bob"));
    // The old connection closes before/as the new one opens; the server
    // must end up with exactly one session, the new one.
    wait_until("bob is the only session", || {
        handle.connected_usernames() == vec!["bob".to_string()]
    })
    .await;
    assert_eq!(handle.connected_count(), 1);
    assert_eq!(coordinator.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn empty_token_attempts_no_connection() {
    let (base, handle) = start_harness().await;
    let coordinator = SessionCoordinator::new(client_config(&base));

    coordinator.set_token(Some(""));
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(handle.connected_count(), 0);
    assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn logout_closes_connection_and_clears_room() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let coordinator = SessionCoordinator::new(client_config(&base));

    let pushes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pushes);
    coordinator.on_task_created(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    coordinator.set_token(Some("alice"));
    wait_until("connected", || {
        coordinator.connection_state() == ConnectionState::Connected
    })
    .await;
    coordinator.join_project(&project.to_string()).await;
    wait_until("room joined", || coordinator.current_room().is_some()).await;

    coordinator.logout();

    assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
    assert!(coordinator.current_room().is_none());
    wait_until("server saw the disconnect", || handle.connected_count() == 0).await;

    // Events pushed after logout must never reach the callbacks.
    handle.push_to_room(
        project,
        &ServerEvent::TaskCreated {
            task: Task {
                id: TaskId::new(1),
                title: "after logout".to_string(),
                description: "never seen".to_string(),
                due_date: chrono::NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
                completed: false,
                project_id: Some(project),
            },
            created_by: "bob".to_string(),
        },
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pushes.load(Ordering::SeqCst), 0);
    assert!(coordinator.tasks().is_empty());
}

#[tokio::test]
async fn token_change_discards_room_membership() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let coordinator = SessionCoordinator::new(client_config(&base));

    coordinator.set_token(Some("alice"));
    wait_until("connected", || {
        coordinator.connection_state() == ConnectionState::Connected
    })
    .await;
    coordinator.join_project(&project.to_string()).await;
    wait_until("room joined", || coordinator.current_room().is_some()).await;

    coordinator.set_token(Some("bob"));
    assert!(coordinator.current_room().is_none());

    wait_until("bob connected", || {
        handle.connected_usernames() == vec!["bob".to_string()]
    })
    .await;
    // The new session starts with no membership.
    assert!(handle.room_members(project).is_empty());
}

#[tokio::test]
async fn coordinators_share_no_state() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");

    let alice = SessionCoordinator::new(client_config(&base));
    let bob = SessionCoordinator::new(client_config(&base));
    alice.set_token(Some("alice"));
    bob.set_token(Some("bob"));
    wait_until("both connected", || handle.connected_count() == 2).await;

    alice.join_project(&project.to_string()).await;
    wait_until("alice joined", || alice.current_room().is_some()).await;

    // Bob's session is unaffected by Alice's membership.
    assert!(bob.current_room().is_none());
    assert_eq!(handle.room_members(project), vec!["alice".to_string()]);

    let unused = ProjectId::new(999);
    assert!(handle.room_members(unused).is_empty());
}
