// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for the long-polling fallback: negotiation when the
//! WebSocket endpoint is unavailable, and full room/push behavior over
//! the polling transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use taskroom::config::{ClientConfig, RetryPolicy};
use taskroom::connection::{ConnectionConfig, ConnectionManager, ConnectionState, Signal};
use taskroom::session::SessionCoordinator;
use taskroom::transport::TransportKind;
use taskroom_harness::server::{HarnessConfig, ServerHandle, start_server};
use taskroom_proto::event::ServerEvent;
use taskroom_proto::task::{Task, TaskId};

/// Harness with the WebSocket endpoint turned off and a short poll hold.
fn polling_only() -> HarnessConfig {
    HarnessConfig {
        websocket_enabled: false,
        poll_wait: Duration::from_millis(500),
    }
}

async fn start_harness() -> (String, ServerHandle) {
    let (addr, handle, _join) = start_server("127.0.0.1:0", polling_only())
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
        poll_wait: Duration::from_millis(500),
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
async fn negotiation_lands_on_polling() {
    let (base, _handle) = start_harness().await;
    let (mgr, mut rx) = ConnectionManager::connect(
        "alice",
        ConnectionConfig {
            server_url: base,
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(100),
            },
            channel_capacity: 64,
            poll_wait: Duration::from_millis(500),
        },
    )
    .unwrap();

    match rx.recv().await {
        Some(Signal::Up { kind }) => assert_eq!(kind, TransportKind::Polling),
        other => panic!("expected Up, got {other:?}"),
    }
    assert_eq!(mgr.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn rooms_work_over_polling() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let coordinator = SessionCoordinator::new(client_config(&base));

    coordinator.set_token(Some("alice"));
    wait_until("connected", || {
        coordinator.connection_state() == ConnectionState::Connected
    })
    .await;

    coordinator.join_project(&project.to_string()).await;
    wait_until("join confirmed over polling", || {
        coordinator.current_room().is_some()
    })
    .await;
    assert_eq!(coordinator.current_room().unwrap().project_name, "Launch");
    assert_eq!(handle.room_members(project), vec!["alice".to_string()]);
}

#[tokio::test]
async fn pushes_arrive_over_polling() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let coordinator = SessionCoordinator::new(client_config(&base));

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    coordinator.on_task_created(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    coordinator.set_token(Some("alice"));
    wait_until("connected", || {
        coordinator.connection_state() == ConnectionState::Connected
    })
    .await;
    coordinator.join_project(&project.to_string()).await;
    wait_until("joined", || coordinator.current_room().is_some()).await;

    handle.push_to_room(
        project,
        &ServerEvent::TaskCreated {
            task: Task {
                id: TaskId::new(1),
                title: "Polled".to_string(),
                description: "arrived via long-poll".to_string(),
                due_date: chrono::NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
                completed: false,
                project_id: Some(project),
            },
            created_by: "bob".to_string(),
        },
    );

    wait_until("push delivered", || coordinator.tasks().len() == 1).await;
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_close_is_detected_over_polling() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let coordinator = SessionCoordinator::new(client_config(&base));

    coordinator.set_token(Some("alice"));
    wait_until("connected", || {
        coordinator.connection_state() == ConnectionState::Connected
    })
    .await;
    coordinator.join_project(&project.to_string()).await;
    wait_until("joined", || coordinator.current_room().is_some()).await;

    handle.close_all_connections();

    // The poller notices the close on its next drain; the room is
    // cleared and the client eventually reconnects.
    wait_until("room cleared", || coordinator.current_room().is_none()).await;
    wait_until("reconnected", || {
        coordinator.connection_state() == ConnectionState::Connected
    })
    .await;
}
