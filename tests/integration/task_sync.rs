// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for task-list reconciliation across REST-confirmed
//! local mutations, optimistic toggles, and push events from other
//! sessions in the same project room.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use taskroom::config::{ClientConfig, RetryPolicy};
use taskroom::connection::ConnectionState;
use taskroom::rest::{RestClient, RestError};
use taskroom::session::SessionCoordinator;
use taskroom_harness::server::{HarnessConfig, ServerHandle, start_server};
use taskroom_proto::event::ServerEvent;
use taskroom_proto::task::{ProjectId, Task, TaskDraft, TaskId};

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

async fn member_coordinator(base: &str, token: &str, project: ProjectId) -> SessionCoordinator {
    let coordinator = SessionCoordinator::new(client_config(base));
    coordinator.set_token(Some(token));
    wait_until("coordinator connected", || {
        coordinator.connection_state() == ConnectionState::Connected
    })
    .await;
    coordinator.join_project(&project.to_string()).await;
    wait_until("room joined", || coordinator.current_room().is_some()).await;
    coordinator
}

fn draft(title: &str, project: Option<ProjectId>) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        description: format!("{title} description"),
        due_date: chrono::NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
        completed: false,
        project_id: project,
    }
}

fn remote_task(id: u64, title: &str, completed: bool, project: ProjectId) -> Task {
    Task {
        id: TaskId::new(id),
        title: title.to_string(),
        description: format!("{title} description"),
        due_date: chrono::NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
        completed,
        project_id: Some(project),
    }
}

#[tokio::test]
async fn confirmed_creations_are_newest_first() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let alice = member_coordinator(&base, "alice", project).await;

    let first = alice.create_task(&draft("First", Some(project))).await.unwrap();
    let second = alice.create_task(&draft("Second", Some(project))).await.unwrap();

    let tasks = alice.tasks();
    assert_eq!(tasks[0].id, second.id);
    assert_eq!(tasks[1].id, first.id);
    assert_eq!(alice.incomplete().len() + alice.completed().len(), tasks.len());
}

#[tokio::test]
async fn push_echo_of_own_creation_does_not_duplicate() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let alice = member_coordinator(&base, "alice", project).await;

    // The REST confirmation applies locally, and the server also pushes
    // the creation back to the whole room, including this session.
    alice.create_task(&draft("Once", Some(project))).await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(alice.tasks().len(), 1);
}

#[tokio::test]
async fn room_peers_receive_pushed_creations() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let alice = member_coordinator(&base, "alice", project).await;
    let bob = member_coordinator(&base, "bob", project).await;

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    bob.on_task_created(move |event| {
        if let ServerEvent::TaskCreated { created_by, .. } = event {
            assert_eq!(created_by, "alice");
        }
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let task = alice.create_task(&draft("Shared", Some(project))).await.unwrap();

    wait_until("bob sees the task", || bob.tasks().len() == 1).await;
    assert_eq!(bob.tasks()[0].id, task.id);
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stray_delete_for_unknown_task_is_a_noop() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let bob = member_coordinator(&base, "bob", project).await;

    handle.push_to_room(
        project,
        &ServerEvent::TaskDeleted {
            task_id: TaskId::new(7),
            task_title: "Draft spec".to_string(),
            deleted_by: "alice".to_string(),
        },
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(bob.tasks().is_empty());
    assert!(bob.last_error().is_none());
    assert_eq!(bob.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn remote_update_overwrites_optimistic_toggle() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let alice = member_coordinator(&base, "alice", project).await;

    let task = alice.create_task(&draft("Contested", Some(project))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let toggled = alice.toggle_task(task.id).await.unwrap();
    assert!(toggled);
    wait_until("toggle applied", || {
        alice.tasks().first().is_some_and(|t| t.completed)
    })
    .await;

    // A remote update for the same id arrives afterwards with
    // completed=false. Last arrival wins, unconditionally.
    handle.push_to_room(
        project,
        &ServerEvent::TaskUpdated {
            task: remote_task(task.id.get(), "Contested", false, project),
            updated_by: "bob".to_string(),
        },
    );

    wait_until("remote update wins", || {
        alice.tasks().first().is_some_and(|t| !t.completed)
    })
    .await;
}

#[tokio::test]
async fn delete_confirmed_and_echoed_is_idempotent() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let alice = member_coordinator(&base, "alice", project).await;

    let task = alice.create_task(&draft("Doomed", Some(project))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The REST confirmation removes the task locally; the push echo for
    // the same delete arrives right after and must change nothing.
    alice.delete_task(task.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(alice.tasks().is_empty());

    // And a stray duplicate event later is equally harmless.
    handle.push_to_room(
        project,
        &ServerEvent::TaskDeleted {
            task_id: task.id,
            task_title: "Doomed".to_string(),
            deleted_by: "alice".to_string(),
        },
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(alice.tasks().is_empty());
    assert!(alice.last_error().is_none());
}

#[tokio::test]
async fn update_racing_a_delete_is_dropped() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let bob = member_coordinator(&base, "bob", project).await;

    // An update for an id that was never (or no longer is) held locally
    // must not resurrect a ghost entry.
    handle.push_to_room(
        project,
        &ServerEvent::TaskUpdated {
            task: remote_task(50, "Ghost", true, project),
            updated_by: "alice".to_string(),
        },
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(bob.tasks().is_empty());
}

#[tokio::test]
async fn load_tasks_installs_the_fetched_collection() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let alice = member_coordinator(&base, "alice", project).await;

    alice.create_task(&draft("One", Some(project))).await.unwrap();
    alice.create_task(&draft("Two", Some(project))).await.unwrap();

    let carol = member_coordinator(&base, "carol", project).await;
    let fetched = carol.load_tasks(Some(project)).await.unwrap();

    assert_eq!(fetched.len(), 2);
    assert_eq!(carol.tasks().len(), 2);
    assert_eq!(carol.tasks()[0].title, "Two");
}

#[tokio::test]
async fn failed_toggle_confirmation_keeps_the_flip() {
    let (base, handle) = start_harness().await;
    let coordinator = SessionCoordinator::new(client_config(&base));
    coordinator.set_token(Some("alice"));
    wait_until("connected", || {
        coordinator.connection_state() == ConnectionState::Connected
    })
    .await;

    // Unscoped task: no room pushes interfere with this session.
    let task = coordinator.create_task(&draft("Orphaned", None)).await.unwrap();

    // Another client deletes it server-side behind our back.
    let other = RestClient::new(&base, "bob").unwrap();
    other.delete_task(task.id).await.unwrap();

    // The optimistic flip happens, the confirmation fails with 404, and
    // the flipped flag is left in place for the caller to deal with.
    let result = coordinator.toggle_task(task.id).await;
    assert!(matches!(result, Err(RestError::NotFound)));
    let local = coordinator.tasks();
    assert_eq!(local.len(), 1);
    assert!(local[0].completed, "optimistic flip is not auto-reverted");
    drop(handle);
}

#[tokio::test]
async fn presence_events_reach_callbacks() {
    let (base, handle) = start_harness().await;
    let project = handle.seed_project("Launch");
    let alice = member_coordinator(&base, "alice", project).await;

    let joins = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&joins);
    alice.on_user_joined(move |event| {
        if let ServerEvent::UserJoinedProject { user } = event {
            assert_eq!(user.username, "bob");
        }
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let _bob = member_coordinator(&base, "bob", project).await;

    wait_until("join announced", || joins.load(Ordering::SeqCst) == 1).await;
}
