//! Taskroom — tail a project room from the terminal.
//!
//! Connects to the sync server, joins the requested project room, and
//! prints pushed events as they arrive. Configuration via CLI flags,
//! environment variables, or config file (`~/.config/taskroom/config.toml`).
//!
//! ```bash
//! cargo run --bin taskroom -- --server-url http://127.0.0.1:9000 \
//!     --rest-url http://127.0.0.1:9000 --token "$TASKROOM_TOKEN" --project 42
//! ```

use std::time::Duration;

use clap::Parser;

use taskroom::config::{CliArgs, ClientConfig};
use taskroom::connection::ConnectionState;
use taskroom::session::SessionCoordinator;
use taskroom_proto::event::ServerEvent;

/// Poll interval for the status loop.
const TICK: Duration = Duration::from_millis(200);

/// How many consecutive disconnected ticks before giving up (the
/// supervisor has exhausted its own retry budget by then).
const EXIT_AFTER_DISCONNECTED_TICKS: u32 = 50;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level);

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let Some(token) = config.token.clone() else {
        eprintln!("no token configured (--token or TASKROOM_TOKEN)");
        std::process::exit(2);
    };
    if config.server_url.is_none() {
        eprintln!("no sync server configured (--server-url or TASKROOM_SERVER_URL)");
        std::process::exit(2);
    }

    let project = cli.project.clone();
    let coordinator = SessionCoordinator::new(config);
    register_printers(&coordinator);

    tracing::info!("taskroom starting");
    coordinator.set_token(Some(&token));

    run_tail_loop(&coordinator, project.as_deref()).await;

    coordinator.logout();
    tracing::info!("taskroom exiting");
}

/// Initialize stderr logging with an env-filter.
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Wire push-event callbacks that print to stdout.
fn register_printers(coordinator: &SessionCoordinator) {
    coordinator.on_task_created(|event| {
        if let ServerEvent::TaskCreated { task, created_by } = event {
            println!("+ task #{} \"{}\" (by {created_by})", task.id, task.title);
        }
    });
    coordinator.on_task_updated(|event| {
        if let ServerEvent::TaskUpdated { task, updated_by } = event {
            let mark = if task.completed { "done" } else { "open" };
            println!("~ task #{} \"{}\" [{mark}] (by {updated_by})", task.id, task.title);
        }
    });
    coordinator.on_task_deleted(|event| {
        if let ServerEvent::TaskDeleted {
            task_id,
            task_title,
            deleted_by,
        } = event
        {
            println!("- task #{task_id} \"{task_title}\" (by {deleted_by})");
        }
    });
    coordinator.on_user_joined(|event| {
        if let ServerEvent::UserJoinedProject { user } = event {
            println!("* {} joined the room", user.username);
        }
    });
    coordinator.on_user_left(|event| {
        if let ServerEvent::UserLeftProject { user } = event {
            println!("* {} left the room", user.username);
        }
    });
}

/// Status loop: joins the room on every (re)connect, exits once the
/// connection is gone for good.
async fn run_tail_loop(coordinator: &SessionCoordinator, project: Option<&str>) {
    let mut was_connected = false;
    let mut disconnected_ticks = 0u32;

    loop {
        tokio::time::sleep(TICK).await;
        match coordinator.connection_state() {
            ConnectionState::Connected => {
                disconnected_ticks = 0;
                if !was_connected {
                    was_connected = true;
                    println!("connected");
                    // Membership does not survive a drop; join on every
                    // transition into Connected.
                    if let Some(id) = project {
                        coordinator.join_project(id).await;
                    }
                }
            }
            ConnectionState::Connecting | ConnectionState::Errored => {
                was_connected = false;
                disconnected_ticks = 0;
            }
            ConnectionState::Disconnected => {
                was_connected = false;
                disconnected_ticks += 1;
                if disconnected_ticks >= EXIT_AFTER_DISCONNECTED_TICKS {
                    if let Some(err) = coordinator.last_error() {
                        eprintln!("connection lost: {err}");
                    } else {
                        eprintln!("connection lost");
                    }
                    return;
                }
            }
        }
    }
}
