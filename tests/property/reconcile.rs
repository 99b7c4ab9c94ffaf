// Test-specific lint overrides: property tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Property tests for the task-list reconciler: under any interleaving of
//! creations, updates, deletes, and toggles, ids stay unique, the
//! partitioned views cover the collection, and racy operations never
//! resurrect entries.

use proptest::prelude::*;

use taskroom::tasks::TaskList;
use taskroom_proto::task::{ProjectId, Task, TaskId};

/// One reconciler mutation, as seen from any of its three sources.
#[derive(Debug, Clone)]
enum Op {
    Create { id: u64, completed: bool },
    Update { id: u64, completed: bool },
    Delete { id: u64 },
    Toggle { id: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1..16u64, any::<bool>()).prop_map(|(id, completed)| Op::Create { id, completed }),
        (1..16u64, any::<bool>()).prop_map(|(id, completed)| Op::Update { id, completed }),
        (1..16u64).prop_map(|id| Op::Delete { id }),
        (1..16u64).prop_map(|id| Op::Toggle { id }),
    ]
}

fn task(id: u64, completed: bool) -> Task {
    Task {
        id: TaskId::new(id),
        title: format!("task {id}"),
        description: "generated".to_string(),
        due_date: chrono::NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
        completed,
        project_id: Some(ProjectId::new(1)),
    }
}

fn apply(list: &mut TaskList, op: &Op) {
    match *op {
        Op::Create { id, completed } => list.upsert_created(task(id, completed)),
        Op::Update { id, completed } => {
            let _ = list.apply_update(task(id, completed));
        }
        Op::Delete { id } => {
            let _ = list.remove(TaskId::new(id));
        }
        Op::Toggle { id } => {
            let _ = list.toggle(TaskId::new(id));
        }
    }
}

proptest! {
    /// Ids stay unique and the incomplete/completed partitions always sum
    /// to the collection, after every single step.
    #[test]
    fn ids_unique_and_partitions_cover(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let mut list = TaskList::new();
        for op in &ops {
            apply(&mut list, op);

            let snapshot = list.snapshot();
            let mut ids: Vec<u64> = snapshot.iter().map(|t| t.id.get()).collect();
            let total = ids.len();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), total, "duplicate id in collection");

            prop_assert_eq!(
                list.incomplete().len() + list.completed().len(),
                list.len()
            );
        }
    }

    /// Deleting the same id again (the stray-push case) never changes the
    /// collection.
    #[test]
    fn repeated_delete_changes_nothing(
        ops in proptest::collection::vec(op_strategy(), 0..32),
        victim in 1..16u64,
    ) {
        let mut list = TaskList::new();
        for op in &ops {
            apply(&mut list, op);
        }

        let _ = list.remove(TaskId::new(victim));
        let after_first = list.snapshot();
        let _ = list.remove(TaskId::new(victim));
        prop_assert_eq!(list.snapshot(), after_first);
        prop_assert!(!list.contains(TaskId::new(victim)));
    }

    /// Updates for ids the collection never held are dropped, not
    /// inserted.
    #[test]
    fn update_never_resurrects(
        ops in proptest::collection::vec(op_strategy(), 0..32),
        ghost in 100..200u64,
        completed in any::<bool>(),
    ) {
        let mut list = TaskList::new();
        for op in &ops {
            apply(&mut list, op);
        }

        let before = list.len();
        let applied = list.apply_update(task(ghost, completed));
        prop_assert!(!applied);
        prop_assert_eq!(list.len(), before);
        prop_assert!(!list.contains(TaskId::new(ghost)));
    }

    /// Toggling twice restores the original completion state.
    #[test]
    fn double_toggle_restores_state(
        ops in proptest::collection::vec(op_strategy(), 0..32),
        target in 1..16u64,
    ) {
        let mut list = TaskList::new();
        for op in &ops {
            apply(&mut list, op);
        }

        let id = TaskId::new(target);
        let before = list.get(id).map(|t| t.completed);
        if before.is_some() {
            let _ = list.toggle(id);
            let _ = list.toggle(id);
        }
        prop_assert_eq!(list.get(id).map(|t| t.completed), before);
    }
}
