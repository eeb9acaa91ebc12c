use std::cell::RefCell;
use std::rc::Rc;
use taskdeck_core::db::open_db_in_memory;
use taskdeck_core::{
    ChangeKind, MemoryTaskSetRepository, NewTask, RepoError, RepoResult, SqliteTaskSetRepository,
    StoreError, StoreWarning, Task, TaskPatch, TaskSetRepository, TaskStatus, TaskStore,
    TimestampPolicy,
};
use uuid::Uuid;

fn open_memory_store() -> TaskStore<MemoryTaskSetRepository> {
    TaskStore::open(MemoryTaskSetRepository::new()).unwrap()
}

fn draft(title: &str, status: TaskStatus) -> NewTask {
    NewTask {
        title: title.to_string(),
        status: Some(status),
        ..NewTask::default()
    }
}

#[test]
fn operations_before_initialize_are_rejected() {
    let mut store = TaskStore::new(MemoryTaskSetRepository::new());

    assert!(matches!(
        store.create(NewTask::titled("early")),
        Err(StoreError::NotInitialized)
    ));
    assert!(matches!(store.list(), Err(StoreError::NotInitialized)));
    assert!(matches!(store.stats(), Err(StoreError::NotInitialized)));
    assert!(matches!(
        store.delete(Uuid::new_v4()),
        Err(StoreError::NotInitialized)
    ));

    store.initialize().unwrap();
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn initialize_is_idempotent() {
    let mut store = open_memory_store();
    store.create(NewTask::titled("kept")).unwrap();

    store.initialize().unwrap();
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn create_assigns_fresh_identity_and_equal_timestamps() {
    let mut store = open_memory_store();

    let first = store.create(NewTask::titled("first")).unwrap().value;
    let second = store.create(NewTask::titled("second")).unwrap().value;

    assert_ne!(first.id, second.id);
    assert_eq!(first.created_at, first.updated_at);
    assert_eq!(second.created_at, second.updated_at);

    let titles: Vec<_> = store
        .list()
        .unwrap()
        .iter()
        .map(|task| task.title.clone())
        .collect();
    assert_eq!(titles, vec!["first", "second"]);
}

#[test]
fn create_rejects_invalid_drafts() {
    let mut store = open_memory_store();

    assert!(matches!(
        store.create(NewTask::titled("  ")),
        Err(StoreError::Validation(_))
    ));

    let bad_date = NewTask {
        title: "dated".to_string(),
        due_date: Some("2025-13-40".to_string()),
        ..NewTask::default()
    };
    assert!(matches!(
        store.create(bad_date),
        Err(StoreError::Validation(_))
    ));
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn write_report_scenario() {
    let mut store = open_memory_store();

    let task = store.create(NewTask::titled("Write report")).unwrap().value;
    assert_eq!(task.status, TaskStatus::Ongoing);
    assert!(task.started_at.is_some());
    assert_eq!(task.completed_at, None);

    let completed = store
        .update(task.id, TaskPatch::status(TaskStatus::Completed))
        .unwrap()
        .value;
    assert!(completed.completed_at.is_some());
    assert_eq!(completed.started_at, task.started_at);

    let done = store.list_by_status(TaskStatus::Completed).unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].id, task.id);
}

#[test]
fn update_refreshes_updated_at_and_keeps_created_at() {
    let mut store = open_memory_store();
    let task = store.create(NewTask::titled("evolving")).unwrap().value;

    let patch = TaskPatch {
        description: Some("with detail".to_string()),
        ..TaskPatch::default()
    };
    let updated = store.update(task.id, patch).unwrap().value;

    assert_eq!(updated.created_at, task.created_at);
    assert!(updated.updated_at >= task.updated_at);
    assert_eq!(updated.description.as_deref(), Some("with detail"));
    assert_eq!(updated.title, "evolving");
}

#[test]
fn update_validation_failure_leaves_stored_task_unchanged() {
    let mut store = open_memory_store();
    let task = store.create(NewTask::titled("stable")).unwrap().value;

    let patch = TaskPatch {
        title: Some("   ".to_string()),
        ..TaskPatch::default()
    };
    assert!(matches!(
        store.update(task.id, patch),
        Err(StoreError::Validation(_))
    ));

    assert_eq!(store.get(task.id).unwrap(), task);
}

#[test]
fn operations_on_unknown_id_fail_with_not_found() {
    let mut store = open_memory_store();
    let unknown = Uuid::new_v4();

    assert!(matches!(
        store.update(unknown, TaskPatch::default()),
        Err(StoreError::NotFound(id)) if id == unknown
    ));
    assert!(matches!(
        store.delete(unknown),
        Err(StoreError::NotFound(id)) if id == unknown
    ));
    assert!(matches!(
        store.get(unknown),
        Err(StoreError::NotFound(id)) if id == unknown
    ));
    assert!(matches!(
        store.mark_completed(unknown),
        Err(StoreError::NotFound(id)) if id == unknown
    ));
}

#[test]
fn delete_removes_exactly_one_task() {
    let mut store = open_memory_store();
    let first = store.create(NewTask::titled("first")).unwrap().value;
    let second = store.create(NewTask::titled("second")).unwrap().value;

    store.delete(first.id).unwrap();

    let remaining = store.list().unwrap().to_vec();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second.id);

    assert!(matches!(
        store.update(first.id, TaskPatch::default()),
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.delete(first.id),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn mark_completed_records_completed_at_once() {
    let mut store = open_memory_store();
    let task = store
        .create(draft("finish me", TaskStatus::Waiting))
        .unwrap()
        .value;

    let first = store.mark_completed(task.id).unwrap().value;
    assert_eq!(first.status, TaskStatus::Completed);
    assert!(first.completed_at.is_some());

    let second = store.mark_completed(task.id).unwrap().value;
    assert_eq!(second.completed_at, first.completed_at);
    assert!(second.updated_at >= first.updated_at);
}

#[test]
fn backward_transition_preserves_timestamps_by_default() {
    let mut store = open_memory_store();
    let task = store.create(NewTask::titled("rollback")).unwrap().value;
    let completed = store.mark_completed(task.id).unwrap().value;

    let reopened = store
        .update(task.id, TaskPatch::status(TaskStatus::Ongoing))
        .unwrap()
        .value;
    assert_eq!(reopened.status, TaskStatus::Ongoing);
    assert_eq!(reopened.completed_at, completed.completed_at);
    assert_eq!(reopened.started_at, completed.started_at);
}

#[test]
fn reset_policy_store_clears_completed_at_on_reopen() {
    let mut store =
        TaskStore::with_policy(MemoryTaskSetRepository::new(), TimestampPolicy::Reset);
    store.initialize().unwrap();

    let task = store.create(NewTask::titled("again")).unwrap().value;
    store.mark_completed(task.id).unwrap();

    let reopened = store
        .update(task.id, TaskPatch::status(TaskStatus::Ongoing))
        .unwrap()
        .value;
    assert_eq!(reopened.completed_at, None);
    assert_eq!(reopened.started_at, task.started_at);
}

#[test]
fn stats_on_empty_set_has_zero_completion_rate() {
    let store = open_memory_store();
    let stats = store.stats().unwrap();

    assert_eq!(stats.total, 0);
    assert_eq!(stats.completion_rate, 0);
}

#[test]
fn stats_counts_per_status_and_rounds_completion_rate() {
    let mut store = open_memory_store();
    store.create(draft("a", TaskStatus::Waiting)).unwrap();
    store.create(draft("b", TaskStatus::Ongoing)).unwrap();
    store.create(draft("c", TaskStatus::Completed)).unwrap();
    store.create(draft("d", TaskStatus::Completed)).unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.waiting, 1);
    assert_eq!(stats.ongoing, 1);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.completion_rate, 50);

    store.create(draft("e", TaskStatus::Waiting)).unwrap();
    store.create(draft("f", TaskStatus::Waiting)).unwrap();
    // 2 completed of 6 -> 33.33 rounds to 33.
    assert_eq!(store.stats().unwrap().completion_rate, 33);
}

#[test]
fn list_by_status_preserves_relative_order() {
    let mut store = open_memory_store();
    let a = store.create(draft("a", TaskStatus::Waiting)).unwrap().value;
    store.create(draft("b", TaskStatus::Ongoing)).unwrap();
    let c = store.create(draft("c", TaskStatus::Waiting)).unwrap().value;

    let waiting = store.list_by_status(TaskStatus::Waiting).unwrap();
    let ids: Vec<_> = waiting.iter().map(|task| task.id).collect();
    assert_eq!(ids, vec![a.id, c.id]);
}

#[test]
fn reload_reproduces_an_equal_set() {
    let conn = open_db_in_memory().unwrap();

    let snapshot = {
        let repo = SqliteTaskSetRepository::try_new(&conn).unwrap();
        let mut store = TaskStore::open(repo).unwrap();
        store
            .create(NewTask {
                title: "persisted".to_string(),
                description: Some("survives restart".to_string()),
                due_date: Some("2025-04-01".to_string()),
                status: Some(TaskStatus::Waiting),
            })
            .unwrap();
        store.create(NewTask::titled("second")).unwrap();
        let done = store.create(draft("third", TaskStatus::Completed)).unwrap().value;
        store.mark_completed(done.id).unwrap();
        store.list().unwrap().to_vec()
    };

    let repo = SqliteTaskSetRepository::try_new(&conn).unwrap();
    let store = TaskStore::open(repo).unwrap();
    assert_eq!(store.list().unwrap(), snapshot.as_slice());
}

struct UnavailableSlot;

impl TaskSetRepository for UnavailableSlot {
    fn load(&self) -> RepoResult<Vec<Task>> {
        Ok(Vec::new())
    }

    fn save(&mut self, _tasks: &[Task]) -> RepoResult<()> {
        Err(RepoError::InvalidData("slot unavailable".to_string()))
    }
}

#[test]
fn persistence_failure_degrades_to_a_warning() {
    let mut store = TaskStore::open(UnavailableSlot).unwrap();

    let commit = store.create(NewTask::titled("kept in memory")).unwrap();
    assert!(matches!(
        commit.warning,
        Some(StoreWarning::PersistenceWriteFailed(_))
    ));

    // The in-memory set stays authoritative for the session.
    assert_eq!(store.list().unwrap().len(), 1);
    let stats = store.stats().unwrap();
    assert_eq!(stats.total, 1);
}

#[test]
fn successful_commits_carry_no_warning() {
    let mut store = open_memory_store();
    let commit = store.create(NewTask::titled("durable")).unwrap();
    assert_eq!(commit.warning, None);
}

#[test]
fn subscribers_observe_every_mutation_until_unsubscribed() {
    let mut store = open_memory_store();
    let seen: Rc<RefCell<Vec<ChangeKind>>> = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&seen);
    let subscription = store.subscribe(move |event| sink.borrow_mut().push(event.kind));

    let task = store.create(NewTask::titled("watched")).unwrap().value;
    store.mark_completed(task.id).unwrap();
    store.delete(task.id).unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![ChangeKind::Created, ChangeKind::Updated, ChangeKind::Deleted]
    );

    assert!(store.unsubscribe(subscription));
    store.create(NewTask::titled("unwatched")).unwrap();
    assert_eq!(seen.borrow().len(), 3);
    assert!(!store.unsubscribe(subscription));
}

#[test]
fn failed_operations_do_not_notify_subscribers() {
    let mut store = open_memory_store();
    let seen: Rc<RefCell<Vec<ChangeKind>>> = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&seen);
    store.subscribe(move |event| sink.borrow_mut().push(event.kind));

    assert!(store.create(NewTask::titled("  ")).is_err());
    assert!(store.delete(Uuid::new_v4()).is_err());
    assert!(seen.borrow().is_empty());
}
