//! Task-set repository contract and implementations.
//!
//! The durable format is a single named slot holding the whole task set as
//! one JSON array, re-read in full at startup and rewritten in full after
//! every mutation. There is no incremental or delta format; concurrent
//! writers from other processes are not coordinated (last writer wins on
//! the next load).

use crate::db::DbError;
use crate::model::task::{now_epoch_ms, Task, TaskId, TaskValidationError};
use log::debug;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Name of the slot holding the serialized task set.
const SLOT_KEY: &str = "tasks";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for slot persistence and decoding.
#[derive(Debug)]
pub enum RepoError {
    Validation(TaskValidationError),
    Db(DbError),
    Serialization(serde_json::Error),
    DuplicateId(TaskId),
    InvalidData(String),
    MissingRequiredTable(&'static str),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "failed to serialize task set: {err}"),
            Self::DuplicateId(id) => write!(f, "duplicate task id in slot: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted task data: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "connection is missing required table `{table}`")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; run migrations first"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskValidationError> for RepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Contract between the store and its durable slot.
///
/// Injected into the store so storage can be swapped or mocked in tests.
pub trait TaskSetRepository {
    /// Reads the full task set from the slot. An absent slot is an empty
    /// set, not an error.
    fn load(&self) -> RepoResult<Vec<Task>>;
    /// Replaces the slot contents with the full current task set.
    fn save(&mut self, tasks: &[Task]) -> RepoResult<()>;
}

/// SQLite-backed slot repository.
pub struct SqliteTaskSetRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskSetRepository<'conn> {
    /// Constructs a repository from a migrated, ready connection.
    ///
    /// # Errors
    /// Rejects connections whose schema version does not match this binary
    /// or that lack the `slots` table.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl TaskSetRepository for SqliteTaskSetRepository<'_> {
    fn load(&self) -> RepoResult<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM slots WHERE key = ?1;")?;
        let mut rows = stmt.query([SLOT_KEY])?;

        let Some(row) = rows.next()? else {
            debug!("event=slot_load module=repo status=ok tasks=0 slot=absent");
            return Ok(Vec::new());
        };
        let payload: String = row.get(0)?;
        let tasks = decode_slot(&payload)?;
        debug!("event=slot_load module=repo status=ok tasks={}", tasks.len());
        Ok(tasks)
    }

    fn save(&mut self, tasks: &[Task]) -> RepoResult<()> {
        let payload = encode_slot(tasks)?;
        self.conn.execute(
            "INSERT INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![SLOT_KEY, payload, now_epoch_ms()],
        )?;
        debug!("event=slot_save module=repo status=ok tasks={}", tasks.len());
        Ok(())
    }
}

/// In-memory slot repository for tests and ephemeral sessions.
///
/// Stores the same serialized payload a durable backend would, so decode
/// and validation behavior is identical.
#[derive(Debug, Default)]
pub struct MemoryTaskSetRepository {
    slot: Option<String>,
}

impl MemoryTaskSetRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskSetRepository for MemoryTaskSetRepository {
    fn load(&self) -> RepoResult<Vec<Task>> {
        match &self.slot {
            Some(payload) => decode_slot(payload),
            None => Ok(Vec::new()),
        }
    }

    fn save(&mut self, tasks: &[Task]) -> RepoResult<()> {
        self.slot = Some(encode_slot(tasks)?);
        Ok(())
    }
}

fn encode_slot(tasks: &[Task]) -> RepoResult<String> {
    check_set_integrity(tasks)?;
    serde_json::to_string(tasks).map_err(RepoError::Serialization)
}

fn decode_slot(payload: &str) -> RepoResult<Vec<Task>> {
    let tasks: Vec<Task> = serde_json::from_str(payload)
        .map_err(|err| RepoError::InvalidData(format!("slot payload is not a task array: {err}")))?;
    check_set_integrity(&tasks)?;
    Ok(tasks)
}

fn check_set_integrity(tasks: &[Task]) -> RepoResult<()> {
    let mut seen = HashSet::with_capacity(tasks.len());
    for task in tasks {
        task.validate()?;
        if !seen.insert(task.id) {
            return Err(RepoError::DuplicateId(task.id));
        }
    }
    Ok(())
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = crate::db::migrations::latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let slots_exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'slots'
        );",
        [],
        |row| row.get(0),
    )?;
    if slots_exists == 0 {
        return Err(RepoError::MissingRequiredTable("slots"));
    }
    Ok(())
}
