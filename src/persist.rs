//! World ↔ redb persistence.
//!
//! redb is a save file: loaded on boot, flushed once per event.
//! Never queried at runtime; World is the runtime truth.

use crate::world::{
    far_future, CreateTask, Event, LogId, StatusLogEntry, StatusSet, Task, TaskCreated, TaskId, UserId,
    World,
};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const HABIT_TASKS: TableDefinition<TaskId, &[u8]> = TableDefinition::new("habit_tasks");
const HABIT_LOGS: TableDefinition<LogId, &[u8]> = TableDefinition::new("habit_logs");
const HABIT_META: TableDefinition<&str, u64> = TableDefinition::new("habit_meta");

const NEXT_TASK_ID: &str = "next_task_id";
const NEXT_LOG_ID: &str = "next_log_id";

/// 1990-02-01T00:00:00Z, the start date of the demo habits.
const DEMO_START_SECS: i64 = 633_830_400;

/// Thin handle to the redb file. Cloneable (Arc inside).
#[derive(Clone)]
pub struct SaveFile {
    db: Arc<Database>,
}

impl SaveFile {
    /// Open (or create) the save file at the given path.
    /// Creates tables if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SaveFileError> {
        let db = Database::create(path)?;

        // Ensure tables exist
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(HABIT_TASKS)?;
            let _ = txn.open_table(HABIT_LOGS)?;
            let _ = txn.open_table(HABIT_META)?;
        }
        txn.commit()?;

        Ok(SaveFile { db: Arc::new(db) })
    }

    /// Load the entire World from disk. Called once at boot.
    pub fn load_world(&self) -> Result<World, SaveFileError> {
        let mut world = World::new();
        let txn = self.db.begin_read()?;

        let tasks_table = txn.open_table(HABIT_TASKS)?;
        for entry in tasks_table.iter()? {
            let (_, value) = entry?;
            let task: Task = postcard::from_bytes(value.value())
                .map_err(|e| SaveFileError::Decode(e.to_string()))?;
            world.tasks.insert(task.id, task);
        }

        let logs_table = txn.open_table(HABIT_LOGS)?;
        for entry in logs_table.iter()? {
            let (_, value) = entry?;
            let log: StatusLogEntry = postcard::from_bytes(value.value())
                .map_err(|e| SaveFileError::Decode(e.to_string()))?;
            world.logs.insert(log.id, log);
        }

        // Counters never go backwards, even if the newest rows were replaced.
        let meta_table = txn.open_table(HABIT_META)?;
        let stored_task_id = meta_table.get(NEXT_TASK_ID)?.map(|v| v.value()).unwrap_or(1);
        let stored_log_id = meta_table.get(NEXT_LOG_ID)?.map(|v| v.value()).unwrap_or(1);

        let max_task_id = world.tasks.keys().next_back().map_or(0, |id| *id);
        let max_log_id = world.logs.keys().next_back().map_or(0, |id| *id);
        world.next_task_id = TaskId::try_from(stored_task_id)
            .map_err(|_| SaveFileError::Decode(format!("{NEXT_TASK_ID} out of range: {stored_task_id}")))?
            .max(max_task_id.saturating_add(1));
        world.next_log_id = stored_log_id.max(max_log_id.saturating_add(1));

        Ok(world)
    }

    /// Write a single event to disk in one transaction.
    /// A status change removes the day's old entries and inserts the new one
    /// atomically, so a crash can never leave the day empty.
    pub fn flush(&self, event: &Event) -> Result<(), SaveFileError> {
        let txn = self.db.begin_write()?;
        {
            let mut meta = txn.open_table(HABIT_META)?;

            match event {
                Event::TaskCreated(TaskCreated { task }) => {
                    let mut tasks = txn.open_table(HABIT_TASKS)?;
                    let bytes = postcard::to_allocvec(task)
                        .map_err(|e| SaveFileError::Encode(e.to_string()))?;
                    tasks.insert(task.id, bytes.as_slice())?;
                    meta.insert(NEXT_TASK_ID, u64::from(task.id) + 1)?;
                }

                Event::StatusSet(StatusSet { replaced, entry, .. }) => {
                    let mut logs = txn.open_table(HABIT_LOGS)?;
                    for id in replaced {
                        logs.remove(*id)?;
                    }
                    let bytes = postcard::to_allocvec(entry)
                        .map_err(|e| SaveFileError::Encode(e.to_string()))?;
                    logs.insert(entry.id, bytes.as_slice())?;
                    meta.insert(NEXT_LOG_ID, entry.id.saturating_add(1))?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Seed the demo habits for `user_id` if the World has no tasks.
    /// Returns how many were created.
    pub fn ensure_demo_tasks(&self, world: &mut World, user_id: UserId) -> Result<usize, SaveFileError> {
        if !world.tasks.is_empty() {
            return Ok(0);
        }

        let start = DateTime::<Utc>::from_timestamp(DEMO_START_SECS, 0);
        let defaults = [("Hit the Gym", 4), ("DSA 5x Ques", 6)];

        for (title, min_freq_per_week) in defaults {
            let cmd = CreateTask {
                title: title.to_string(),
                min_freq_per_week,
                creation_time: start,
                end_date: Some(far_future()),
            };
            let event: Event = world.plan(cmd, user_id)
                .map_err(|e| SaveFileError::Seed(e.to_string()))?
                .into();
            self.flush(&event)?;
            world.commit(&event);
        }

        Ok(defaults.len())
    }
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SaveFileError {
    #[error("redb: {0}")]
    Redb(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("encode: {0}")]
    Encode(String),
    #[error("seed: {0}")]
    Seed(String),
}

// redb 2.x has many error types. Blanket them all into SaveFileError::Redb.
macro_rules! from_redb {
    ($($t:ty),*) => {
        $(impl From<$t> for SaveFileError {
            fn from(e: $t) -> Self { SaveFileError::Redb(e.to_string()) }
        })*
    };
}

from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError
);

// ── Tests ──────────────────────────────────────────────────────


// Swaps the logs table for one of the wrong type, so the next status flush fails.
#[cfg(test)]
impl SaveFile {
    pub(crate) fn break_logs_table(&self) -> Result<(), SaveFileError> {
        const WRONG_LOGS: TableDefinition<&str, &str> = TableDefinition::new("habit_logs");

        let txn = self.db.begin_write()?;
        txn.delete_table(HABIT_LOGS)?;
        {
            let _ = txn.open_table(WRONG_LOGS)?;
        }
        txn.commit()?;
        Ok(())
    }
}
