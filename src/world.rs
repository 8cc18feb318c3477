use crate::calendar::{self, Span};
use crate::habits::{self, EnrichedTask, TaskFrequency};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub type UserId = u32;
pub type TaskId = u32;
pub type LogId = u64;

/// Upper bound for a task's weekly target. Larger requests are clamped.
pub const MAX_FREQ_PER_WEEK: u8 = 7;

/// 3001-01-31T00:00:00Z, the end date of tasks created without one.
const FAR_FUTURE_SECS: i64 = 32_537_808_000;

pub fn far_future() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FAR_FUTURE_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ── Entity types ──────────────────────────────────────────────

/// A recurring habit with a weekly target.
///
/// Tasks are never edited. A task stops showing up once the queried day is
/// past `end_date`, but it and its log stay in the World.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Always within 0..=MAX_FREQ_PER_WEEK.
    pub min_freq_per_week: u8,
    pub creation_time: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub user_id: UserId,
}

impl Task {
    /// Live at some point during `span`.
    pub fn is_active_during(&self, span: &Span) -> bool {
        span.overlaps(self.creation_time, self.end_date)
    }
}

/// An immutable record that a task's checkbox was set at `update_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub id: LogId,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub status: bool,
    pub update_time: DateTime<Utc>,
}

// ── Commands ──────────────────────────────────────────────────

/// Something a client wants to happen. Validated by `World::plan`, which
/// hands back the matching event payload.
pub trait Plan {
    type Planned: Clone + Into<Event>;

    fn plan(self, world: &World, user_id: UserId) -> Result<Self::Planned, WorldError>;
}

#[derive(Debug, Clone)]
pub struct CreateTask {
    pub title: String,
    pub min_freq_per_week: i64,
    pub creation_time: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Replace whatever was logged for the task on `day` with one entry.
#[derive(Debug, Clone)]
pub struct SetStatus {
    pub task_id: TaskId,
    pub status: bool,
    pub timestamp: DateTime<Utc>,
    pub day: Span,
}

// ── Events ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCreated {
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSet {
    pub task_id: TaskId,
    /// Entries removed from the day, oldest id first.
    pub replaced: Vec<LogId>,
    pub entry: StatusLogEntry,
}

/// What actually happened. Flushed to the save file, then committed to the World.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TaskCreated(TaskCreated),
    StatusSet(StatusSet),
}

impl From<TaskCreated> for Event {
    fn from(e: TaskCreated) -> Self {
        Event::TaskCreated(e)
    }
}

impl From<StatusSet> for Event {
    fn from(e: StatusSet) -> Self {
        Event::StatusSet(e)
    }
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("Provide all required fields.")]
    EmptyTitle,
    #[error("Task {0} not found")]
    TaskNotFound(TaskId),
    #[error("Task {0} does not belong to this user")]
    NotTaskOwner(TaskId),
    #[error("Timestamp falls outside the requested day")]
    TimestampOutsideDay,
    #[error("End date is before the creation time")]
    EndsBeforeCreation,
    #[error("No task ids left")]
    TaskIdsExhausted,
    #[error("No status log ids left")]
    LogIdsExhausted,
}

// ── The World ──────────────────────────────────────────────────

/// All tasks and status logs, in memory. Loaded from redb on boot.
///
/// Mutations are two-phase: `plan` validates a command and returns the event
/// without touching state, `commit` applies an Event. The server flushes the
/// Event to disk in between.
#[derive(Debug, Clone)]
pub struct World {
    pub tasks: BTreeMap<TaskId, Task>,
    pub logs: BTreeMap<LogId, StatusLogEntry>,
    pub next_task_id: TaskId,
    pub next_log_id: LogId,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl Plan for CreateTask {
    type Planned = TaskCreated;

    fn plan(self, world: &World, user_id: UserId) -> Result<TaskCreated, WorldError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(WorldError::EmptyTitle);
        }

        let creation_time = self.creation_time.unwrap_or_else(Utc::now);
        let end_date = self.end_date.unwrap_or_else(far_future);
        if end_date < creation_time {
            return Err(WorldError::EndsBeforeCreation);
        }

        // The id after this one must exist too, or the counter would wrap.
        let id = world.next_task_id;
        id.checked_add(1).ok_or(WorldError::TaskIdsExhausted)?;

        Ok(TaskCreated {
            task: Task {
                id,
                title: title.to_string(),
                min_freq_per_week: clamp_frequency(self.min_freq_per_week),
                creation_time,
                end_date,
                user_id,
            },
        })
    }
}

impl Plan for SetStatus {
    type Planned = StatusSet;

    fn plan(self, world: &World, user_id: UserId) -> Result<StatusSet, WorldError> {
        let SetStatus { task_id, status, timestamp, day } = self;

        let task = world.tasks.get(&task_id)
            .ok_or(WorldError::TaskNotFound(task_id))?;
        if task.user_id != user_id {
            return Err(WorldError::NotTaskOwner(task_id));
        }
        if !day.contains(timestamp) {
            return Err(WorldError::TimestampOutsideDay);
        }

        let id = world.next_log_id;
        id.checked_add(1).ok_or(WorldError::LogIdsExhausted)?;

        // Not scoped by user: a day holds one entry per task.
        let replaced = world.task_logs_in(task_id, &day)
            .into_iter()
            .map(|entry| entry.id)
            .collect();

        Ok(StatusSet {
            task_id,
            replaced,
            entry: StatusLogEntry {
                id,
                task_id,
                user_id,
                status,
                update_time: timestamp,
            },
        })
    }
}

impl World {
    pub fn new() -> Self {
        World {
            tasks: BTreeMap::new(),
            logs: BTreeMap::new(),
            next_task_id: 1,
            next_log_id: 1,
        }
    }

    /// Validate `cmd` on behalf of `user_id` and describe its effect.
    pub fn plan<C: Plan>(&self, cmd: C, user_id: UserId) -> Result<C::Planned, WorldError> {
        cmd.plan(self, user_id)
    }

    /// Apply a planned event. Removal and insertion happen in one step.
    pub fn commit(&mut self, event: &Event) {
        match event {
            Event::TaskCreated(TaskCreated { task }) => {
                self.next_task_id = self.next_task_id.max(task.id.saturating_add(1));
                self.tasks.insert(task.id, task.clone());
            }
            Event::StatusSet(StatusSet { replaced, entry, .. }) => {
                for id in replaced {
                    self.logs.remove(id);
                }
                self.next_log_id = self.next_log_id.max(entry.id.saturating_add(1));
                self.logs.insert(entry.id, entry.clone());
            }
        }
    }

    // ── Queries ────────────────────────────────────────────────

    /// The user's tasks that are live at some point during `day`, oldest first.
    pub fn active_tasks(&self, user_id: UserId, day: &Span) -> Vec<&Task> {
        self.tasks.values()
            .filter(|t| t.user_id == user_id && t.is_active_during(day))
            .collect()
    }

    pub fn task_logs_in(&self, task_id: TaskId, span: &Span) -> Vec<&StatusLogEntry> {
        self.logs.values()
            .filter(|e| e.task_id == task_id && span.contains(e.update_time))
            .collect()
    }

    pub fn user_logs_in(&self, user_id: UserId, span: &Span) -> Vec<&StatusLogEntry> {
        self.logs.values()
            .filter(|e| e.user_id == user_id && span.contains(e.update_time))
            .collect()
    }

    /// The task's checkbox on `day`: its latest entry, or unchecked.
    pub fn resolve_status(&self, task_id: TaskId, day: &Span) -> bool {
        habits::resolve_status(self.task_logs_in(task_id, day))
    }

    /// Distinct local days in `week` on which the task was checked.
    pub fn weekly_frequency(&self, task_id: TaskId, week: &Span, tz: Tz) -> usize {
        habits::weekly_frequency(self.task_logs_in(task_id, week), tz)
    }

    /// The daily checklist for `day`.
    pub fn enriched_tasks_for_day(&self, user_id: UserId, day: NaiveDate, tz: Tz) -> Vec<EnrichedTask> {
        let day_span = calendar::day_bounds(day, tz);
        let week_span = calendar::week_bounds(day, tz);

        habits::enrich(
            self.active_tasks(user_id, &day_span),
            &self.user_logs_in(user_id, &day_span),
            &self.user_logs_in(user_id, &week_span),
            tz,
        )
    }

    /// Latest entry per task logged by the user on `day`.
    pub fn daily_statuses(&self, user_id: UserId, day: NaiveDate, tz: Tz) -> Vec<&StatusLogEntry> {
        let day_span = calendar::day_bounds(day, tz);
        habits::latest_by_day(self.user_logs_in(user_id, &day_span), tz)
            .into_values()
            .collect()
    }

    /// Weekly frequency for each of the user's tasks checked during the week of `day`.
    pub fn weekly_frequencies(&self, user_id: UserId, day: NaiveDate, tz: Tz) -> Vec<TaskFrequency> {
        let week_span = calendar::week_bounds(day, tz);
        habits::frequencies_by_task(self.user_logs_in(user_id, &week_span), tz)
            .into_iter()
            .map(|(task_id, frequency)| TaskFrequency { task_id, frequency })
            .collect()
    }
}

fn clamp_frequency(requested: i64) -> u8 {
    // Fits in u8 after the clamp.
    requested.clamp(0, i64::from(MAX_FREQ_PER_WEEK)) as u8
}

// ── Tests ──────────────────────────────────────────────────────
