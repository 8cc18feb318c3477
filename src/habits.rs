//! Pure reductions over the status log.
//!
//! Callers pick the entries (a day's worth, a week's worth); these functions
//! only decide what the entries mean. Nothing here touches the World.

use crate::calendar::day_key;
use crate::world::{StatusLogEntry, Task, TaskId};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

// ── View models ────────────────────────────────────────────────

/// One row of the daily checklist: the task, today's checkbox, and the week's "X/Y".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedTask {
    pub id: TaskId,
    pub title: String,
    pub min_freq_per_week: u8,
    pub status: bool,
    pub curr_freq: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskFrequency {
    #[serde(rename = "taskId")]
    pub task_id: TaskId,
    pub frequency: usize,
}

// ── Latest-wins ────────────────────────────────────────────────

/// `a` replaces `b` as the latest entry: later update time first, then higher id.
fn supersedes(a: &StatusLogEntry, b: &StatusLogEntry) -> bool {
    (a.update_time, a.id) > (b.update_time, b.id)
}

/// Reduce entries to the latest one per key.
pub fn latest_by<'a, K, F>(
    entries: impl IntoIterator<Item = &'a StatusLogEntry>,
    key: F,
) -> BTreeMap<K, &'a StatusLogEntry>
where
    K: Ord,
    F: Fn(&StatusLogEntry) -> K,
{
    entries.into_iter().fold(BTreeMap::new(), |mut latest, entry| {
        match latest.entry(key(entry)) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(mut slot) => {
                if supersedes(entry, slot.get()) {
                    slot.insert(entry);
                }
            }
        }
        latest
    })
}

pub fn latest_per_task<'a>(
    entries: impl IntoIterator<Item = &'a StatusLogEntry>,
) -> BTreeMap<TaskId, &'a StatusLogEntry> {
    latest_by(entries, |entry| entry.task_id)
}

/// Latest entry per (task, local calendar day).
pub fn latest_by_day<'a>(
    entries: impl IntoIterator<Item = &'a StatusLogEntry>,
    tz: Tz,
) -> BTreeMap<(TaskId, NaiveDate), &'a StatusLogEntry> {
    latest_by(entries, |entry| (entry.task_id, day_key(entry.update_time, tz)))
}

/// The checkbox state for one task on one day. No entries means unchecked.
pub fn resolve_status<'a>(entries: impl IntoIterator<Item = &'a StatusLogEntry>) -> bool {
    entries
        .into_iter()
        .reduce(|latest, entry| if supersedes(entry, latest) { entry } else { latest })
        .is_some_and(|latest| latest.status)
}

// ── Weekly frequency ───────────────────────────────────────────

/// Local days with at least one completed entry.
pub fn completed_days<'a>(
    entries: impl IntoIterator<Item = &'a StatusLogEntry>,
    tz: Tz,
) -> BTreeSet<NaiveDate> {
    entries
        .into_iter()
        .filter(|entry| entry.status)
        .map(|entry| day_key(entry.update_time, tz))
        .collect()
}

/// Distinct completed days. Several completions on one day count once.
pub fn weekly_frequency<'a>(
    entries: impl IntoIterator<Item = &'a StatusLogEntry>,
    tz: Tz,
) -> usize {
    completed_days(entries, tz).len()
}

/// `weekly_frequency` for every task that appears with a completed entry.
pub fn frequencies_by_task<'a>(
    entries: impl IntoIterator<Item = &'a StatusLogEntry>,
    tz: Tz,
) -> BTreeMap<TaskId, usize> {
    let mut days: BTreeMap<TaskId, BTreeSet<NaiveDate>> = BTreeMap::new();
    for entry in entries.into_iter().filter(|entry| entry.status) {
        days.entry(entry.task_id)
            .or_default()
            .insert(day_key(entry.update_time, tz));
    }
    days.into_iter().map(|(task_id, days)| (task_id, days.len())).collect()
}

// ── Enrichment ─────────────────────────────────────────────────

/// Join tasks with the day's entries and the week's entries, keeping task order.
pub fn enrich<'a>(
    tasks: impl IntoIterator<Item = &'a Task>,
    day_entries: &[&StatusLogEntry],
    week_entries: &[&StatusLogEntry],
    tz: Tz,
) -> Vec<EnrichedTask> {
    let statuses = latest_per_task(day_entries.iter().copied());
    let frequencies = frequencies_by_task(week_entries.iter().copied(), tz);

    tasks
        .into_iter()
        .map(|task| EnrichedTask {
            id: task.id,
            title: task.title.clone(),
            min_freq_per_week: task.min_freq_per_week,
            status: statuses.get(&task.id).is_some_and(|entry| entry.status),
            curr_freq: frequencies.get(&task.id).copied().unwrap_or(0),
        })
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn entry(id: u64, task_id: TaskId, status: bool, time: &str) -> StatusLogEntry {
        StatusLogEntry {
            id,
            task_id,
            user_id: 1,
            status,
            update_time: at(time),
        }
    }

    fn task(id: TaskId, title: &str, target: u8) -> Task {
        Task {
            id,
            title: title.into(),
            min_freq_per_week: target,
            creation_time: at("2024-01-01T00:00:00Z"),
            end_date: at("3001-01-31T00:00:00Z"),
            user_id: 1,
        }
    }

    #[test]
    fn duplicate_completions_on_one_day_count_once() {
        let log = [
            entry(1, 7, true, "2024-01-08T07:00:00Z"),
            entry(2, 7, true, "2024-01-08T21:00:00Z"),
            entry(3, 7, true, "2024-01-10T12:00:00Z"),
        ];
        assert_eq!(weekly_frequency(&log, Tz::UTC), 2);
    }

    #[test]
    fn unchecked_entries_do_not_count() {
        let log = [
            entry(1, 7, false, "2024-01-08T07:00:00Z"),
            entry(2, 7, false, "2024-01-09T07:00:00Z"),
        ];
        assert_eq!(weekly_frequency(&log, Tz::UTC), 0);
        assert_eq!(weekly_frequency(&[], Tz::UTC), 0);
    }

    #[test]
    fn distinct_days_follow_the_zone() {
        // 02:00Z and 22:00Z on the 8th are two UTC-days apart in New York.
        let log = [
            entry(1, 7, true, "2024-01-08T02:00:00Z"),
            entry(2, 7, true, "2024-01-08T22:00:00Z"),
        ];
        assert_eq!(weekly_frequency(&log, Tz::UTC), 1);
        assert_eq!(weekly_frequency(&log, chrono_tz::America::New_York), 2);
    }

    #[test]
    fn latest_entry_decides_the_status() {
        let log = [
            entry(1, 7, true, "2024-01-08T07:00:00Z"),
            entry(2, 7, false, "2024-01-08T09:00:00Z"),
        ];
        assert!(!resolve_status(&log));

        // Order of the input does not matter.
        let reversed = [log[1].clone(), log[0].clone()];
        assert!(!resolve_status(&reversed));
    }

    #[test]
    fn timestamp_ties_go_to_the_higher_id() {
        let log = [
            entry(9, 7, true, "2024-01-08T07:00:00Z"),
            entry(4, 7, false, "2024-01-08T07:00:00Z"),
        ];
        assert!(resolve_status(&log));
        assert_eq!(latest_per_task(&log)[&7].id, 9);
    }

    #[test]
    fn no_entries_means_unchecked() {
        assert!(!resolve_status(&[]));
    }

    #[test]
    fn latest_by_day_keeps_one_entry_per_task_and_day() {
        let log = [
            entry(1, 7, true, "2024-01-08T07:00:00Z"),
            entry(2, 7, false, "2024-01-08T09:00:00Z"),
            entry(3, 7, true, "2024-01-09T09:00:00Z"),
            entry(4, 8, true, "2024-01-08T06:00:00Z"),
        ];
        let latest = latest_by_day(&log, Tz::UTC);
        let jan = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();

        assert_eq!(latest.len(), 3);
        assert_eq!(latest[&(7, jan(8))].id, 2);
        assert_eq!(latest[&(7, jan(9))].id, 3);
        assert_eq!(latest[&(8, jan(8))].id, 4);
    }

    #[test]
    fn frequencies_only_list_tasks_with_completions() {
        let log = [
            entry(1, 7, true, "2024-01-08T07:00:00Z"),
            entry(2, 7, true, "2024-01-09T07:00:00Z"),
            entry(3, 8, false, "2024-01-08T07:00:00Z"),
        ];
        let frequencies = frequencies_by_task(&log, Tz::UTC);
        assert_eq!(frequencies.len(), 1);
        assert_eq!(frequencies[&7], 2);
    }

    #[test]
    fn enrich_defaults_when_nothing_was_logged() {
        let tasks = [task(1, "Hit the Gym", 4), task(2, "Read", 7)];
        let day = [entry(10, 1, true, "2024-01-10T07:00:00Z")];
        let week = [
            entry(5, 1, true, "2024-01-08T07:00:00Z"),
            entry(10, 1, true, "2024-01-10T07:00:00Z"),
        ];
        let day_refs: Vec<&StatusLogEntry> = day.iter().collect();
        let week_refs: Vec<&StatusLogEntry> = week.iter().collect();

        let rows = enrich(&tasks, &day_refs, &week_refs, Tz::UTC);
        assert_eq!(
            rows,
            vec![
                EnrichedTask {
                    id: 1,
                    title: "Hit the Gym".into(),
                    min_freq_per_week: 4,
                    status: true,
                    curr_freq: 2,
                },
                EnrichedTask {
                    id: 2,
                    title: "Read".into(),
                    min_freq_per_week: 7,
                    status: false,
                    curr_freq: 0,
                },
            ]
        );
    }
}
