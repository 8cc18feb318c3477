use crate::error::ApiError;
use crate::persist::SaveFile;
use crate::world::{Event, Plan, UserId, World};
use chrono_tz::Tz;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

// ── Shared state ───────────────────────────────────────────────

pub struct AppState {
    pub world: RwLock<World>,
    pub save_file: SaveFile,
    /// Zone for requests that do not name one.
    pub default_tz: Tz,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(world: World, save_file: SaveFile, default_tz: Tz) -> SharedState {
        Arc::new(AppState {
            world: RwLock::new(world),
            save_file,
            default_tz,
        })
    }

    /// Read-lock the World. The World only changes inside `commit`, so a
    /// poisoned lock still guards consistent data.
    pub fn world(&self) -> RwLockReadGuard<'_, World> {
        self.world.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate, flush to the save file, then commit to the World, all under
    /// one write lock. Readers see either the old state or the new one.
    pub fn execute<C: Plan>(
        &self,
        cmd: C,
        user_id: UserId,
        context: &'static str,
    ) -> Result<C::Planned, ApiError> {
        let mut world = self.world.write().unwrap_or_else(PoisonError::into_inner);
        let planned = world.plan(cmd, user_id)?;
        let event: Event = planned.clone().into();
        self.save_file.flush(&event).map_err(ApiError::store(context))?;
        world.commit(&event);
        Ok(planned)
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::day_bounds;
    use crate::world::{CreateTask, SetStatus};
    use chrono::{DateTime, NaiveDate, Utc};
    use tempfile::TempDir;

    fn temp_state() -> (SharedState, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let save_file = SaveFile::open(dir.path().join("habits.redb")).unwrap();
        let world = save_file.load_world().unwrap();
        (AppState::new(world, save_file, Tz::UTC), dir)
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn failed_flush_leaves_the_world_alone() {
        let (state, _dir) = temp_state();
        let created = state
            .execute(
                CreateTask {
                    title: "Gym".into(),
                    min_freq_per_week: 4,
                    creation_time: Some(at("2024-01-01T00:00:00Z")),
                    end_date: None,
                },
                1,
                "Error creating task.",
            )
            .unwrap();

        state.save_file.break_logs_table().unwrap();

        let day = day_bounds(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(), Tz::UTC);
        let r = state.execute(
            SetStatus {
                task_id: created.task.id,
                status: true,
                timestamp: at("2024-01-10T08:00:00Z"),
                day,
            },
            1,
            "Unable to update task status",
        );
        match r {
            Err(ApiError::StoreFailure { context, .. }) => {
                assert_eq!(context, "Unable to update task status");
            }
            other => panic!("expected StoreFailure, got {other:?}"),
        }

        let world = state.world();
        assert!(world.logs.is_empty());
        assert_eq!(world.next_log_id, 1);
        assert_eq!(world.tasks.len(), 1);
    }

    #[test]
    fn rejected_commands_skip_the_save_file() {
        let (state, _dir) = temp_state();
        let r = state.execute(
            CreateTask {
                title: "  ".into(),
                min_freq_per_week: 4,
                creation_time: None,
                end_date: None,
            },
            1,
            "Error creating task.",
        );
        assert!(matches!(r, Err(ApiError::InvalidInput(_))));
        assert!(state.save_file.load_world().unwrap().tasks.is_empty());
    }
}
