use crate::calendar::{self, DateInput};
use crate::error::ApiError;
use crate::habits::{EnrichedTask, TaskFrequency};
use crate::state::SharedState;
use crate::world::{CreateTask, LogId, SetStatus, StatusLogEntry, StatusSet, TaskId, UserId};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

// ── Request types ──────────────────────────────────────────────

/// `?date=…&id=…&tz=…`, shared by every read endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct DayQuery {
    pub date: Option<String>,
    pub id: Option<String>,
    pub tz: Option<String>,
}

/// A numeric id that may arrive as a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(serde_json::Number),
    Text(String),
}

impl RawId {
    fn parse<T: TryFrom<u64> + std::str::FromStr>(&self, message: &str) -> Result<T, ApiError> {
        let parsed = match self {
            RawId::Number(n) => n.as_u64().and_then(|v| T::try_from(v).ok()),
            RawId::Text(s) => s.trim().parse().ok(),
        };
        parsed.ok_or_else(|| ApiError::invalid(message))
    }
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<RawId>,
    #[serde(rename = "taskId")]
    pub task_id: Option<RawId>,
    pub new_status: Option<bool>,
    pub curr_date: Option<String>,
    pub tz: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<RawId>,
    pub title: Option<String>,
    pub min_freq_per_week: Option<i64>,
    pub creation_time: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub tz: Option<String>,
}

// ── Response types ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct TasksResponse {
    pub success: bool,
    pub tasks: Vec<EnrichedTask>,
}

#[derive(Debug, Serialize)]
pub struct LogRow {
    pub id: LogId,
    #[serde(rename = "taskId")]
    pub task_id: TaskId,
    pub curr_status: bool,
    pub update_time: DateTime<Utc>,
}

impl From<&StatusLogEntry> for LogRow {
    fn from(entry: &StatusLogEntry) -> Self {
        LogRow {
            id: entry.id,
            task_id: entry.task_id,
            curr_status: entry.status,
            update_time: entry.update_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub logs: Vec<LogRow>,
    pub date: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyResponse {
    pub success: bool,
    pub freq: Vec<TaskFrequency>,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub target_date: String,
}

#[derive(Debug, Serialize)]
pub struct NewLog {
    pub id: LogId,
    #[serde(rename = "taskId")]
    pub task_id: TaskId,
    pub status: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStatusResponse {
    pub success: bool,
    pub deleted_count: usize,
    pub new_log: NewLog,
}

#[derive(Debug, Serialize)]
pub struct CreateTaskResponse {
    pub success: bool,
    pub message: String,
    pub id: TaskId,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub tasks: usize,
    pub logs: usize,
}

// ── Validation helpers ─────────────────────────────────────────

struct DayRequest {
    user_id: UserId,
    date: DateInput,
    raw_date: String,
    tz: Tz,
}

impl DayQuery {
    fn validate(self, default_tz: Tz) -> Result<DayRequest, ApiError> {
        let raw_date = non_blank(self.date)
            .ok_or_else(|| ApiError::invalid("Date parameter is required"))?;
        let raw_id = non_blank(self.id)
            .ok_or_else(|| ApiError::invalid("User ID parameter is required"))?;
        let tz = resolve_tz(self.tz.as_deref(), default_tz)?;

        let date = DateInput::parse(&raw_date, tz)
            .map_err(|_| ApiError::invalid("Invalid date format"))?;
        let user_id = raw_id
            .trim()
            .parse()
            .map_err(|_| ApiError::invalid("User ID must be a valid number"))?;

        Ok(DayRequest { user_id, date, raw_date, tz })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn resolve_tz(raw: Option<&str>, default_tz: Tz) -> Result<Tz, ApiError> {
    match raw {
        Some(name) if !name.trim().is_empty() => Ok(calendar::parse_timezone(name)?),
        _ => Ok(default_tz),
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid(rejection.body_text()))
}

// ── Handlers ───────────────────────────────────────────────────

// GET /api/health
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let world = state.world();
    Json(HealthResponse {
        status: "ok",
        tasks: world.tasks.len(),
        logs: world.logs.len(),
    })
}

// GET /api/tasks
pub async fn tasks_for_day(
    State(state): State<SharedState>,
    Query(query): Query<DayQuery>,
) -> Result<Json<TasksResponse>, ApiError> {
    let req = query.validate(state.default_tz)?;
    let tasks = state.world().enriched_tasks_for_day(req.user_id, req.date.day, req.tz);

    Ok(Json(TasksResponse { success: true, tasks }))
}

// GET /api/tasks/status
pub async fn daily_statuses(
    State(state): State<SharedState>,
    Query(query): Query<DayQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let req = query.validate(state.default_tz)?;
    let logs = state
        .world()
        .daily_statuses(req.user_id, req.date.day, req.tz)
        .into_iter()
        .map(LogRow::from)
        .collect();

    Ok(Json(StatusResponse { success: true, logs, date: req.raw_date }))
}

// GET /api/tasks/freq
pub async fn weekly_frequency(
    State(state): State<SharedState>,
    Query(query): Query<DayQuery>,
) -> Result<Json<FrequencyResponse>, ApiError> {
    let req = query.validate(state.default_tz)?;
    let freq = state.world().weekly_frequencies(req.user_id, req.date.day, req.tz);
    let (week_start, week_end) = calendar::week_dates(req.date.day);

    Ok(Json(FrequencyResponse {
        success: true,
        freq,
        week_start,
        week_end,
        target_date: req.raw_date,
    }))
}

// POST /api/tasks/update
#[tracing::instrument(skip_all)]
pub async fn set_status(
    State(state): State<SharedState>,
    payload: Result<Json<SetStatusRequest>, JsonRejection>,
) -> Result<Json<SetStatusResponse>, ApiError> {
    let body = json_body(payload)?;

    let user_id: UserId = body.user_id
        .ok_or_else(|| ApiError::invalid("User ID parameter is required"))?
        .parse("User ID must be a valid number")?;
    let task_id: TaskId = body.task_id
        .ok_or_else(|| ApiError::invalid("Task ID is required"))?
        .parse("Task ID must be a valid number")?;
    let status = body.new_status
        .ok_or_else(|| ApiError::invalid("new_status is required"))?;
    let tz = resolve_tz(body.tz.as_deref(), state.default_tz)?;
    let date = body.curr_date
        .as_deref()
        .and_then(|raw| DateInput::parse(raw, tz).ok())
        .ok_or_else(|| ApiError::invalid("Invalid date provided"))?;

    let cmd = SetStatus {
        task_id,
        status,
        timestamp: date.instant_or(Utc::now(), tz),
        day: calendar::day_bounds(date.day, tz),
    };

    let StatusSet { replaced, entry, .. } =
        state.execute(cmd, user_id, "Unable to update task status")?;
    tracing::info!(task_id, user_id, status, deleted = replaced.len(), "status set");

    Ok(Json(SetStatusResponse {
        success: true,
        deleted_count: replaced.len(),
        new_log: NewLog {
            id: entry.id,
            task_id: entry.task_id,
            status: entry.status,
            timestamp: entry.update_time,
        },
    }))
}

// POST /api/tasks/create
#[tracing::instrument(skip_all)]
pub async fn create_task(
    State(state): State<SharedState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateTaskResponse>), ApiError> {
    let body = json_body(payload)?;

    let (Some(raw_user), Some(title), Some(min_freq_per_week)) =
        (body.user_id, non_blank(body.title), body.min_freq_per_week)
    else {
        return Err(ApiError::invalid("Provide all required fields."));
    };
    let user_id: UserId = raw_user.parse("User ID must be a valid number")?;
    let tz = resolve_tz(body.tz.as_deref(), state.default_tz)?;

    // A bare creation date starts at that day's first instant; a bare end
    // date keeps the task live through that whole day.
    let creation_time = match non_blank(body.creation_time) {
        Some(raw) => {
            let date = DateInput::parse(&raw, tz)?;
            Some(date.instant.unwrap_or(calendar::day_bounds(date.day, tz).start))
        }
        None => None,
    };
    let end_date = match non_blank(body.end_date) {
        Some(raw) => {
            let date = DateInput::parse(&raw, tz)?;
            Some(date.instant.unwrap_or(calendar::day_bounds(date.day, tz).end))
        }
        None => None,
    };

    let cmd = CreateTask { title, min_freq_per_week, creation_time, end_date };
    let task = state.execute(cmd, user_id, "Error creating task.")?.task;
    tracing::info!(task_id = task.id, user_id, target = task.min_freq_per_week, "task created");

    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse {
            success: true,
            message: "task created successfully".to_string(),
            id: task.id,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_ids_accept_numbers_and_numeric_strings() {
        let number: RawId = serde_json::from_str("42").unwrap();
        let text: RawId = serde_json::from_str(r#"" 42 ""#).unwrap();
        assert_eq!(number.parse::<UserId>("bad").unwrap(), 42);
        assert_eq!(text.parse::<UserId>("bad").unwrap(), 42);
    }

    #[test]
    fn raw_ids_reject_the_rest() {
        for raw in ["-1", "4.5", r#""abc""#, "99999999999"] {
            let id: RawId = serde_json::from_str(raw).unwrap();
            assert!(id.parse::<UserId>("bad").is_err(), "{raw}");
        }
    }

    #[test]
    fn day_query_validation_messages() {
        let message = |q: DayQuery| match q.validate(Tz::UTC) {
            Err(ApiError::InvalidInput(m)) => m,
            other => panic!("expected InvalidInput, got {:?}", other.map(|r| r.user_id)),
        };

        assert_eq!(
            message(DayQuery { id: Some("1".into()), ..Default::default() }),
            "Date parameter is required"
        );
        assert_eq!(
            message(DayQuery { date: Some("2024-01-10".into()), ..Default::default() }),
            "User ID parameter is required"
        );
        assert_eq!(
            message(DayQuery {
                date: Some("someday".into()),
                id: Some("1".into()),
                tz: None,
            }),
            "Invalid date format"
        );
        assert_eq!(
            message(DayQuery {
                date: Some("2024-01-10".into()),
                id: Some("one".into()),
                tz: None,
            }),
            "User ID must be a valid number"
        );
        assert_eq!(
            message(DayQuery {
                date: Some("2024-01-10".into()),
                id: Some("1".into()),
                tz: Some("Nowhere/Town".into()),
            }),
            "Unknown timezone: Nowhere/Town"
        );
    }

    #[test]
    fn day_query_uses_the_requested_zone() {
        let req = DayQuery {
            date: Some("2024-01-10T02:00:00Z".into()),
            id: Some("7".into()),
            tz: Some("America/New_York".into()),
        }
        .validate(Tz::UTC)
        .unwrap();

        assert_eq!(req.user_id, 7);
        assert_eq!(req.tz, chrono_tz::America::New_York);
        assert_eq!(req.date.day, NaiveDate::from_ymd_opt(2024, 1, 9).unwrap());
    }
}
