//! Data model for everything the sync layer persists.
//!
//! Field names are camelCase on the wire and in the local store so that data
//! written by earlier clients keeps decoding. Every field has a default, and an
//! explicit `null` reads as that default, which lets partially filled snapshots
//! read back from the local store still parse. Snapshot fields this crate does
//! not know about are carried in `extra` and written back untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Reads `null` as `T::default()`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Well-known local store keys.
pub mod keys {
    pub const HYDRATION: &str = "hydration_matrix_data";
    pub const SLEEP: &str = "mindctrl_sleep_data";
    pub const TASKS: &str = "taskmaster_tasks";
    pub const WAKE_STATE: &str = "mindctrl_wake_state";
    pub const USER_ID: &str = "mindctrl_user_id";
}

/// Remote collection names.
pub mod collections {
    pub const USER_DATA: &str = "userData";
    pub const HYDRATION_HISTORY: &str = "hydrationHistory";
    pub const SLEEP_HISTORY: &str = "sleepHistory";
    pub const TASKS: &str = "tasks";
    pub const TASK_COMPLETIONS: &str = "taskCompletions";
}

/// Generic key-value record as stored in `userData/<userId>_<key>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataRecord {
    pub key: String,
    pub user_id: String,
    #[serde(default)]
    pub data: Option<JsonValue>,
    /// Assigned by the remote store on write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HydrationSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub user_weight: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub user_height: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub bmi: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub daily_water_target: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub water_bottles: Vec<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub total_consumed: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub is_setup_complete: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub last_reset_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SleepSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub is_awake: bool,
    pub sleep_start_time: Option<DateTime<Utc>>,
    pub wake_time: Option<DateTime<Utc>>,
    /// Minutes slept so far today.
    #[serde(deserialize_with = "null_as_default")]
    pub total_sleep_today: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub daily_average: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub last_save_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl SleepSnapshot {
    pub fn has_sleep(&self) -> bool {
        self.total_sleep_today > 0.0
    }
}

/// A task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Task {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub priority: String,
    #[serde(deserialize_with = "null_as_default")]
    pub goal_count: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub energy_required: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub schedule: String,
    #[serde(deserialize_with = "null_as_default")]
    pub recurrence: String,
    #[serde(deserialize_with = "null_as_default")]
    pub duration: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub current_progress: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Details attached to a task completion event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskCompletion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<i64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_required: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_progress: Option<i64>,
}

/// One archived day of a snapshot, as read back from a history collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry<T> {
    pub user_id: String,
    #[serde(flatten)]
    pub snapshot: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// The `tasks/<userId>_current` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListDocument {
    pub user_id: String,
    pub tasks: Vec<Task>,
    pub last_modified: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletionRecord {
    pub user_id: String,
    pub task_id: String,
    #[serde(flatten)]
    pub completion: TaskCompletion,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Archived activity over the last `period` days.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub hydration: Vec<HistoryEntry<HydrationSnapshot>>,
    pub sleep: Vec<HistoryEntry<SleepSnapshot>>,
    pub tasks: Vec<TaskCompletionRecord>,
    pub period: usize,
}
