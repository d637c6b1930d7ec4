use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The currently active focus session as reported by the session authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    /// `None` marks an untagged (basic) session.
    pub task_id: Option<String>,
    pub start_time_epoch_seconds: i64,
}

/// Authority-side record of the running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    pub goal_duration_minutes: u32,
}

impl ActiveSession {
    pub fn session_id(&self) -> &str {
        &self.snapshot.session_id
    }
}

/// A finished session kept in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub session_id: String,
    pub task_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub goal_duration_minutes: u32,
    pub user_evaluation_score: u8,
}

impl CompletedSession {
    pub fn duration_secs(&self) -> u64 {
        (self.ended_at - self.started_at).num_seconds().max(0) as u64
    }
}
