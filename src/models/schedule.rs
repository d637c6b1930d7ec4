use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A recurring focus block. When its start minute comes round on one of its
/// days, the agent starts a session on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub task_id: Option<String>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// 0 = Monday through 6 = Sunday.
    pub days_of_week: Vec<u8>,
    pub is_active: bool,
}

impl Schedule {
    /// Whether `now` (local time) falls inside the schedule's start minute on
    /// one of its days.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        let weekday = now.weekday().num_days_from_monday() as u8;
        self.is_active
            && self.days_of_week.contains(&weekday)
            && now.hour() == self.start_time.hour()
            && now.minute() == self.start_time.minute()
    }

    /// Minutes from start to end, wrapping past midnight. Equal start and end
    /// means a full day.
    pub fn goal_duration_minutes(&self) -> u32 {
        let start = self.start_time.num_seconds_from_midnight() / 60;
        let end = self.end_time.num_seconds_from_midnight() / 60;
        match (end + MINUTES_PER_DAY - start) % MINUTES_PER_DAY {
            0 => MINUTES_PER_DAY,
            minutes => minutes,
        }
    }
}
