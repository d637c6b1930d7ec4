use anyhow::Result;
use rusqlite::{params, Row};

use crate::{
    db::{
        helpers::{join_weekdays, parse_clock_time, parse_weekdays},
        Database,
    },
    models::Schedule,
};

fn row_to_schedule(row: &Row) -> Result<Schedule> {
    let start_time: String = row.get("start_time")?;
    let end_time: String = row.get("end_time")?;
    let days: String = row.get("days_of_week")?;
    let is_active: i64 = row.get("is_active")?;

    Ok(Schedule {
        id: row.get("id")?,
        name: row.get("name")?,
        task_id: row.get("task_id")?,
        start_time: parse_clock_time(&start_time, "start_time")?,
        end_time: parse_clock_time(&end_time, "end_time")?,
        days_of_week: parse_weekdays(&days)?,
        is_active: is_active != 0,
    })
}

impl Database {
    /// Inserts the schedule or replaces the stored one with the same id.
    pub async fn save_schedule(&self, schedule: &Schedule) -> Result<()> {
        let record = schedule.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO schedules (id, name, task_id, start_time, end_time, days_of_week, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    task_id = excluded.task_id,
                    start_time = excluded.start_time,
                    end_time = excluded.end_time,
                    days_of_week = excluded.days_of_week,
                    is_active = excluded.is_active",
                params![
                    record.id,
                    record.name,
                    record.task_id,
                    record.start_time.format("%H:%M").to_string(),
                    record.end_time.format("%H:%M").to_string(),
                    join_weekdays(&record.days_of_week),
                    i64::from(record.is_active),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_active_schedules(&self) -> Result<Vec<Schedule>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, task_id, start_time, end_time, days_of_week, is_active
                 FROM schedules
                 WHERE is_active = 1
                 ORDER BY start_time ASC, id ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut schedules = Vec::new();
            while let Some(row) = rows.next()? {
                schedules.push(row_to_schedule(row)?);
            }
            Ok(schedules)
        })
        .await
    }

    /// Returns whether a schedule was removed.
    pub async fn delete_schedule(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.execute(move |conn| {
            let removed = conn.execute("DELETE FROM schedules WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn schedule(id: &str, hour: u32, is_active: bool) -> Schedule {
        Schedule {
            id: id.into(),
            name: format!("block {id}"),
            task_id: None,
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
            days_of_week: vec![1, 3],
            is_active,
        }
    }

    #[tokio::test]
    async fn only_active_schedules_are_listed_in_start_order() {
        let db = Database::open_in_memory().unwrap();
        db.save_schedule(&schedule("late", 14, true)).await.unwrap();
        db.save_schedule(&schedule("early", 8, true)).await.unwrap();
        db.save_schedule(&schedule("off", 10, false)).await.unwrap();

        let listed = db.list_active_schedules().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["early", "late"]);
        assert_eq!(listed[0], schedule("early", 8, true));
    }

    #[tokio::test]
    async fn saving_again_updates_and_delete_removes() {
        let db = Database::open_in_memory().unwrap();
        db.save_schedule(&schedule("s", 9, true)).await.unwrap();
        db.save_schedule(&schedule("s", 9, false)).await.unwrap();
        assert!(db.list_active_schedules().await.unwrap().is_empty());

        assert!(db.delete_schedule("s").await.unwrap());
        assert!(!db.delete_schedule("s").await.unwrap());
    }
}
