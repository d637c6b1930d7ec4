use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::{
    db::{
        helpers::{epoch_to_datetime, parse_datetime, to_u32, to_u8},
        Database,
    },
    models::{ActiveSession, CompletedSession, SessionSnapshot},
};

fn row_to_active(row: &Row) -> Result<ActiveSession> {
    let goal: i64 = row.get("goal_duration_minutes")?;
    Ok(ActiveSession {
        snapshot: SessionSnapshot {
            session_id: row.get("session_id")?,
            task_id: row.get("task_id")?,
            start_time_epoch_seconds: row.get("start_time_s")?,
        },
        goal_duration_minutes: to_u32(goal, "goal_duration_minutes")?,
    })
}

fn row_to_completed(row: &Row) -> Result<CompletedSession> {
    let started_at: String = row.get("started_at")?;
    let ended_at: String = row.get("ended_at")?;
    let goal: i64 = row.get("goal_duration_minutes")?;
    let score: i64 = row.get("user_evaluation_score")?;

    Ok(CompletedSession {
        session_id: row.get("session_id")?,
        task_id: row.get("task_id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_datetime(&ended_at, "ended_at")?,
        goal_duration_minutes: to_u32(goal, "goal_duration_minutes")?,
        user_evaluation_score: to_u8(score, "user_evaluation_score")?,
    })
}

impl Database {
    /// Replaces whatever session was recorded as active.
    pub async fn save_active_session(&self, session: &ActiveSession) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM active_session", [])?;
            tx.execute(
                "INSERT INTO active_session (session_id, task_id, start_time_s, goal_duration_minutes)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.snapshot.session_id,
                    record.snapshot.task_id,
                    record.snapshot.start_time_epoch_seconds,
                    i64::from(record.goal_duration_minutes),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn load_active_session(&self) -> Result<Option<ActiveSession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, task_id, start_time_s, goal_duration_minutes
                 FROM active_session
                 LIMIT 1",
            )?;
            let session = stmt
                .query_row([], |row| Ok(row_to_active(row)))
                .optional()?
                .transpose()?;
            Ok(session)
        })
        .await
    }

    /// Moves the active session into history in one transaction.
    pub async fn finish_session(
        &self,
        session: &ActiveSession,
        ended_at: DateTime<Utc>,
        user_evaluation_score: u8,
    ) -> Result<CompletedSession> {
        let started_at = epoch_to_datetime(session.snapshot.start_time_epoch_seconds)?;
        let completed = CompletedSession {
            session_id: session.snapshot.session_id.clone(),
            task_id: session.snapshot.task_id.clone(),
            started_at,
            ended_at,
            goal_duration_minutes: session.goal_duration_minutes,
            user_evaluation_score,
        };

        let record = completed.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM active_session WHERE session_id = ?1",
                params![record.session_id],
            )?;
            tx.execute(
                "INSERT INTO session_history (session_id, task_id, started_at, ended_at, goal_duration_minutes, user_evaluation_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.session_id,
                    record.task_id,
                    record.started_at.to_rfc3339(),
                    record.ended_at.to_rfc3339(),
                    i64::from(record.goal_duration_minutes),
                    i64::from(record.user_evaluation_score),
                ],
            )
            .context("failed to record session history")?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        Ok(completed)
    }

    /// Most recently ended first.
    pub async fn list_completed_sessions(&self, limit: usize) -> Result<Vec<CompletedSession>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, task_id, started_at, ended_at, goal_duration_minutes, user_evaluation_score
                 FROM session_history
                 ORDER BY ended_at DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query(params![limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_completed(row)?);
            }
            Ok(sessions)
        })
        .await
    }
}
