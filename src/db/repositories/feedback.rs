use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{
        helpers::{parse_datetime, parse_feedback_kind},
        Database,
    },
    models::FeedbackKind,
};

/// One stored answer to an intervention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub id: String,
    pub session_id: Option<String>,
    pub kind: FeedbackKind,
    pub created_at: DateTime<Utc>,
}

fn row_to_feedback(row: &Row) -> Result<FeedbackRecord> {
    let kind: String = row.get("feedback_type")?;
    let created_at: String = row.get("created_at")?;
    Ok(FeedbackRecord {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        kind: parse_feedback_kind(&kind)?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_feedback(
        &self,
        kind: FeedbackKind,
        session_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<FeedbackRecord> {
        let record = FeedbackRecord {
            id: Uuid::new_v4().to_string(),
            session_id,
            kind,
            created_at,
        };
        let row = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO feedback (id, session_id, feedback_type, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    row.id,
                    row.session_id,
                    row.kind.as_str(),
                    row.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(record)
    }

    pub async fn list_feedback(&self) -> Result<Vec<FeedbackRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, feedback_type, created_at
                 FROM feedback
                 ORDER BY created_at ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_feedback(row)?);
            }
            Ok(records)
        })
        .await
    }
}
