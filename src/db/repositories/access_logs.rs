use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{connection::Database, helpers::parse_datetime, models::AccessLog};

fn row_to_access_log(row: &Row) -> Result<AccessLog> {
    let created_at: String = row.get("created_at")?;

    Ok(AccessLog {
        id: row.get("id")?,
        plate_text: row.get("plate_text")?,
        recognized: row.get("recognized")?,
        message: row.get("message")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_access_log(&self, log: &AccessLog) -> Result<i64> {
        let record = log.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO access_logs (plate_text, recognized, message, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.plate_text,
                    record.recognized,
                    record.message,
                    record.created_at.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn recent_access_logs(&self, limit: usize) -> Result<Vec<AccessLog>> {
        let limit = limit as i64;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, plate_text, recognized, message, created_at
                 FROM access_logs
                 ORDER BY id DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut logs = Vec::new();
            while let Some(row) = rows.next()? {
                logs.push(row_to_access_log(row)?);
            }
            Ok(logs)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_recent_access_logs_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("db.sqlite3")).unwrap();

        for message in ["Vehicle logged in", "Vehicle logged out"] {
            db.insert_access_log(&AccessLog {
                id: None,
                plate_text: "لس ٢١".into(),
                recognized: true,
                message: message.into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let logs = db.recent_access_logs(1).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "Vehicle logged out");
        assert!(logs[0].recognized);
        assert!(logs[0].id.is_some());
    }
}
