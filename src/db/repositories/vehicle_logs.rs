use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row, TransactionBehavior};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_log_status, parse_optional_datetime, to_u64},
    models::{
        LogFilter, LogStats, LogStatus, LogStatusFilter, Presence, Vehicle, VehicleLogEntry,
        VehicleLogView,
    },
};

use super::vehicles::get_or_create_vehicle;

/// What one sighting did to the vehicle's log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogTransition {
    /// A new login row was appended.
    LoggedIn(VehicleLogEntry),
    /// The open login row was closed in place.
    LoggedOut(VehicleLogEntry),
    /// The sighting predates the latest recorded transition; nothing was written.
    Stale { latest: VehicleLogEntry },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedSighting {
    pub vehicle: Vehicle,
    pub vehicle_created: bool,
    pub transition: LogTransition,
}

fn row_to_entry(row: &Row) -> Result<VehicleLogEntry> {
    let check_in: String = row.get("check_in")?;
    let check_out: Option<String> = row.get("check_out")?;
    let status: String = row.get("status")?;

    Ok(VehicleLogEntry {
        id: row.get("id")?,
        vehicle_id: row.get("vehicle_id")?,
        check_in: parse_datetime(&check_in, "check_in")?,
        check_out: parse_optional_datetime(check_out, "check_out")?,
        status: parse_log_status(&status)?,
    })
}

pub(crate) fn select_latest_entry(conn: &Connection, vehicle_id: i64) -> Result<Option<VehicleLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, vehicle_id, check_in, check_out, status
         FROM vehicle_logs
         WHERE vehicle_id = ?1
         ORDER BY id DESC
         LIMIT 1",
    )?;

    let mut rows = stmt.query(params![vehicle_id])?;
    let entry = match rows.next()? {
        Some(row) => Some(row_to_entry(row)?),
        None => None,
    };
    Ok(entry)
}

fn insert_login(conn: &Connection, vehicle_id: i64, at: DateTime<Utc>) -> Result<VehicleLogEntry> {
    conn.execute(
        "INSERT INTO vehicle_logs (vehicle_id, check_in, check_out, status)
         VALUES (?1, ?2, NULL, ?3)",
        params![vehicle_id, at.to_rfc3339(), LogStatus::Login.as_str()],
    )?;

    Ok(VehicleLogEntry {
        id: conn.last_insert_rowid(),
        vehicle_id,
        check_in: at,
        check_out: None,
        status: LogStatus::Login,
    })
}

fn close_entry(conn: &Connection, entry: VehicleLogEntry, at: DateTime<Utc>) -> Result<VehicleLogEntry> {
    conn.execute(
        "UPDATE vehicle_logs
         SET status = ?1,
             check_out = ?2
         WHERE id = ?3",
        params![LogStatus::Logout.as_str(), at.to_rfc3339(), entry.id],
    )?;

    Ok(VehicleLogEntry {
        check_out: Some(at),
        status: LogStatus::Logout,
        ..entry
    })
}

/// Applies one sighting inside the caller's transaction.
pub(crate) fn apply_sighting_in(
    conn: &Connection,
    plate_id: i64,
    reference_image: Option<&str>,
    at: DateTime<Utc>,
) -> Result<AppliedSighting> {
    let (vehicle, vehicle_created) = get_or_create_vehicle(conn, plate_id, reference_image, at)?;

    let transition = match select_latest_entry(conn, vehicle.id)? {
        Some(latest) if at < latest.last_transition_at() => LogTransition::Stale { latest },
        Some(latest) if latest.status == LogStatus::Login => {
            LogTransition::LoggedOut(close_entry(conn, latest, at)?)
        }
        _ => LogTransition::LoggedIn(insert_login(conn, vehicle.id, at)?),
    };

    Ok(AppliedSighting {
        vehicle,
        vehicle_created,
        transition,
    })
}

impl Database {
    /// Resolves the plate's vehicle and flips its presence, all in one transaction.
    ///
    /// `reference_image` is only stored when this call creates the vehicle.
    pub async fn apply_sighting(
        &self,
        plate_id: i64,
        reference_image: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<AppliedSighting> {
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let applied = apply_sighting_in(&tx, plate_id, reference_image.as_deref(), at)?;
            tx.commit()?;
            Ok(applied)
        })
        .await
    }

    pub async fn latest_log_entry(&self, vehicle_id: i64) -> Result<Option<VehicleLogEntry>> {
        self.execute(move |conn| select_latest_entry(conn, vehicle_id))
            .await
    }

    pub async fn vehicle_presence(&self, vehicle_id: i64) -> Result<Presence> {
        let latest = self.latest_log_entry(vehicle_id).await?;
        Ok(Presence::from_latest(latest.as_ref()))
    }

    /// Full log of one vehicle in insertion order.
    pub async fn log_entries(&self, vehicle_id: i64) -> Result<Vec<VehicleLogEntry>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, vehicle_id, check_in, check_out, status
                 FROM vehicle_logs
                 WHERE vehicle_id = ?1
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query(params![vehicle_id])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    /// Log entries joined with their plate, newest check-in first.
    pub async fn list_vehicle_logs(&self, filter: LogFilter) -> Result<Vec<VehicleLogView>> {
        self.execute(move |conn| {
            let mut clauses = Vec::new();
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            match filter.status {
                LogStatusFilter::All => {}
                LogStatusFilter::Active => clauses.push("vl.check_out IS NULL".to_string()),
                LogStatusFilter::Completed => clauses.push("vl.check_out IS NOT NULL".to_string()),
            }

            if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                clauses.push(
                    "(p.letters LIKE ? ESCAPE '\\' OR p.digits LIKE ? ESCAPE '\\')".to_string(),
                );
                let pattern = format!("%{}%", escape_like(search));
                params_vec.push(Box::new(pattern.clone()));
                params_vec.push(Box::new(pattern));
            }

            if let Some(date) = filter.date {
                clauses.push("substr(vl.check_in, 1, 10) = ?".to_string());
                params_vec.push(Box::new(date_key(date)));
            }

            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let query = format!(
                "SELECT vl.id, vl.vehicle_id, vl.check_in, vl.check_out, vl.status,
                        p.id AS plate_id, p.letters, p.digits
                 FROM vehicle_logs vl
                 JOIN vehicles v ON vl.vehicle_id = v.id
                 JOIN plates p ON v.plate_id = p.id
                 {where_clause}
                 ORDER BY vl.check_in DESC, vl.id DESC"
            );

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query(params_refs.as_slice())?;
            let mut views = Vec::new();
            while let Some(row) = rows.next()? {
                views.push(VehicleLogView {
                    entry: row_to_entry(row)?,
                    plate_id: row.get("plate_id")?,
                    letters: row.get("letters")?,
                    digits: row.get("digits")?,
                });
            }
            Ok(views)
        })
        .await
    }

    /// Logins checked in on `date`, and entries still open regardless of date.
    pub async fn log_stats(&self, date: NaiveDate) -> Result<LogStats> {
        self.execute(move |conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vehicle_logs WHERE substr(check_in, 1, 10) = ?1",
                params![date_key(date)],
                |row| row.get(0),
            )?;
            let active: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vehicle_logs WHERE check_out IS NULL",
                [],
                |row| row.get(0),
            )?;

            Ok(LogStats {
                total_logins: to_u64(total, "total_logins")?,
                active_logins: to_u64(active, "active_logins")?,
            })
        })
        .await
    }
}

/// Makes `%` and `_` in user input match literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::text::PlateSignature;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, hour, minute, 0).unwrap()
    }

    async fn db_with_plate(letters: &str, digits: &str) -> (tempfile::TempDir, Database, i64) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("db.sqlite3")).unwrap();
        let plate = db
            .get_or_create_plate(&PlateSignature::new(letters, digits))
            .await
            .unwrap()
            .plate;
        (dir, db, plate.id)
    }

    #[tokio::test]
    async fn test_sightings_alternate_and_close_in_place() {
        let (_dir, db, plate_id) = db_with_plate("سل", "١٢").await;

        let first = db
            .apply_sighting(plate_id, Some("images/ref.jpg".into()), at(8, 0))
            .await
            .unwrap();
        assert!(first.vehicle_created);
        let LogTransition::LoggedIn(login) = &first.transition else {
            panic!("expected login, got {:?}", first.transition);
        };

        let second = db.apply_sighting(plate_id, None, at(9, 30)).await.unwrap();
        assert!(!second.vehicle_created);
        let LogTransition::LoggedOut(logout) = &second.transition else {
            panic!("expected logout, got {:?}", second.transition);
        };
        assert_eq!(logout.id, login.id);
        assert_eq!(logout.check_out, Some(at(9, 30)));

        let third = db.apply_sighting(plate_id, None, at(11, 0)).await.unwrap();
        assert!(matches!(third.transition, LogTransition::LoggedIn(_)));

        let entries = db.log_entries(first.vehicle.id).await.unwrap();
        let statuses: Vec<LogStatus> = entries.iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![LogStatus::Logout, LogStatus::Login]);
        assert_eq!(entries[0].check_in, at(8, 0));
        assert_eq!(
            db.vehicle_presence(first.vehicle.id).await.unwrap(),
            Presence::CanExit
        );
    }

    #[tokio::test]
    async fn test_stale_sighting_writes_nothing() {
        let (_dir, db, plate_id) = db_with_plate("طق", "٧").await;

        let first = db
            .apply_sighting(plate_id, Some("images/ref.jpg".into()), at(10, 0))
            .await
            .unwrap();
        let stale = db.apply_sighting(plate_id, None, at(9, 59)).await.unwrap();

        assert!(matches!(stale.transition, LogTransition::Stale { .. }));
        let entries = db.log_entries(first.vehicle.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LogStatus::Login);
    }

    #[tokio::test]
    async fn test_presence_without_log_is_can_enter() {
        let (_dir, db, _plate_id) = db_with_plate("ب", "٣").await;
        assert_eq!(db.vehicle_presence(42).await.unwrap(), Presence::CanEnter);
        assert!(db.latest_log_entry(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_stats_follow_filters() {
        let (_dir, db, first_plate) = db_with_plate("سل", "١٢").await;
        let second_plate = db
            .get_or_create_plate(&PlateSignature::new("طق", "٩٩"))
            .await
            .unwrap()
            .plate
            .id;

        // first vehicle: in and out; second vehicle: in, out the next day, back in
        db.apply_sighting(first_plate, Some("a.jpg".into()), at(8, 0))
            .await
            .unwrap();
        db.apply_sighting(first_plate, None, at(8, 45)).await.unwrap();
        db.apply_sighting(second_plate, Some("b.jpg".into()), at(9, 0))
            .await
            .unwrap();
        db.apply_sighting(second_plate, None, at(9, 0) + Duration::days(1))
            .await
            .unwrap();
        db.apply_sighting(second_plate, None, at(9, 0) + Duration::days(2))
            .await
            .unwrap();

        let all = db.list_vehicle_logs(LogFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].letters, "طق");
        assert_eq!(all[0].entry.status, LogStatus::Login);

        let active = db
            .list_vehicle_logs(LogFilter {
                status: LogStatusFilter::Active,
                ..LogFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].plate_id, second_plate);

        let searched = db
            .list_vehicle_logs(LogFilter {
                search: Some("١٢".into()),
                ..LogFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].plate_id, first_plate);

        let day = at(8, 0).date_naive();
        let on_day = db
            .list_vehicle_logs(LogFilter {
                status: LogStatusFilter::Completed,
                date: Some(day),
                ..LogFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(on_day.len(), 2);

        let stats = db.log_stats(day).await.unwrap();
        assert_eq!(
            stats,
            LogStats {
                total_logins: 2,
                active_logins: 1,
            }
        );
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("سل١٢"), "سل١٢");
        assert_eq!(escape_like("5%_\\"), "5\\%\\_\\\\");
    }

    #[tokio::test]
    async fn test_search_wildcards_match_literally() {
        let (_dir, db, plain_plate) = db_with_plate("سل", "١٢").await;
        let odd_plate = db
            .get_or_create_plate(&PlateSignature::new("ب_", "٣"))
            .await
            .unwrap()
            .plate
            .id;
        db.apply_sighting(plain_plate, Some("a.jpg".into()), at(8, 0))
            .await
            .unwrap();
        db.apply_sighting(odd_plate, Some("b.jpg".into()), at(8, 5))
            .await
            .unwrap();

        let search = |text: &str| LogFilter {
            search: Some(text.into()),
            ..LogFilter::default()
        };

        assert!(db.list_vehicle_logs(search("%")).await.unwrap().is_empty());
        let underscored = db.list_vehicle_logs(search("_")).await.unwrap();
        assert_eq!(underscored.len(), 1);
        assert_eq!(underscored[0].plate_id, odd_plate);
    }
}
