use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_u64},
    models::Vehicle,
};

fn row_to_vehicle(row: &Row) -> Result<Vehicle> {
    let created_at: String = row.get("created_at")?;

    Ok(Vehicle {
        id: row.get("id")?,
        plate_id: row.get("plate_id")?,
        image_path: row.get("image_path")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

pub(crate) fn select_vehicle_by_plate(conn: &Connection, plate_id: i64) -> Result<Option<Vehicle>> {
    let vehicle = conn
        .query_row(
            "SELECT id, plate_id, image_path, created_at FROM vehicles WHERE plate_id = ?1",
            params![plate_id],
            |row| Ok(row_to_vehicle(row)),
        )
        .optional()?
        .transpose()?;
    Ok(vehicle)
}

/// Returns the plate's vehicle, creating it with `image_path` when absent.
///
/// The flag is true only when this call inserted the row.
pub(crate) fn get_or_create_vehicle(
    conn: &Connection,
    plate_id: i64,
    image_path: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(Vehicle, bool)> {
    if let Some(vehicle) = select_vehicle_by_plate(conn, plate_id)? {
        return Ok((vehicle, false));
    }

    let image_path = image_path
        .ok_or_else(|| anyhow!("plate {plate_id} has no vehicle and no reference image was supplied"))?;

    let inserted = conn.execute(
        "INSERT INTO vehicles (plate_id, image_path, created_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(plate_id) DO NOTHING",
        params![plate_id, image_path, now.to_rfc3339()],
    )?;

    let vehicle = select_vehicle_by_plate(conn, plate_id)?
        .ok_or_else(|| anyhow!("vehicle for plate {plate_id} missing after insert"))?;
    Ok((vehicle, inserted == 1))
}

impl Database {
    pub async fn find_vehicle_by_plate(&self, plate_id: i64) -> Result<Option<Vehicle>> {
        self.execute(move |conn| select_vehicle_by_plate(conn, plate_id))
            .await
    }

    pub async fn count_vehicles(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM vehicles", [], |row| row.get(0))?;
            to_u64(count, "vehicle count")
        })
        .await
    }
}
