use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_u64},
    models::Plate,
};
use crate::text::PlateSignature;

/// Result of a get-or-create on the plate table.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateResolution {
    pub plate: Plate,
    pub created: bool,
}

fn row_to_plate(row: &Row) -> Result<Plate> {
    let created_at: String = row.get("created_at")?;

    Ok(Plate {
        id: row.get("id")?,
        letters: row.get("letters")?,
        digits: row.get("digits")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

pub(crate) fn select_plate(conn: &Connection, letters: &str, digits: &str) -> Result<Option<Plate>> {
    let mut stmt = conn.prepare(
        "SELECT id, letters, digits, created_at
         FROM plates
         WHERE letters = ?1 AND digits = ?2",
    )?;
    let mut rows = stmt.query(params![letters, digits])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_plate(row)?)),
        None => Ok(None),
    }
}

/// Inserts the signature, falling back to the existing row when the unique
/// pair was taken by another writer since the last lookup.
pub(crate) fn insert_or_fetch_plate(
    conn: &Connection,
    signature: &PlateSignature,
    now: DateTime<Utc>,
) -> Result<PlateResolution> {
    let inserted = conn.execute(
        "INSERT INTO plates (letters, digits, created_at) VALUES (?1, ?2, ?3)",
        params![signature.letters, signature.digits, now.to_rfc3339()],
    );

    match inserted {
        Ok(_) => Ok(PlateResolution {
            plate: Plate {
                id: conn.last_insert_rowid(),
                letters: signature.letters.clone(),
                digits: signature.digits.clone(),
                created_at: now,
            },
            created: true,
        }),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            let plate = select_plate(conn, &signature.letters, &signature.digits)?
                .ok_or_else(|| anyhow!("plate constraint violated but no matching row found"))?;
            Ok(PlateResolution {
                plate,
                created: false,
            })
        }
        Err(err) => Err(err.into()),
    }
}

impl Database {
    /// Atomic get-or-create keyed on `(letters, digits)`.
    pub async fn get_or_create_plate(&self, signature: &PlateSignature) -> Result<PlateResolution> {
        let signature = signature.clone();
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let resolution = match select_plate(&tx, &signature.letters, &signature.digits)? {
                Some(plate) => PlateResolution {
                    plate,
                    created: false,
                },
                None => insert_or_fetch_plate(&tx, &signature, Utc::now())?,
            };

            tx.commit()?;
            Ok(resolution)
        })
        .await
    }

    pub async fn find_plate(&self, signature: &PlateSignature) -> Result<Option<Plate>> {
        let signature = signature.clone();
        self.execute(move |conn| select_plate(conn, &signature.letters, &signature.digits))
            .await
    }

    pub async fn get_plate(&self, plate_id: i64) -> Result<Option<Plate>> {
        self.execute(move |conn| {
            let plate = conn
                .query_row(
                    "SELECT id, letters, digits, created_at FROM plates WHERE id = ?1",
                    params![plate_id],
                    |row| Ok(row_to_plate(row)),
                )
                .optional()?
                .transpose()?;
            Ok(plate)
        })
        .await
    }

    pub async fn count_plates(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM plates", [], |row| row.get(0))?;
            to_u64(count, "plate count")
        })
        .await
    }
}
