use std::collections::BTreeSet;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_timestamp, parse_datetime, parse_optional_datetime, to_u32, to_u64},
    models::ParkingSession,
};
use crate::recognition::PlateNumber;

pub(crate) const SESSION_COLUMNS: &str =
    "id, plate_number, spot_number, entry_time, exit_time, fee";

pub(crate) fn row_to_session(row: &Row) -> Result<ParkingSession> {
    let plate: String = row.get("plate_number")?;
    let spot: i64 = row.get("spot_number")?;
    let entry_time: String = row.get("entry_time")?;
    let exit_time: Option<String> = row.get("exit_time")?;

    Ok(ParkingSession {
        id: row.get("id")?,
        plate: PlateNumber::parse(&plate)
            .ok_or_else(|| anyhow!("stored plate_number '{plate}' is malformed"))?,
        spot: to_u32(spot, "spot_number")?,
        entry_time: parse_datetime(&entry_time, "entry_time")?,
        exit_time: parse_optional_datetime(exit_time, "exit_time")?,
        fee: row.get("fee")?,
    })
}

pub(crate) fn find_open_session(
    conn: &Connection,
    plate: &PlateNumber,
) -> Result<Option<ParkingSession>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS}
         FROM parking_sessions
         WHERE plate_number = ?1 AND exit_time IS NULL
         ORDER BY entry_time DESC
         LIMIT 1"
    ))?;

    let session = stmt
        .query_row(params![plate.as_str()], |row| Ok(row_to_session(row)))
        .optional()?
        .transpose()?;
    Ok(session)
}

pub(crate) fn occupied_spots(conn: &Connection) -> Result<BTreeSet<u32>> {
    let mut stmt =
        conn.prepare("SELECT spot_number FROM parking_sessions WHERE exit_time IS NULL")?;
    let mut rows = stmt.query([])?;
    let mut spots = BTreeSet::new();
    while let Some(row) = rows.next()? {
        spots.insert(to_u32(row.get(0)?, "spot_number")?);
    }
    Ok(spots)
}

pub(crate) fn count_open(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM parking_sessions WHERE exit_time IS NULL",
        [],
        |row| row.get(0),
    )?;
    to_u64(count, "open session count")
}

pub(crate) fn insert_session(conn: &Connection, session: &ParkingSession) -> Result<()> {
    conn.execute(
        "INSERT INTO parking_sessions (id, plate_number, spot_number, entry_time, exit_time, fee)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session.id,
            session.plate.as_str(),
            session.spot,
            format_timestamp(&session.entry_time),
            session.exit_time.as_ref().map(format_timestamp),
            session.fee,
        ],
    )?;
    Ok(())
}

pub(crate) fn close_session(
    conn: &Connection,
    session_id: &str,
    exit_time: DateTime<Utc>,
    fee: f64,
) -> Result<()> {
    let rows_affected = conn.execute(
        "UPDATE parking_sessions
         SET exit_time = ?1,
             fee = ?2
         WHERE id = ?3 AND exit_time IS NULL",
        params![format_timestamp(&exit_time), fee, session_id],
    )?;

    if rows_affected != 1 {
        bail!("session {session_id} is not open");
    }
    Ok(())
}

fn collect_sessions(conn: &Connection, sql: &str, plate: Option<&str>) -> Result<Vec<ParkingSession>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = match plate {
        Some(plate) => stmt.query(params![plate])?,
        None => stmt.query([])?,
    };

    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_session(row)?);
    }
    Ok(sessions)
}

impl Database {
    pub async fn get_open_session(&self, plate: &PlateNumber) -> Result<Option<ParkingSession>> {
        let plate = plate.clone();
        self.execute(move |conn| find_open_session(conn, &plate))
            .await
    }

    pub async fn count_open_sessions(&self) -> Result<u64> {
        self.execute(|conn| count_open(conn)).await
    }

    pub async fn list_open_sessions(&self) -> Result<Vec<ParkingSession>> {
        self.execute(|conn| {
            collect_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS}
                     FROM parking_sessions
                     WHERE exit_time IS NULL
                     ORDER BY spot_number ASC"
                ),
                None,
            )
        })
        .await
    }

    /// Every session for `plate`, newest entry first.
    pub async fn list_sessions_for_plate(&self, plate: &PlateNumber) -> Result<Vec<ParkingSession>> {
        let plate = plate.clone();
        self.execute(move |conn| {
            collect_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS}
                     FROM parking_sessions
                     WHERE plate_number = ?1
                     ORDER BY entry_time DESC"
                ),
                Some(plate.as_str()),
            )
        })
        .await
    }
}
