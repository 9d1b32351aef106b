use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, types::Value};

use super::parking_sessions::{row_to_session, SESSION_COLUMNS};
use crate::db::{
    connection::Database,
    helpers::{date_bounds, to_u64},
    models::{DailyRevenue, ParkingSession, PlateMonthlySummary, SessionQuery},
};
use crate::recognition::PlateNumber;

impl Database {
    /// Record search for the administration screen, newest entry first.
    pub async fn search_sessions(&self, query: SessionQuery) -> Result<Vec<ParkingSession>> {
        let mut sql = format!("SELECT {SESSION_COLUMNS} FROM parking_sessions WHERE 1 = 1");
        let mut values: Vec<Value> = Vec::new();

        if let Some(fragment) = query.plate_contains.as_deref().map(str::trim) {
            if !fragment.is_empty() {
                values.push(Value::Text(format!("%{}%", fragment.to_uppercase())));
                sql.push_str(&format!(" AND plate_number LIKE ?{}", values.len()));
            }
        }

        if let Some(day) = query.entry_date {
            let next = day
                .succ_opt()
                .ok_or_else(|| anyhow!("no day after {day}"))?;
            let (start, end) = date_bounds(day, next)?;
            values.push(Value::Text(start));
            sql.push_str(&format!(" AND entry_time >= ?{}", values.len()));
            values.push(Value::Text(end));
            sql.push_str(&format!(" AND entry_time < ?{}", values.len()));
        }

        sql.push_str(" ORDER BY entry_time DESC");

        self.execute(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(values))?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Closed-session count and fee total per entry day, newest day first.
    pub async fn daily_revenue(&self) -> Result<Vec<DailyRevenue>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT substr(entry_time, 1, 10) AS day, COUNT(*), SUM(fee)
                 FROM parking_sessions
                 WHERE fee IS NOT NULL
                 GROUP BY day
                 ORDER BY day DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut report = Vec::new();
            while let Some(row) = rows.next()? {
                let day: String = row.get(0)?;
                report.push(DailyRevenue {
                    date: NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                        .with_context(|| format!("invalid entry day '{day}'"))?,
                    vehicles: to_u64(row.get(1)?, "vehicles")?,
                    total_fee: row.get(2)?,
                });
            }
            Ok(report)
        })
        .await
    }

    /// Per-plate totals for sessions entered during `year`-`month`, by plate.
    pub async fn monthly_plate_summary(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<PlateMonthlySummary>> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| anyhow!("invalid month {year}-{month:02}"))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| anyhow!("no month after {year}-{month:02}"))?;
        let (start, end) = date_bounds(first, next)?;

        let sessions = self
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SESSION_COLUMNS}
                     FROM parking_sessions
                     WHERE entry_time >= ?1 AND entry_time < ?2"
                ))?;
                let mut rows = stmt.query(params![start, end])?;
                let mut sessions = Vec::new();
                while let Some(row) = rows.next()? {
                    sessions.push(row_to_session(row)?);
                }
                Ok(sessions)
            })
            .await?;

        Ok(summarize_by_plate(sessions))
    }

    /// Administrative removal of records. Returns how many rows went away.
    pub async fn delete_sessions(&self, session_ids: Vec<String>) -> Result<usize> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            for id in &session_ids {
                removed += tx.execute("DELETE FROM parking_sessions WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }
}

/// Each visit's hours are rounded to cents of an hour before summing.
fn summarize_by_plate(sessions: Vec<ParkingSession>) -> Vec<PlateMonthlySummary> {
    let mut by_plate: BTreeMap<PlateNumber, PlateMonthlySummary> = BTreeMap::new();
    for session in sessions {
        let entry = by_plate
            .entry(session.plate.clone())
            .or_insert_with(|| PlateMonthlySummary {
                plate: session.plate.clone(),
                visits: 0,
                total_hours: 0.0,
                total_fee: 0.0,
            });
        entry.visits += 1;
        entry.total_hours += round_hundredths(session.duration_minutes().unwrap_or(0.0) / 60.0);
        entry.total_fee += session.fee.unwrap_or(0.0);
    }
    by_plate
        .into_values()
        .map(|mut summary| {
            summary.total_hours = round_hundredths(summary.total_hours);
            summary
        })
        .collect()
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn closed(plate: &str, entry: DateTime<Utc>, minutes: i64, fee: f64) -> ParkingSession {
        ParkingSession {
            id: format!("{plate}-{}", entry.timestamp()),
            plate: PlateNumber::parse(plate).unwrap(),
            spot: 1,
            entry_time: entry,
            exit_time: Some(entry + Duration::minutes(minutes)),
            fee: Some(fee),
        }
    }

    #[test]
    fn hours_are_rounded_per_visit() {
        let start = Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap();
        let sessions = (0..3)
            .map(|n| closed("AB12CD", start + Duration::hours(n), 20, 15.0))
            .collect();

        let summary = summarize_by_plate(sessions);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].visits, 3);
        assert_eq!(summary[0].total_hours, 0.99);
        assert_eq!(summary[0].total_fee, 45.0);
    }

    #[test]
    fn open_visits_count_without_hours() {
        let start = Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap();
        let mut parked = closed("0000FF", start, 0, 0.0);
        parked.exit_time = None;
        parked.fee = None;
        let sessions = vec![closed("0000FF", start - Duration::hours(3), 100, 25.0), parked];

        let summary = summarize_by_plate(sessions);
        assert_eq!(summary[0].visits, 2);
        assert_eq!(summary[0].total_hours, 1.67);
        assert_eq!(summary[0].total_fee, 25.0);
    }
}
