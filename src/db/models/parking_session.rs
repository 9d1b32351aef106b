use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::recognition::PlateNumber;

/// One stay of one vehicle in one spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingSession {
    pub id: String,
    pub plate: PlateNumber,
    pub spot: u32,
    pub entry_time: DateTime<Utc>,
    /// `None` while the vehicle is still inside
    pub exit_time: Option<DateTime<Utc>>,
    /// Set together with `exit_time`
    pub fee: Option<f64>,
}

impl ParkingSession {
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    pub fn duration_minutes(&self) -> Option<f64> {
        self.exit_time
            .map(|exit| minutes_between(self.entry_time, exit))
    }
}

pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 60_000.0
}

/// Filters for the administrative record search. Empty fields match all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    /// Case-insensitive substring of the plate
    pub plate_contains: Option<String>,
    /// UTC calendar day of entry
    pub entry_date: Option<NaiveDate>,
}
