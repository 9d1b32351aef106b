//! Aggregates read by the reporting layer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::recognition::PlateNumber;

/// Closed sessions and collected fees for one entry day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub vehicles: u64,
    pub total_fee: f64,
}

/// One plate's activity over a calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlateMonthlySummary {
    pub plate: PlateNumber,
    pub visits: u64,
    /// Sum over closed sessions only
    pub total_hours: f64,
    pub total_fee: f64,
}
