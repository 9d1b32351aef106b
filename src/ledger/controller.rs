use chrono::{DateTime, SubsecRound, Utc};
use log::info;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{
        models::minutes_between,
        repositories::parking_sessions::{
            close_session, count_open, find_open_session, insert_session, occupied_spots,
        },
        Database, ParkingSession,
    },
    recognition::PlateNumber,
};

use super::{
    error::{LedgerError, Result},
    fee::FeeSchedule,
};

/// What the driver is charged on the way out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitReceipt {
    pub session_id: String,
    pub plate: PlateNumber,
    pub spot: u32,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration_minutes: f64,
    pub fee: f64,
}

/// Sole writer of parking sessions.
///
/// `entry` and `exit` each run as one SQLite transaction on the database
/// thread: the open-session lookup, the decision and the write commit
/// together or not at all.
#[derive(Clone)]
pub struct OccupancyLedger {
    db: Database,
    total_spots: u32,
    fees: FeeSchedule,
}

impl OccupancyLedger {
    pub fn new(db: Database, total_spots: u32, fees: FeeSchedule) -> Self {
        Self {
            db,
            total_spots,
            fees,
        }
    }

    pub fn total_spots(&self) -> u32 {
        self.total_spots
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Spots without an open session. Negative if the lot was shrunk while
    /// vehicles were parked beyond the new size.
    pub async fn available_spots(&self) -> Result<i64> {
        let open = self
            .db
            .count_open_sessions()
            .await
            .map_err(LedgerError::Storage)?;
        Ok(i64::from(self.total_spots) - open as i64)
    }

    pub async fn is_inside(&self, plate: &PlateNumber) -> Result<bool> {
        self.db
            .get_open_session(plate)
            .await
            .map(|session| session.is_some())
            .map_err(LedgerError::Storage)
    }

    /// Park `plate` in the lowest free spot now.
    pub async fn entry(&self, plate: &PlateNumber) -> Result<u32> {
        self.entry_at(plate, Utc::now())
            .await
            .map(|session| session.spot)
    }

    pub async fn entry_at(
        &self,
        plate: &PlateNumber,
        entry_time: DateTime<Utc>,
    ) -> Result<ParkingSession> {
        let plate = plate.clone();
        let total_spots = self.total_spots;
        let entry_time = entry_time.trunc_subsecs(3);

        let session = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction()?;

                if let Some(open) = find_open_session(&tx, &plate)? {
                    return Ok(Err(LedgerError::AlreadyInside {
                        plate,
                        spot: open.spot,
                    }));
                }

                if count_open(&tx)? >= u64::from(total_spots) {
                    return Ok(Err(LedgerError::Full { total_spots }));
                }

                let occupied = occupied_spots(&tx)?;
                let Some(spot) = (1..=total_spots).find(|spot| !occupied.contains(spot)) else {
                    return Ok(Err(LedgerError::Full { total_spots }));
                };

                let session = ParkingSession {
                    id: Uuid::new_v4().to_string(),
                    plate,
                    spot,
                    entry_time,
                    exit_time: None,
                    fee: None,
                };
                insert_session(&tx, &session)?;
                tx.commit()?;

                Ok(Ok(session))
            })
            .await
            .map_err(LedgerError::Storage)??;

        info!(
            "plate {} entered, assigned spot {}",
            session.plate, session.spot
        );
        Ok(session)
    }

    /// Close the open session for `plate` now and charge for it.
    pub async fn exit(&self, plate: &PlateNumber) -> Result<ExitReceipt> {
        self.exit_at(plate, Utc::now()).await
    }

    pub async fn exit_at(
        &self,
        plate: &PlateNumber,
        exit_time: DateTime<Utc>,
    ) -> Result<ExitReceipt> {
        let plate = plate.clone();
        let fees = self.fees.clone();
        let exit_time = exit_time.trunc_subsecs(3);

        let receipt = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction()?;

                let Some(open) = find_open_session(&tx, &plate)? else {
                    return Ok(Err(LedgerError::NotFound { plate }));
                };

                // A clock that stepped backwards must not produce exit < entry.
                let exit_time = exit_time.max(open.entry_time);
                let duration_minutes = minutes_between(open.entry_time, exit_time);
                let fee = fees.fee_for_minutes(duration_minutes);

                close_session(&tx, &open.id, exit_time, fee)?;
                tx.commit()?;

                Ok(Ok(ExitReceipt {
                    session_id: open.id,
                    plate,
                    spot: open.spot,
                    entry_time: open.entry_time,
                    exit_time,
                    duration_minutes,
                    fee,
                }))
            })
            .await
            .map_err(LedgerError::Storage)??;

        info!(
            "plate {} left spot {} after {:.1} min, fee {:.2}",
            receipt.plate, receipt.spot, receipt.duration_minutes, receipt.fee
        );
        Ok(receipt)
    }

    /// Past and current sessions for `plate`, newest entry first.
    pub async fn history(&self, plate: &PlateNumber) -> Result<Vec<ParkingSession>> {
        self.db
            .list_sessions_for_plate(plate)
            .await
            .map_err(LedgerError::Storage)
    }

    pub async fn open_sessions(&self) -> Result<Vec<ParkingSession>> {
        self.db
            .list_open_sessions()
            .await
            .map_err(LedgerError::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn plate(raw: &str) -> PlateNumber {
        PlateNumber::parse(raw).unwrap()
    }

    fn ledger(total_spots: u32) -> (TempDir, OccupancyLedger) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("ledger.sqlite3")).unwrap();
        (dir, OccupancyLedger::new(db, total_spots, FeeSchedule::default()))
    }

    /// Make every write of `event` to the sessions table fail.
    async fn fail_writes(ledger: &OccupancyLedger, event: &'static str) {
        ledger
            .db
            .execute(move |conn| {
                conn.execute_batch(&format!(
                    "CREATE TRIGGER fail_{event} BEFORE {event} ON parking_sessions
                     BEGIN SELECT RAISE(ABORT, 'disk on fire'); END;"
                ))?;
                Ok(())
            })
            .await
            .unwrap();
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn entry_marks_inside_and_takes_a_spot() {
        let (_dir, ledger) = ledger(5);
        let car = plate("AB12CD");

        assert!(!ledger.is_inside(&car).await.unwrap());
        assert_eq!(ledger.available_spots().await.unwrap(), 5);

        let spot = ledger.entry(&car).await.unwrap();
        assert_eq!(spot, 1);
        assert!(ledger.is_inside(&car).await.unwrap());
        assert_eq!(ledger.available_spots().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn exit_frees_the_spot() {
        let (_dir, ledger) = ledger(5);
        let car = plate("AB12CD");
        ledger.entry(&car).await.unwrap();

        let receipt = ledger.exit(&car).await.unwrap();
        assert_eq!(receipt.fee, 15.0);
        assert!(!ledger.is_inside(&car).await.unwrap());
        assert_eq!(ledger.available_spots().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn assigns_lowest_free_spot() {
        let (_dir, ledger) = ledger(4);
        for (raw, expected) in [("00000A", 1), ("00000B", 2), ("00000C", 3)] {
            assert_eq!(ledger.entry(&plate(raw)).await.unwrap(), expected);
        }

        ledger.exit(&plate("00000B")).await.unwrap();
        assert_eq!(ledger.entry(&plate("00000D")).await.unwrap(), 2);
        assert_eq!(ledger.entry(&plate("00000E")).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn full_lot_rejects_without_writing() {
        let (_dir, ledger) = ledger(2);
        ledger.entry(&plate("00000A")).await.unwrap();
        ledger.entry(&plate("00000B")).await.unwrap();

        let err = ledger.entry(&plate("00000C")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Full { total_spots: 2 }));
        assert_eq!(ledger.available_spots().await.unwrap(), 0);
        assert!(ledger.history(&plate("00000C")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exit_without_entry_is_not_found() {
        let (_dir, ledger) = ledger(2);
        let err = ledger.exit(&plate("AB12CD")).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
        assert_eq!(ledger.available_spots().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn double_entry_is_rejected() {
        let (_dir, ledger) = ledger(3);
        let car = plate("AB12CD");
        ledger.entry(&car).await.unwrap();

        let err = ledger.entry(&car).await.unwrap_err();
        match err {
            LedgerError::AlreadyInside { plate, spot } => {
                assert_eq!(plate, car);
                assert_eq!(spot, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(ledger.available_spots().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn fee_follows_duration() {
        let (_dir, ledger) = ledger(3);
        let cases = [("00000A", 60, 15.0), ("00000B", 90, 20.0), ("00000C", 120, 25.0)];

        for (raw, minutes, expected_fee) in cases {
            let car = plate(raw);
            ledger.entry_at(&car, noon()).await.unwrap();
            let receipt = ledger
                .exit_at(&car, noon() + Duration::minutes(minutes))
                .await
                .unwrap();
            assert_eq!(receipt.duration_minutes, minutes as f64);
            assert_eq!(receipt.fee, expected_fee);
        }
    }

    #[tokio::test]
    async fn backwards_clock_charges_zero_duration() {
        let (_dir, ledger) = ledger(1);
        let car = plate("AB12CD");
        ledger.entry_at(&car, noon()).await.unwrap();

        let receipt = ledger
            .exit_at(&car, noon() - Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(receipt.exit_time, noon());
        assert_eq!(receipt.duration_minutes, 0.0);
        assert_eq!(receipt.fee, 15.0);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_fee_set_once() {
        let (_dir, ledger) = ledger(2);
        let car = plate("AB12CD");

        ledger.entry_at(&car, noon()).await.unwrap();
        ledger
            .exit_at(&car, noon() + Duration::minutes(30))
            .await
            .unwrap();
        ledger
            .entry_at(&car, noon() + Duration::hours(2))
            .await
            .unwrap();

        let history = ledger.history(&car).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].entry_time, noon() + Duration::hours(2));
        assert!(history[0].is_open());
        assert!(history[0].fee.is_none());
        assert_eq!(history[1].entry_time, noon());
        assert_eq!(history[1].fee, Some(15.0));
        assert_eq!(history[1].exit_time, Some(noon() + Duration::minutes(30)));
    }

    #[tokio::test]
    async fn concurrent_entries_never_share_a_spot() {
        let (_dir, ledger) = ledger(8);
        let mut handles = Vec::new();
        for n in 0..12u32 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.entry(&plate(&format!("{n:06X}"))).await
            }));
        }

        let mut spots = Vec::new();
        let mut full = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(spot) => spots.push(spot),
                Err(LedgerError::Full { .. }) => full += 1,
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }

        spots.sort_unstable();
        assert_eq!(spots, (1..=8).collect::<Vec<_>>());
        assert_eq!(full, 4);
        assert_eq!(ledger.open_sessions().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn failed_exit_write_leaves_vehicle_inside() {
        let (_dir, ledger) = ledger(3);
        let car = plate("AB12CD");
        ledger.entry_at(&car, noon()).await.unwrap();
        fail_writes(&ledger, "UPDATE").await;

        let err = ledger
            .exit_at(&car, noon() + Duration::minutes(45))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));

        assert!(ledger.is_inside(&car).await.unwrap());
        assert_eq!(ledger.available_spots().await.unwrap(), 2);
        let history = ledger.history(&car).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].exit_time.is_none());
        assert!(history[0].fee.is_none());
    }

    #[tokio::test]
    async fn failed_entry_write_records_nothing() {
        let (_dir, ledger) = ledger(3);
        let car = plate("AB12CD");
        fail_writes(&ledger, "INSERT").await;

        let err = ledger.entry(&car).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));

        assert!(!ledger.is_inside(&car).await.unwrap());
        assert_eq!(ledger.available_spots().await.unwrap(), 3);
        assert!(ledger.history(&car).await.unwrap().is_empty());
    }
}
