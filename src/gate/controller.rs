use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    ledger::{ExitReceipt, LedgerError, OccupancyLedger},
    recognition::{Frame, PlateNumber, RecognitionStabilizer},
};

/// What happened at the barrier for one confirmed plate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GateEvent {
    Entered { plate: PlateNumber, spot: u32 },
    Exited { receipt: ExitReceipt },
    /// The ledger turned the vehicle away (lot full, nothing to close, or
    /// already parked)
    Refused { plate: PlateNumber, reason: String },
}

/// Single decision point between recognition and the ledger.
///
/// The stabilizer lock is held across the ledger call, so two confirmed
/// plates are never handled at the same time.
#[derive(Clone)]
pub struct GateController {
    stabilizer: Arc<Mutex<RecognitionStabilizer>>,
    ledger: OccupancyLedger,
}

impl GateController {
    pub fn new(stabilizer: RecognitionStabilizer, ledger: OccupancyLedger) -> Self {
        Self {
            stabilizer: Arc::new(Mutex::new(stabilizer)),
            ledger,
        }
    }

    pub fn ledger(&self) -> &OccupancyLedger {
        &self.ledger
    }

    /// Start a fresh capture session.
    pub async fn reset(&self) {
        self.stabilizer.lock().await.reset();
    }

    /// Feed one frame's hits to the stabilizer in order. The first hit that
    /// confirms ends the capture session: the rest of the frame is dropped,
    /// the window is cleared and the plate goes to the ledger once.
    ///
    /// Refusals come back as [`GateEvent::Refused`]; only storage failures
    /// are returned as errors.
    pub async fn process_frame(&self, frame: &Frame) -> Result<Option<GateEvent>, LedgerError> {
        let mut stabilizer = self.stabilizer.lock().await;

        let Some(confirmed) = frame
            .detections
            .iter()
            .find_map(|hit| stabilizer.submit(&hit.text, hit.confidence, hit.bbox))
        else {
            return Ok(None);
        };
        stabilizer.reset();

        match self.handle_plate(&confirmed.plate).await {
            Ok(event) => Ok(Some(event)),
            Err(LedgerError::Storage(err)) => Err(LedgerError::Storage(err)),
            Err(refusal) => Ok(Some(GateEvent::Refused {
                plate: confirmed.plate,
                reason: refusal.to_string(),
            })),
        }
    }

    /// Exit if the plate is parked, otherwise enter.
    pub async fn handle_plate(&self, plate: &PlateNumber) -> Result<GateEvent, LedgerError> {
        if self.ledger.is_inside(plate).await? {
            let receipt = self.ledger.exit(plate).await?;
            Ok(GateEvent::Exited { receipt })
        } else {
            let spot = self.ledger.entry(plate).await?;
            Ok(GateEvent::Entered {
                plate: plate.clone(),
                spot,
            })
        }
    }
}
