use thiserror::Error;

use crate::recognition::PlateNumber;

/// Ledger outcomes the caller has to act on. Nothing here is retried.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Every spot has an open session; nothing was written
    #[error("lot is full ({total_spots} spots occupied)")]
    Full { total_spots: u32 },

    /// Exit requested for a plate that is not inside; nothing was written
    #[error("no open session for plate {plate}")]
    NotFound { plate: PlateNumber },

    /// Entry requested for a plate that already holds a spot
    #[error("plate {plate} is already parked in spot {spot}")]
    AlreadyInside { plate: PlateNumber, spot: u32 },

    /// The transaction failed and was rolled back
    #[error("storage error: {0:#}")]
    Storage(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
