pub mod controller;
pub mod error;
pub mod fee;

pub use controller::{ExitReceipt, OccupancyLedger};
pub use error::LedgerError;
pub use fee::{calculate_fee, FeeSchedule};
