pub mod connection;
pub mod helpers;
mod migrations;
pub mod models;
pub(crate) mod repositories;

pub use connection::Database;
pub use models::{DailyRevenue, ParkingSession, PlateMonthlySummary, SessionQuery};
