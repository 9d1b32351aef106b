pub mod parking_session;
pub mod report;

pub use parking_session::{minutes_between, ParkingSession, SessionQuery};
pub use report::{DailyRevenue, PlateMonthlySummary};
