pub(crate) mod parking_sessions;
mod reports;
