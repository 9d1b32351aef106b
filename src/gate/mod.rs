pub mod controller;
pub mod worker;

pub use controller::{GateController, GateEvent};
pub use worker::GateWorker;
