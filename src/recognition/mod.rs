pub mod config;
pub mod feed;
pub mod plate;
pub mod stabilizer;

pub use config::RecognitionSettings;
pub use feed::{forward_frames, Detection, Frame};
pub use plate::PlateNumber;
pub use stabilizer::{BoundingBox, ConfirmedPlate, Point, RecognitionStabilizer};
