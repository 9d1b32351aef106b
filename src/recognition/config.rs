use serde::{Deserialize, Serialize};

/// Tunable thresholds for plate debouncing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognitionSettings {
    /// How many accepted hits the voting window remembers
    pub window_capacity: usize,

    /// Votes a reading needs inside the window before it is confirmed
    pub min_votes: usize,

    /// Hits at or below this OCR confidence are discarded
    pub min_confidence: f64,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            window_capacity: 10,
            min_votes: 3,
            min_confidence: 0.5,
        }
    }
}
