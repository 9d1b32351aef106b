use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::config::RecognitionSettings;
use super::plate::PlateNumber;

// Per-hit rejections are noisy; keep them at debug level behind this flag.
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Quadrilateral reported by the OCR engine around a text hit, corners in
/// clockwise order starting top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox(pub [Point; 4]);

impl BoundingBox {
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self([
            Point { x, y },
            Point { x: x + width, y },
            Point {
                x: x + width,
                y: y + height,
            },
            Point { x, y: y + height },
        ])
    }

    pub fn top_left(&self) -> Point {
        self.0[0]
    }
}

/// A plate reading that survived validation and majority voting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedPlate {
    pub plate: PlateNumber,
    pub bbox: BoundingBox,
    /// Occurrences of `plate` in the window at confirmation time
    pub votes: usize,
    pub confidence: f64,
}

/// Sliding-window majority vote over recent OCR hits.
///
/// Only hits that pass the format and confidence gates enter the window.
/// A hit is confirmed when its text is the window's most frequent value
/// and has been seen at least `min_votes` times. Ties for most frequent go
/// to the value whose first occurrence is oldest in the window.
#[derive(Debug, Clone)]
pub struct RecognitionStabilizer {
    history: VecDeque<PlateNumber>,
    settings: RecognitionSettings,
}

impl Default for RecognitionStabilizer {
    fn default() -> Self {
        Self::new(RecognitionSettings::default())
    }
}

impl RecognitionStabilizer {
    pub fn new(settings: RecognitionSettings) -> Self {
        let capacity = settings.window_capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            settings: RecognitionSettings {
                window_capacity: capacity,
                ..settings
            },
        }
    }

    pub fn settings(&self) -> &RecognitionSettings {
        &self.settings
    }

    pub fn submit(&mut self, text: &str, confidence: f64, bbox: BoundingBox) -> Option<ConfirmedPlate> {
        let Some(plate) = PlateNumber::parse(text) else {
            log_debug!("discarding malformed plate reading {text:?}");
            return None;
        };

        // NaN falls through this comparison, so test the accepting side.
        if !(confidence > self.settings.min_confidence) {
            log_debug!("discarding {plate} at confidence {confidence:.2}");
            return None;
        }

        self.history.push_back(plate.clone());
        if self.history.len() > self.settings.window_capacity {
            self.history.pop_front();
        }

        let (leader, votes) = self.most_common()?;
        if *leader != plate || votes < self.settings.min_votes {
            return None;
        }

        log_info!("confirmed plate {plate} with {votes} votes");
        Some(ConfirmedPlate {
            plate,
            bbox,
            votes,
            confidence,
        })
    }

    /// Start a new capture session with an empty window.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Window contents, oldest first.
    pub fn window(&self) -> impl Iterator<Item = &PlateNumber> {
        self.history.iter()
    }

    fn most_common(&self) -> Option<(&PlateNumber, usize)> {
        let mut best: Option<(&PlateNumber, usize)> = None;
        for candidate in &self.history {
            let count = self.count_of(candidate);
            // Strictly greater keeps the earliest value among ties.
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((candidate, count));
            }
        }
        best
    }

    fn count_of(&self, plate: &PlateNumber) -> usize {
        self.history.iter().filter(|seen| *seen == plate).count()
    }
}
