//! Frames arriving from the camera/OCR collaborator.
//!
//! The OCR engine runs out of process; it writes one JSON object per frame:
//!
//! ```json
//! {"detections":[{"text":"AB 12CD","confidence":0.91,
//!   "bbox":[{"x":10,"y":20},{"x":130,"y":20},{"x":130,"y":60},{"x":10,"y":60}]}]}
//! ```

use std::io::BufRead;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::stabilizer::BoundingBox;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// One raw OCR hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub text: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// All OCR hits from one captured frame, in no particular order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub detections: Vec<Detection>,
}

pub fn parse_frame(line: &[u8]) -> Result<Frame> {
    serde_json::from_slice(line).context("invalid frame JSON")
}

/// Read JSON-lines frames from `reader` into `frames` until EOF or until
/// the receiving side goes away. Returns the number of frames forwarded.
///
/// Blocks the calling thread; run it on a dedicated thread, never on a
/// runtime worker. Lines that are not valid UTF-8 or not a frame are
/// logged and skipped. Only a failing reader ends the feed early.
pub fn forward_frames<R>(mut reader: R, frames: &mpsc::Sender<Frame>) -> Result<usize>
where
    R: BufRead,
{
    let mut buf = Vec::new();
    let mut forwarded = 0;
    let mut line_no = 0usize;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("failed to read frame feed after line {line_no}"))?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let trimmed = buf.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        let frame = match parse_frame(trimmed) {
            Ok(frame) => frame,
            Err(err) => {
                log_warn!("skipping feed line {line_no}: {err:#}");
                continue;
            }
        };

        if frames.blocking_send(frame).is_err() {
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}
