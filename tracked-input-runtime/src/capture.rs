use serde::{Deserialize, Serialize};

use crate::pose::TrackedPose;
use crate::types::MovementCommand;

/// One line of a JSON-lines capture of command traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum CaptureEvent {
    LocalPose {
        peer: i32,
        pose: TrackedPose,
    },
    /// Command about to leave the local client, with the pose sampled for it.
    Outgoing {
        command: MovementCommand,
        pose: TrackedPose,
    },
    Incoming {
        peer: i32,
        command: MovementCommand,
        /// Whether the peer's active weapon is melee-class.
        #[serde(default)]
        melee: bool,
    },
    Disconnect {
        peer: i32,
    },
}

/// Parses one capture line. Blank lines and `#` comments yield `None`.
pub fn parse_capture_line(line: &str) -> serde_json::Result<Option<CaptureEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}
