use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::data::model::Label;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// Sensor grid height.
pub const FRAME_ROWS: usize = 24;
/// Sensor grid width.
pub const FRAME_COLS: usize = 32;
/// Pixels per frame, row-major.
pub const PIXELS_PER_FRAME: usize = FRAME_ROWS * FRAME_COLS;
/// Words the sensor emits per reading: the pixel grid followed by housekeeping.
pub const WORDS_PER_FRAME: usize = 834;
/// Trailing words of every raw record that never reach the dataset.
pub const HOUSEKEEPING_WORDS: usize = WORDS_PER_FRAME - PIXELS_PER_FRAME;

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_SERIAL_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_FRAMES_PER_SESSION: usize = 100;

// ---------------------------------------------------------------------------
// Capture plan
// ---------------------------------------------------------------------------

/// One labeled session in a capture plan.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionPlan {
    pub label: Label,
    #[serde(default = "default_frames")]
    pub frames: usize,
    /// Dataset path; falls back to the label's default file name.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl SessionPlan {
    pub fn new(label: Label, frames: usize) -> Self {
        Self {
            label,
            frames,
            output: None,
        }
    }

    /// Resolved dataset path.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.label.default_file_name()))
    }
}

/// Everything a capture run needs, loadable from a JSON file.
///
/// ```json
/// {
///   "port": "/dev/ttyACM0",
///   "baud_rate": 115200,
///   "timeout_ms": 200,
///   "max_duration_secs": 900,
///   "sessions": [
///     { "label": "flame", "frames": 200, "output": "flame.csv" },
///     { "label": "noflame", "frames": 200 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Per-read serial timeout in milliseconds.
    pub timeout_ms: u64,
    /// How long a session tolerates consecutive empty reads. `None` waits forever.
    pub idle_timeout_secs: Option<u64>,
    /// Wall-clock limit for the whole run; sessions still open when it
    /// passes end as cancelled. `None` means no limit.
    pub max_duration_secs: Option<u64>,
    pub sessions: Vec<SessionPlan>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_SERIAL_TIMEOUT.as_millis() as u64,
            idle_timeout_secs: None,
            max_duration_secs: None,
            sessions: vec![
                SessionPlan::new(Label::Flame, DEFAULT_FRAMES_PER_SESSION),
                SessionPlan::new(Label::NoFlame, DEFAULT_FRAMES_PER_SESSION),
            ],
        }
    }
}

impl CaptureConfig {
    /// Read a capture plan from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }

    /// The plan entry for `label`, inserted at the end if absent.
    pub fn session_mut(&mut self, label: Label) -> &mut SessionPlan {
        let pos = match self.sessions.iter().position(|s| s.label == label) {
            Some(pos) => pos,
            None => {
                self.sessions
                    .push(SessionPlan::new(label, DEFAULT_FRAMES_PER_SESSION));
                self.sessions.len() - 1
            }
        };
        &mut self.sessions[pos]
    }
}

fn default_frames() -> usize {
    DEFAULT_FRAMES_PER_SESSION
}
