//! Labeled MLX90640 thermal frame capture.
//!
//! The sensor prints each reading as 834 hex words (`0x1A2B`) over a serial
//! link. Words are counted into 24 x 32 frames and written as CSV datasets,
//! one file per label.
//!
//! ```text
//!  LineSource ──► token ──► FrameAssembler ──► RecordingSession ──► DatasetWriter
//!  (serial/replay)  (hex words)  (834-word records)  (label, N frames)   (p0..p767 CSV)
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod protocol;
pub mod session;
pub mod source;

pub use data::model::{Frame, Label};
pub use error::{CaptureError, Result};
pub use protocol::{CancelToken, FrameAssembler, FramePoll, WaitPolicy};
pub use session::{RecordingSession, SessionConfig, SessionOutcome, SessionReport};
pub use source::{LineSource, ReadOutcome, ReaderLineSource, SerialLineSource};
