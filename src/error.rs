//! Error types for thermal-capture.

use thiserror::Error;

use crate::data::model::Label;

/// Main error type for capture operations.
///
/// Malformed tokens and empty serial reads are not errors; they are dropped
/// and retried respectively.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// I/O error on the serial link, a replay stream or a dataset file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port enumeration or open failure.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Dataset write failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Capture plan could not be parsed.
    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no serial ports found")]
    NoPorts,

    #[error("port index {index} out of range ({count} ports available)")]
    PortIndexOutOfRange { index: usize, count: usize },

    /// Several ports are present and none was selected.
    #[error("{0} serial ports found; select one by name or index")]
    AmbiguousPort(usize),

    /// The operator did not confirm the labeled condition.
    #[error("'{0}' session not confirmed by the operator")]
    NotConfirmed(Label),

    #[error("invalid session state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },

    /// The line source reached end of stream.
    #[error("line source closed")]
    SourceClosed,
}

/// Result type alias using CaptureError.
pub type Result<T> = std::result::Result<T, CaptureError>;
