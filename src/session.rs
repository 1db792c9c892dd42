use std::fmt;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::SessionPlan;
use crate::data::model::{Frame, Label};
use crate::data::writer::{DatasetWriter, FrameSink};
use crate::error::{CaptureError, Result};
use crate::protocol::{FrameAssembler, FramePoll, WaitPolicy};
use crate::source::LineSource;

// ---------------------------------------------------------------------------
// Session configuration and state
// ---------------------------------------------------------------------------

/// Everything a labeled capture run needs, supplied up front by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub label: Label,
    /// Target frame count.
    pub frames: usize,
    pub output: PathBuf,
    /// The operator has confirmed the physical condition matches `label`.
    pub confirmed: bool,
}

impl SessionConfig {
    pub fn from_plan(plan: &SessionPlan, confirmed: bool) -> Self {
        Self {
            label: plan.label,
            frames: plan.frames,
            output: plan.output_path(),
            confirmed,
        }
    }
}

/// Lifecycle of one session. There is no way back to `AwaitingGate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingGate,
    Capturing { written: usize },
    Closed,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingGate => "awaiting gate",
            SessionState::Capturing { .. } => "capturing",
            SessionState::Closed => "closed",
        }
    }
}

/// Per-frame progress, `index` counting from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub label: Label,
    pub index: usize,
    pub total: usize,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

/// Why a session closed before its target count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// No data within the caller's idle timeout.
    Idle,
    Cancelled,
    /// The line source ended.
    SourceClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Aborted(AbortReason),
}

/// Summary of a finished session. Rows already written stay valid either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub label: Label,
    pub output: PathBuf,
    pub requested: usize,
    pub written: usize,
    pub outcome: SessionOutcome,
}

impl SessionReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == SessionOutcome::Completed
    }
}

// ---------------------------------------------------------------------------
// Recording session
// ---------------------------------------------------------------------------

/// One labeled capture run producing one dataset.
pub struct RecordingSession {
    config: SessionConfig,
    state: SessionState,
}

impl RecordingSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn output(&self) -> &Path {
        &self.config.output
    }

    /// Pass the operator gate. Without confirmation the session stays in
    /// `AwaitingGate` and nothing is written.
    pub fn open_gate(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => self.state = SessionState::AwaitingGate,
            SessionState::AwaitingGate => {}
            other => {
                return Err(CaptureError::InvalidState {
                    expected: "idle",
                    found: other.name(),
                })
            }
        }
        if !self.config.confirmed {
            warn!("'{}' session not confirmed, not capturing", self.config.label);
            return Err(CaptureError::NotConfirmed(self.config.label));
        }
        self.state = SessionState::Capturing { written: 0 };
        info!(
            "Capturing {} '{}' frames → {}",
            self.config.frames,
            self.config.label,
            self.config.output.display()
        );
        Ok(())
    }

    /// Gate, create the CSV dataset at the configured output, capture into it.
    pub fn record<S, F>(
        &mut self,
        assembler: &mut FrameAssembler,
        source: &mut S,
        policy: &WaitPolicy,
        on_progress: F,
    ) -> Result<SessionReport>
    where
        S: LineSource + ?Sized,
        F: FnMut(&Progress),
    {
        self.open_gate()?;
        let mut writer = match DatasetWriter::create(&self.config.output) {
            Ok(writer) => writer,
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e);
            }
        };
        self.capture(assembler, source, &mut writer, policy, on_progress)
    }

    /// Pull frames until the target count is written or the wait ends.
    ///
    /// Every frame is handed to `sink` as soon as it is assembled, so an
    /// early stop leaves exactly the frames captured so far.
    pub fn capture<S, K, F>(
        &mut self,
        assembler: &mut FrameAssembler,
        source: &mut S,
        sink: &mut K,
        policy: &WaitPolicy,
        mut on_progress: F,
    ) -> Result<SessionReport>
    where
        S: LineSource + ?Sized,
        K: FrameSink + ?Sized,
        F: FnMut(&Progress),
    {
        if self.state != (SessionState::Capturing { written: 0 }) {
            return Err(CaptureError::InvalidState {
                expected: "capturing",
                found: self.state.name(),
            });
        }

        let result = self.capture_frames(assembler, source, sink, policy, &mut on_progress);
        let written = match self.state {
            SessionState::Capturing { written } => written,
            _ => 0,
        };
        self.state = SessionState::Closed;
        let outcome = result?;

        match outcome {
            SessionOutcome::Completed => info!(
                "'{}' session complete: {written} frames in {}",
                self.config.label,
                self.config.output.display()
            ),
            SessionOutcome::Aborted(reason) => warn!(
                "'{}' session aborted ({reason:?}) after {written}/{} frames",
                self.config.label, self.config.frames
            ),
        }

        Ok(SessionReport {
            label: self.config.label,
            output: self.config.output.clone(),
            requested: self.config.frames,
            written,
            outcome,
        })
    }

    fn capture_frames<S, K, F>(
        &mut self,
        assembler: &mut FrameAssembler,
        source: &mut S,
        sink: &mut K,
        policy: &WaitPolicy,
        on_progress: &mut F,
    ) -> Result<SessionOutcome>
    where
        S: LineSource + ?Sized,
        K: FrameSink + ?Sized,
        F: FnMut(&Progress),
    {
        let total = self.config.frames;
        for index in 1..=total {
            let frame: Frame = match assembler.poll_frame(source, policy)? {
                FramePoll::Ready(frame) => frame,
                FramePoll::Idle => return Ok(SessionOutcome::Aborted(AbortReason::Idle)),
                FramePoll::Cancelled => return Ok(SessionOutcome::Aborted(AbortReason::Cancelled)),
                FramePoll::Closed => return Ok(SessionOutcome::Aborted(AbortReason::SourceClosed)),
            };
            sink.write_frame(&frame)?;
            self.state = SessionState::Capturing { written: index };

            let progress = Progress {
                label: self.config.label,
                index,
                total,
            };
            info!("Recorded {progress} → {}", self.config.output.display());
            on_progress(&progress);
        }
        Ok(SessionOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WORDS_PER_FRAME;
    use crate::protocol::encode_lines;
    use crate::source::ReaderLineSource;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Keeps every log record emitted while the tests run.
    struct Collector(Mutex<Vec<(log::Level, String)>>);

    impl log::Log for Collector {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if let Ok(mut records) = self.0.lock() {
                records.push((record.level(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static LOGS: Collector = Collector(Mutex::new(Vec::new()));

    fn install_collector() {
        if log::set_logger(&LOGS).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    }

    fn config(label: Label, frames: usize, confirmed: bool) -> SessionConfig {
        SessionConfig {
            label,
            frames,
            output: PathBuf::from(label.default_file_name()),
            confirmed,
        }
    }

    /// `records` raw records; record `r` carries pixel value `r` everywhere.
    fn stream(records: usize) -> ReaderLineSource<Cursor<Vec<u8>>> {
        let mut words = Vec::new();
        for r in 0..records {
            words.extend(std::iter::repeat(r as u16).take(WORDS_PER_FRAME));
        }
        let text = encode_lines(&words, 32).join("\n");
        ReaderLineSource::new(Cursor::new(text.into_bytes()))
    }

    #[test]
    fn unconfirmed_session_never_captures() {
        let mut session = RecordingSession::new(config(Label::Flame, 2, false));
        assert!(matches!(session.open_gate(), Err(CaptureError::NotConfirmed(Label::Flame))));
        assert_eq!(session.state(), SessionState::AwaitingGate);

        let mut sink: Vec<Frame> = Vec::new();
        let err = session
            .capture(
                &mut FrameAssembler::new(),
                &mut stream(2),
                &mut sink,
                &WaitPolicy::forever(),
                |_| {},
            )
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidState { .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn captures_target_count_in_order_with_progress() {
        let mut session = RecordingSession::new(config(Label::NoFlame, 3, true));
        session.open_gate().unwrap();

        let mut sink: Vec<Frame> = Vec::new();
        let mut seen = Vec::new();
        let report = session
            .capture(
                &mut FrameAssembler::new(),
                &mut stream(5),
                &mut sink,
                &WaitPolicy::forever(),
                |p| seen.push(*p),
            )
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.written, 3);
        assert_eq!(session.state(), SessionState::Closed);
        let firsts: Vec<u16> = sink.iter().map(|f| f.get(0, 0).unwrap()).collect();
        assert_eq!(firsts, vec![0, 1, 2]);
        let indices: Vec<(usize, usize)> = seen.iter().map(|p| (p.index, p.total)).collect();
        assert_eq!(indices, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn each_recorded_frame_is_logged_at_info() {
        install_collector();
        let mut session = RecordingSession::new(SessionConfig {
            output: PathBuf::from("progress-logging.csv"),
            ..config(Label::Flame, 2, true)
        });
        session.open_gate().unwrap();
        let mut sink: Vec<Frame> = Vec::new();
        session
            .capture(
                &mut FrameAssembler::new(),
                &mut stream(2),
                &mut sink,
                &WaitPolicy::forever(),
                |_| {},
            )
            .unwrap();

        let records = LOGS.0.lock().unwrap();
        let progress: Vec<&(log::Level, String)> = records
            .iter()
            .filter(|(_, msg)| msg.starts_with("Recorded") && msg.contains("progress-logging.csv"))
            .collect();
        assert_eq!(progress.len(), 2);
        assert!(progress.iter().all(|(level, _)| *level == log::Level::Info));
    }

    #[test]
    fn closed_source_keeps_partial_rows() {
        let mut session = RecordingSession::new(config(Label::Flame, 4, true));
        session.open_gate().unwrap();

        let mut sink: Vec<Frame> = Vec::new();
        let report = session
            .capture(
                &mut FrameAssembler::new(),
                &mut stream(2),
                &mut sink,
                &WaitPolicy::forever(),
                |_| {},
            )
            .unwrap();

        assert_eq!(report.outcome, SessionOutcome::Aborted(AbortReason::SourceClosed));
        assert_eq!(report.written, 2);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn zero_frames_completes_immediately() {
        let mut session = RecordingSession::new(config(Label::Flame, 0, true));
        session.open_gate().unwrap();
        let mut sink: Vec<Frame> = Vec::new();
        let report = session
            .capture(
                &mut FrameAssembler::new(),
                &mut stream(0),
                &mut sink,
                &WaitPolicy::forever(),
                |_| {},
            )
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.written, 0);
    }

    #[test]
    fn sessions_share_one_buffer() {
        let mut asm = FrameAssembler::new();
        let mut src = stream(3);

        let mut first = RecordingSession::new(config(Label::Flame, 1, true));
        first.open_gate().unwrap();
        let mut flame: Vec<Frame> = Vec::new();
        first
            .capture(&mut asm, &mut src, &mut flame, &WaitPolicy::forever(), |_| {})
            .unwrap();

        let mut second = RecordingSession::new(config(Label::NoFlame, 2, true));
        second.open_gate().unwrap();
        let mut no_flame: Vec<Frame> = Vec::new();
        second
            .capture(&mut asm, &mut src, &mut no_flame, &WaitPolicy::forever(), |_| {})
            .unwrap();

        assert_eq!(flame[0].get(0, 0), Some(0));
        assert_eq!(no_flame[0].get(0, 0), Some(1));
        assert_eq!(no_flame[1].get(0, 0), Some(2));
    }

    #[test]
    fn gate_cannot_reopen_after_close() {
        let mut session = RecordingSession::new(config(Label::Flame, 0, true));
        session.open_gate().unwrap();
        let mut sink: Vec<Frame> = Vec::new();
        session
            .capture(
                &mut FrameAssembler::new(),
                &mut stream(0),
                &mut sink,
                &WaitPolicy::forever(),
                |_| {},
            )
            .unwrap();
        assert!(matches!(
            session.open_gate(),
            Err(CaptureError::InvalidState { found: "closed", .. })
        ));
    }

    #[test]
    fn record_writes_dataset_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(Label::Flame, 2, true);
        cfg.output = dir.path().join("flame.csv");

        let mut session = RecordingSession::new(cfg);
        let report = session
            .record(&mut FrameAssembler::new(), &mut stream(2), &WaitPolicy::forever(), |_| {})
            .unwrap();
        assert!(report.is_complete());

        let ds = crate::data::loader::load_dataset(&report.output).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.frames[1].get(23, 31), Some(1));
    }
}
