//! Frame assembly by word counting.
//!
//! The sensor gives no sync marker: every reading is exactly
//! [`WORDS_PER_FRAME`] words, the first [`PIXELS_PER_FRAME`] of which are the
//! pixel grid. The assembler buffers words and cuts a record whenever enough
//! are pending.
//!
//! A single word lost or gained on the wire shifts every later boundary for
//! good. Nothing here detects or repairs that.
//!
//! # Example
//!
//! ```ignore
//! use thermal_capture::protocol::{FrameAssembler, FramePoll, WaitPolicy};
//!
//! let mut assembler = FrameAssembler::new();
//! let policy = WaitPolicy::idle_for(Duration::from_secs(5));
//!
//! match assembler.poll_frame(&mut source, &policy)? {
//!     FramePoll::Ready(frame) => println!("{frame:?}"),
//!     other => println!("no frame: {other:?}"),
//! }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use super::token;
use crate::config::{HOUSEKEEPING_WORDS, PIXELS_PER_FRAME, WORDS_PER_FRAME};
use crate::data::model::Frame;
use crate::error::{CaptureError, Result};
use crate::source::{LineSource, ReadOutcome};

// ---------------------------------------------------------------------------
// Token buffer
// ---------------------------------------------------------------------------

/// FIFO of words waiting to be assembled. Unbounded.
#[derive(Debug, Default, Clone)]
pub struct TokenBuffer {
    tokens: VecDeque<u16>,
}

impl TokenBuffer {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Append at the tail.
    pub fn extend<I: IntoIterator<Item = u16>>(&mut self, words: I) {
        self.tokens.extend(words);
    }

    /// Remove `n` words from the head, or nothing if fewer are pending.
    pub fn take_front(&mut self, n: usize) -> Option<Vec<u16>> {
        if self.tokens.len() < n {
            return None;
        }
        Some(self.tokens.drain(..n).collect())
    }

    pub fn to_vec(&self) -> Vec<u16> {
        self.tokens.iter().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

/// Shared flag that asks a waiting capture to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// A token that cancels itself once `limit` has passed.
    pub fn after(limit: Duration) -> Self {
        let token = Self::new();
        let trigger = token.clone();
        thread::spawn(move || {
            thread::sleep(limit);
            debug!("Deadline of {limit:?} reached, cancelling");
            trigger.cancel();
        });
        token
    }
}

/// How long a poll tolerates "no data yet".
#[derive(Debug, Clone, Default)]
pub struct WaitPolicy {
    /// Longest stretch without a single valid word before giving up.
    /// Lines carrying no words (sensor chatter, blank lines) do not count
    /// as data. `None` retries forever.
    pub idle_timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl WaitPolicy {
    /// Retry empty reads forever.
    pub fn forever() -> Self {
        Self::default()
    }

    pub fn idle_for(timeout: Duration) -> Self {
        Self {
            idle_timeout: Some(timeout),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Result of one [`FrameAssembler::poll_frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePoll {
    Ready(Frame),
    /// The idle timeout elapsed with no complete frame.
    Idle,
    Cancelled,
    /// The source ended before a complete frame was buffered.
    Closed,
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Owns the token buffer and turns it into frames.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: TokenBuffer,
    frames: u64,
    discarded: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Words currently pending.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Frames extracted over the assembler's lifetime.
    pub fn frames_extracted(&self) -> u64 {
        self.frames
    }

    /// Housekeeping words dropped over the assembler's lifetime.
    pub fn housekeeping_discarded(&self) -> u64 {
        self.discarded
    }

    /// Route one raw line through the token extractor into the buffer.
    pub fn push_line(&mut self, line: &str) -> usize {
        let added = token::extract_into(line, &mut self.buffer);
        trace!("+{added} words, {} pending", self.buffer.len());
        added
    }

    /// Cut one record off the head if a full one is pending.
    ///
    /// Consumes exactly [`WORDS_PER_FRAME`] words: the first
    /// [`PIXELS_PER_FRAME`] become the frame, the rest are dropped.
    pub fn try_extract(&mut self) -> Option<Frame> {
        let record = self.buffer.take_front(WORDS_PER_FRAME)?;
        let frame = Frame::from_pixels(&record[..PIXELS_PER_FRAME])?;
        self.frames += 1;
        self.discarded += HOUSEKEEPING_WORDS as u64;
        debug!(
            "Frame {} assembled, {} words left in buffer",
            self.frames,
            self.buffer.len()
        );
        Some(frame)
    }

    /// Pull lines from `source` until a frame can be cut or `policy` says stop.
    ///
    /// Already-buffered words are used first, so a source is only read when
    /// the buffer is short of a full record.
    pub fn poll_frame<S>(&mut self, source: &mut S, policy: &WaitPolicy) -> Result<FramePoll>
    where
        S: LineSource + ?Sized,
    {
        let mut last_data = Instant::now();
        loop {
            if let Some(frame) = self.try_extract() {
                return Ok(FramePoll::Ready(frame));
            }
            if policy.cancelled() {
                return Ok(FramePoll::Cancelled);
            }
            match source.read_line()? {
                ReadOutcome::Line(line) => {
                    if self.push_line(&line) > 0 {
                        last_data = Instant::now();
                        continue;
                    }
                }
                ReadOutcome::Timeout => {}
                ReadOutcome::Closed => return Ok(FramePoll::Closed),
            }
            if let Some(limit) = policy.idle_timeout {
                if last_data.elapsed() >= limit {
                    debug!("No words for {limit:?}, giving up on this frame");
                    return Ok(FramePoll::Idle);
                }
            }
        }
    }

    /// Block until the next frame, retrying empty reads without limit.
    pub fn next_frame<S>(&mut self, source: &mut S) -> Result<Frame>
    where
        S: LineSource + ?Sized,
    {
        loop {
            match self.poll_frame(source, &WaitPolicy::forever())? {
                FramePoll::Ready(frame) => return Ok(frame),
                FramePoll::Closed => return Err(CaptureError::SourceClosed),
                FramePoll::Idle | FramePoll::Cancelled => continue,
            }
        }
    }
}
