use std::fmt;

use serde::Deserialize;

use crate::config::{FRAME_COLS, FRAME_ROWS, PIXELS_PER_FRAME};

// ---------------------------------------------------------------------------
// Label – the physical condition a session records
// ---------------------------------------------------------------------------

/// Ground-truth category of a capture session.
///
/// The protocol cannot check a label against reality; the operator's
/// confirmation before capture is the only link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// Target condition present.
    Flame,
    /// Target condition absent.
    NoFlame,
}

impl Label {
    /// Binary class id assigned by downstream consumers.
    pub fn class_id(self) -> u8 {
        match self {
            Label::Flame => 1,
            Label::NoFlame => 0,
        }
    }

    pub fn default_file_name(self) -> &'static str {
        match self {
            Label::Flame => "flame.csv",
            Label::NoFlame => "noflame.csv",
        }
    }

    /// Instruction shown to the operator before capture starts.
    pub fn setup_instruction(self) -> &'static str {
        match self {
            Label::Flame => "Light the flame in view of the camera",
            Label::NoFlame => "Remove or cover the flame so there is NO flame in view",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Flame => write!(f, "flame"),
            Label::NoFlame => write!(f, "no flame"),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame – one complete sensor reading
// ---------------------------------------------------------------------------

/// Row-major pixel grid.
pub type Grid = [[u16; FRAME_COLS]; FRAME_ROWS];

/// One 24 x 32 reading of raw sensor words.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    grid: Box<Grid>,
}

impl Frame {
    /// Build a frame from exactly [`PIXELS_PER_FRAME`] row-major values.
    ///
    /// Returns `None` for any other length; frames never exist partially.
    pub fn from_pixels(pixels: &[u16]) -> Option<Self> {
        if pixels.len() != PIXELS_PER_FRAME {
            return None;
        }
        let mut grid = Box::new([[0u16; FRAME_COLS]; FRAME_ROWS]);
        for (row, chunk) in grid.iter_mut().zip(pixels.chunks_exact(FRAME_COLS)) {
            row.copy_from_slice(chunk);
        }
        Some(Self { grid })
    }

    pub fn get(&self, row: usize, col: usize) -> Option<u16> {
        self.grid.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Row-major flattening: 768 values, row 0 first.
    pub fn pixels(&self) -> impl Iterator<Item = u16> + '_ {
        self.grid.iter().flatten().copied()
    }

    pub fn to_vec(&self) -> Vec<u16> {
        self.pixels().collect()
    }

    /// Smallest and largest pixel value.
    pub fn range(&self) -> (u16, u16) {
        self.pixels()
            .fold((u16::MAX, u16::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)))
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lo, hi) = self.range();
        f.debug_struct("Frame")
            .field("first", &self.grid[0][0])
            .field("min", &lo)
            .field("max", &hi)
            .finish()
    }
}
