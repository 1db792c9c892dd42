use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::config::PIXELS_PER_FRAME;
use crate::error::Result;

use super::model::Frame;

// ---------------------------------------------------------------------------
// Sink seam
// ---------------------------------------------------------------------------

/// Destination for captured frames, written one at a time in capture order.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
}

impl FrameSink for Vec<Frame> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.push(frame.clone());
        Ok(())
    }
}

/// Dataset column names `p0` through `p767`.
pub fn header() -> impl Iterator<Item = String> {
    (0..PIXELS_PER_FRAME).map(|i| format!("p{i}"))
}

// ---------------------------------------------------------------------------
// CSV dataset writer
// ---------------------------------------------------------------------------

/// Writes frames as CSV rows under a fixed 768-column header.
///
/// The header and every row are flushed as soon as they are written, so a
/// run cut short still leaves a well-formed file.
pub struct DatasetWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl DatasetWriter<File> {
    /// Create (or truncate) a dataset file and write its header.
    pub fn create(path: &Path) -> Result<Self> {
        let writer = csv::Writer::from_path(path)?;
        Self::with_header(writer)
    }
}

impl<W: Write> DatasetWriter<W> {
    pub fn from_writer(inner: W) -> Result<Self> {
        Self::with_header(csv::Writer::from_writer(inner))
    }

    fn with_header(mut writer: csv::Writer<W>) -> Result<Self> {
        writer.write_record(header())?;
        writer.flush()?;
        Ok(Self { writer, rows: 0 })
    }

    /// Data rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| std::io::Error::new(e.error().kind(), e.error().to_string()).into())
    }
}

impl<W: Write> FrameSink for DatasetWriter<W> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.writer
            .write_record(frame.pixels().map(|v| v.to_string()))?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(value: u16) -> Frame {
        Frame::from_pixels(&[value; PIXELS_PER_FRAME]).unwrap()
    }

    fn written(writer: DatasetWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn header_names_every_pixel() {
        let names: Vec<String> = header().collect();
        assert_eq!(names.len(), 768);
        assert_eq!(names[0], "p0");
        assert_eq!(names[767], "p767");
    }

    #[test]
    fn empty_dataset_is_header_only() {
        let writer = DatasetWriter::from_writer(Vec::new()).unwrap();
        let text = written(writer);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("p0,p1,p2,"));
        assert!(lines[0].ends_with(",p767"));
    }

    #[test]
    fn one_row_per_frame_in_order() {
        let mut writer = DatasetWriter::from_writer(Vec::new()).unwrap();
        writer.write_frame(&frame_of(7)).unwrap();
        writer.write_frame(&frame_of(65535)).unwrap();
        assert_eq!(writer.rows(), 2);

        let text = written(writer);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(first.len(), 768);
        assert!(first.iter().all(|v| *v == "7"));
        assert!(lines[2].split(',').all(|v| v == "65535"));
    }

    #[test]
    fn rows_hit_the_file_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flame.csv");
        let mut writer = DatasetWriter::create(&path).unwrap();
        writer.write_frame(&frame_of(1)).unwrap();

        // Still open: the row must already be on disk.
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        drop(writer);
    }
}
