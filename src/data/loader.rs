use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::config::PIXELS_PER_FRAME;

use super::model::Frame;
use super::writer::header;

// ---------------------------------------------------------------------------
// Dataset – a captured file read back into frames
// ---------------------------------------------------------------------------

/// All frames of one dataset file, in capture order.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub frames: Vec<Frame>,
}

impl Dataset {
    /// Number of frames (data rows).
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Smallest and largest pixel across all frames, `None` when empty.
    pub fn pixel_range(&self) -> Option<(u16, u16)> {
        self.frames.iter().map(Frame::range).reduce(|(lo, hi), (a, b)| {
            (lo.min(a), hi.max(b))
        })
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Load a dataset file.
///
/// The header must be exactly `p0..p767` and every row must hold 768
/// integers in `0..=65535`.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening dataset {}", path.display()))?;
    read_dataset(file)
}

pub fn read_dataset<R: std::io::Read>(input: R) -> Result<Dataset> {
    let mut reader = csv::Reader::from_reader(input);

    let headers = reader.headers().context("reading CSV headers")?;
    if headers.len() != PIXELS_PER_FRAME {
        bail!(
            "header has {} columns, expected {PIXELS_PER_FRAME}",
            headers.len()
        );
    }
    for (i, (found, expected)) in headers.iter().zip(header()).enumerate() {
        if found != expected {
            bail!("header column {i} is '{found}', expected '{expected}'");
        }
    }

    let mut frames = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let pixels = record
            .iter()
            .enumerate()
            .map(|(col, cell)| {
                cell.trim()
                    .parse::<u16>()
                    .with_context(|| format!("Row {row_no}, p{col}: '{cell}' is not a pixel value"))
            })
            .collect::<Result<Vec<u16>>>()?;

        let frame = Frame::from_pixels(&pixels).with_context(|| {
            format!(
                "Row {row_no}: {} values, expected {PIXELS_PER_FRAME}",
                pixels.len()
            )
        })?;
        frames.push(frame);
    }

    Ok(Dataset { frames })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::writer::{DatasetWriter, FrameSink};

    fn header_line() -> String {
        header().collect::<Vec<_>>().join(",")
    }

    #[test]
    fn reads_back_written_frames() {
        let a: Vec<u16> = (0..768).collect();
        let b: Vec<u16> = (0..768).map(|i| 65535 - i).collect();

        let mut writer = DatasetWriter::from_writer(Vec::new()).unwrap();
        writer.write_frame(&Frame::from_pixels(&a).unwrap()).unwrap();
        writer.write_frame(&Frame::from_pixels(&b).unwrap()).unwrap();
        let bytes = writer.into_inner().unwrap();

        let ds = read_dataset(bytes.as_slice()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.frames[0].to_vec(), a);
        assert_eq!(ds.frames[1].to_vec(), b);
        assert_eq!(ds.pixel_range(), Some((0, 65535)));
    }

    #[test]
    fn header_only_is_an_empty_dataset() {
        let text = format!("{}\n", header_line());
        let ds = read_dataset(text.as_bytes()).unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.pixel_range(), None);
    }

    #[test]
    fn rejects_wrong_header() {
        let text = header_line().replace("p5,", "px,");
        let err = read_dataset(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("column 5"));
    }

    #[test]
    fn rejects_out_of_range_pixel() {
        let row = std::iter::once("65536".to_string())
            .chain((1..768).map(|_| "0".to_string()))
            .collect::<Vec<_>>()
            .join(",");
        let text = format!("{}\n{row}\n", header_line());
        assert!(read_dataset(text.as_bytes()).is_err());
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let err = load_dataset(Path::new("/nonexistent/flame.csv")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/flame.csv"));
    }
}
