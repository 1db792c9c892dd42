//! Line sources: where raw sensor text comes from.
//!
//! A [`LineSource`] yields one line per call, or reports that nothing
//! arrived within its read timeout. The serial implementation wraps a
//! `serialport` handle; [`ReaderLineSource`] replays any `BufRead`
//! (a recorded capture file, stdin, an in-memory buffer).

use std::io::{self, BufRead, Read};
use std::time::Duration;

use log::{debug, info};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};

use crate::error::{CaptureError, Result};

/// Pending bytes without a newline that force a cut at the last separator.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Result of asking a source for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line, terminator stripped.
    Line(String),
    /// Nothing arrived within the read timeout. Transient.
    Timeout,
    /// The source has ended and will never yield again.
    Closed,
}

/// Supplier of raw text lines.
pub trait LineSource {
    fn read_line(&mut self) -> Result<ReadOutcome>;
}

impl<S: LineSource + ?Sized> LineSource for Box<S> {
    fn read_line(&mut self) -> Result<ReadOutcome> {
        (**self).read_line()
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

// ---------------------------------------------------------------------------
// Serial port source
// ---------------------------------------------------------------------------

/// Line reader over a serial port opened with a finite read timeout.
///
/// Bytes that arrive without a terminator stay pending across timeouts, so
/// a slow link never splits a word in two. A run of [`MAX_LINE_BYTES`]
/// without a newline is cut after its last `,` or whitespace byte; the
/// unfinished word behind it stays pending.
pub struct SerialLineSource {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
    chunk: [u8; 512],
}

impl SerialLineSource {
    /// Open `path` at `baud_rate`; reads give up after `timeout`.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate).timeout(timeout).open()?;
        info!("Opened {path} at {baud_rate} baud (read timeout {timeout:?})");
        Ok(Self::from_port(port))
    }

    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self {
            port,
            pending: Vec::with_capacity(4096),
            chunk: [0u8; 512],
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = match self.pending.iter().position(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            None if self.pending.len() >= MAX_LINE_BYTES => self
                .pending
                .iter()
                .rposition(|&b| b == b',' || b.is_ascii_whitespace())
                .map_or(self.pending.len(), |pos| pos + 1),
            None => return None,
        };
        let line: Vec<u8> = self.pending.drain(..end).collect();
        Some(decode(&line))
    }
}

impl LineSource for SerialLineSource {
    fn read_line(&mut self) -> Result<ReadOutcome> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(ReadOutcome::Line(line));
            }
            match self.port.read(&mut self.chunk) {
                Ok(0) => return Ok(ReadOutcome::Timeout),
                Ok(n) => self.pending.extend_from_slice(&self.chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(ReadOutcome::Timeout),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for SerialLineSource {
    fn drop(&mut self) {
        info!(
            "Serial port {} closed",
            self.port.name().unwrap_or_else(|| "<unnamed>".into())
        );
    }
}

// ---------------------------------------------------------------------------
// Replay source
// ---------------------------------------------------------------------------

/// Line reader over any buffered reader; end of input closes the source.
pub struct ReaderLineSource<R> {
    reader: R,
    buf: Vec<u8>,
    lines: usize,
}

impl<R: BufRead> ReaderLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            lines: 0,
        }
    }

    /// Lines handed out so far.
    pub fn lines_read(&self) -> usize {
        self.lines
    }
}

impl<R: BufRead> LineSource for ReaderLineSource<R> {
    fn read_line(&mut self) -> Result<ReadOutcome> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            debug!("Replay exhausted after {} lines", self.lines);
            return Ok(ReadOutcome::Closed);
        }
        self.lines += 1;
        Ok(ReadOutcome::Line(decode(&self.buf)))
    }
}

// ---------------------------------------------------------------------------
// Port discovery
// ---------------------------------------------------------------------------

/// All serial ports on the system; none at all is a fatal condition.
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        return Err(CaptureError::NoPorts);
    }
    Ok(ports)
}

/// Human-readable description of a port.
pub fn describe(port: &SerialPortInfo) -> String {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb.product.as_deref().unwrap_or("USB serial device");
            match &usb.manufacturer {
                Some(m) => format!("{product} ({m}) [{:04x}:{:04x}]", usb.vid, usb.pid),
                None => format!("{product} [{:04x}:{:04x}]", usb.vid, usb.pid),
            }
        }
        SerialPortType::PciPort => "PCI serial port".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
        SerialPortType::Unknown => "serial port".to_string(),
    }
}

/// How the operator picked a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelector {
    Index(usize),
    /// Use the only port present.
    Sole,
}

/// Resolve a selector against discovered port names.
///
/// Ports given by name are opened directly and never go through here, so
/// devices the enumerator misses (ptys, sockets) still work.
pub fn select_port(names: &[String], selector: &PortSelector) -> Result<String> {
    if names.is_empty() {
        return Err(CaptureError::NoPorts);
    }
    match selector {
        PortSelector::Index(index) => {
            names
                .get(*index)
                .cloned()
                .ok_or(CaptureError::PortIndexOutOfRange {
                    index: *index,
                    count: names.len(),
                })
        }
        PortSelector::Sole => match names {
            [only] => Ok(only.clone()),
            _ => Err(CaptureError::AmbiguousPort(names.len())),
        },
    }
}
