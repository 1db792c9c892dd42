//! Synthesize an MLX90640-style text stream for replay captures.
//!
//! Usage:
//!   cargo run --bin generate_stream -- --frames 20 --flame --output flame_stream.txt
//!   thermal-capture capture --replay flame_stream.txt --flame-frames 20 --noflame-frames 0 --yes

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use thermal_capture::config::{FRAME_COLS, FRAME_ROWS, HOUSEKEEPING_WORDS, WORDS_PER_FRAME};
use thermal_capture::protocol::encode_lines;

/// Write synthetic sensor readings as hex-word lines.
#[derive(Parser)]
#[command(name = "generate_stream")]
struct Cli {
    /// Number of 834-word records.
    #[arg(long, default_value_t = 10)]
    frames: usize,

    /// Put a hot spot in view.
    #[arg(long)]
    flame: bool,

    /// Words per printed line.
    #[arg(long, default_value_t = 32)]
    per_line: usize,

    /// Omit the word at this stream offset to reproduce a desynchronized link.
    #[arg(long)]
    drop_word: Option<usize>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output file; stdout when absent.
    #[arg(long)]
    output: Option<PathBuf>,
}

/// SplitMix64: one word of state, good enough for demo noise.
struct Noise(u64);

impl Noise {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Roughly normal jitter in `[-spread, spread]`: the centred sum of four uniforms.
    fn jitter(&mut self, spread: f64) -> f64 {
        let sum: f64 = (0..4)
            .map(|_| (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64)
            .sum();
        (sum / 2.0 - 1.0) * spread
    }
}

/// Raw counts around an ambient level, plus a drifting hot spot when lit.
fn synth_pixels(noise: &mut Noise, index: usize, flame: bool) -> Vec<u16> {
    const AMBIENT: f64 = 6_500.0;
    const SPREAD: f64 = 80.0;
    const SPOT_PEAK: f64 = 9_000.0;

    let spot_row = 12.0 + 3.0 * (index as f64 * 0.3).sin();
    let spot_col = 16.0 + 4.0 * (index as f64 * 0.2).cos();

    let mut pixels = Vec::with_capacity(FRAME_ROWS * FRAME_COLS);
    for row in 0..FRAME_ROWS {
        for col in 0..FRAME_COLS {
            let mut value = AMBIENT + noise.jitter(SPREAD);
            if flame {
                let dr = (row as f64 - spot_row) / 2.0;
                let dc = (col as f64 - spot_col) / 2.5;
                value += SPOT_PEAK * (-(dr * dr + dc * dc) / 2.0).exp();
            }
            pixels.push(value.clamp(0.0, u16::MAX as f64) as u16);
        }
    }
    pixels
}

/// Control/status words trailing each record; the capture side ignores them.
fn housekeeping(index: usize) -> Vec<u16> {
    (0..HOUSEKEEPING_WORDS)
        .map(|i| match i {
            0 => 0x4D4C,
            1 => (index & 0xFFFF) as u16,
            2 => (index % 2) as u16,
            _ => 0x0000,
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let mut noise = Noise(cli.seed);

    let mut words = Vec::with_capacity(cli.frames * WORDS_PER_FRAME);
    for index in 0..cli.frames {
        words.extend(synth_pixels(&mut noise, index, cli.flame));
        words.extend(housekeeping(index));
    }
    if let Some(offset) = cli.drop_word.filter(|&o| o < words.len()) {
        words.remove(offset);
        info!("Dropped word at offset {offset}; later frames will be misaligned");
    }

    let out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut out = BufWriter::new(out);
    for line in encode_lines(&words, cli.per_line) {
        writeln!(out, "{line}")?;
    }
    out.flush()?;

    info!(
        "Wrote {} records ({} words, flame: {})",
        cli.frames,
        words.len(),
        cli.flame
    );
    Ok(())
}
