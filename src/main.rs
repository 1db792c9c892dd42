use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info};

use thermal_capture::config::{CaptureConfig, SessionPlan};
use thermal_capture::data::loader::load_dataset;
use thermal_capture::protocol::{CancelToken, FrameAssembler, WaitPolicy};
use thermal_capture::session::{RecordingSession, SessionConfig, SessionOutcome};
use thermal_capture::source::{self, LineSource, PortSelector, ReaderLineSource, SerialLineSource};
use thermal_capture::Label;

/// Record labeled MLX90640 thermal frames from a serial link into CSV datasets.
#[derive(Parser)]
#[command(name = "thermal-capture", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports.
    Ports,
    /// Record a flame dataset, then a no-flame dataset.
    Capture(CaptureArgs),
    /// Check dataset files and print their shape and pixel range.
    Verify {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct CaptureArgs {
    /// JSON capture plan; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial device path or name.
    #[arg(long, conflicts_with_all = ["port_index", "replay"])]
    port: Option<String>,

    /// Index into the `ports` listing.
    #[arg(long, conflicts_with = "replay")]
    port_index: Option<usize>,

    #[arg(long)]
    baud: Option<u32>,

    /// Read a recorded stream instead of a device (`-` for stdin).
    #[arg(long)]
    replay: Option<PathBuf>,

    #[arg(long)]
    flame_frames: Option<usize>,

    #[arg(long)]
    noflame_frames: Option<usize>,

    #[arg(long)]
    flame_out: Option<PathBuf>,

    #[arg(long)]
    noflame_out: Option<PathBuf>,

    /// Abort a session after this many seconds without data.
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Stop the run after this many seconds; rows already written are kept.
    #[arg(long)]
    max_duration: Option<u64>,

    /// Treat every session as confirmed instead of prompting.
    #[arg(long, short)]
    yes: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Ports => list_ports(),
        Command::Capture(args) => capture(args),
        Command::Verify { files } => verify(&files),
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// ports
// ---------------------------------------------------------------------------

fn list_ports() -> Result<()> {
    let ports = source::list_ports()?;
    for (i, port) in ports.iter().enumerate() {
        println!("{i}: {:>14} — {}", port.port_name, source::describe(port));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// capture
// ---------------------------------------------------------------------------

fn capture(args: CaptureArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => CaptureConfig::load(path)
            .with_context(|| format!("loading capture plan {}", path.display()))?,
        None => CaptureConfig::default(),
    };
    apply_overrides(&mut config, &args);

    let reading_stdin = args.replay.as_deref() == Some(Path::new("-"));
    if reading_stdin && !args.yes {
        bail!("replaying from stdin needs --yes; stdin cannot also answer prompts");
    }

    // One source and one buffer for the whole run, shared by every session.
    let mut line_source = open_source(&args, &config)?;
    let mut assembler = FrameAssembler::new();
    let policy = WaitPolicy {
        idle_timeout: config.idle_timeout(),
        cancel: config.max_duration().map(CancelToken::after),
    };

    for plan in &config.sessions {
        let confirmed = args.yes || confirm(plan)?;
        let mut session = RecordingSession::new(SessionConfig::from_plan(plan, confirmed));
        let output = session.output().display().to_string();

        let report = session.record(&mut assembler, &mut line_source, &policy, |p| {
            println!("  ✔ Recorded {p} → {output}");
        })?;

        match report.outcome {
            SessionOutcome::Completed => println!("\n✅ Saved {output}\n"),
            SessionOutcome::Aborted(reason) => {
                println!(
                    "\n⚠ {output} holds {}/{} frames ({reason:?})\n",
                    report.written, report.requested
                );
                break;
            }
        }
    }

    info!(
        "{} frames assembled, {} housekeeping words dropped, {} words left unassembled",
        assembler.frames_extracted(),
        assembler.housekeeping_discarded(),
        assembler.buffered()
    );
    Ok(())
}

fn apply_overrides(config: &mut CaptureConfig, args: &CaptureArgs) {
    if let Some(port) = &args.port {
        config.port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(secs) = args.idle_timeout {
        config.idle_timeout_secs = Some(secs);
    }
    if let Some(secs) = args.max_duration {
        config.max_duration_secs = Some(secs);
    }
    let overrides = [
        (Label::Flame, args.flame_frames, &args.flame_out),
        (Label::NoFlame, args.noflame_frames, &args.noflame_out),
    ];
    for (label, frames, output) in overrides {
        if frames.is_none() && output.is_none() {
            continue;
        }
        let plan = config.session_mut(label);
        if let Some(frames) = frames {
            plan.frames = frames;
        }
        if let Some(output) = output {
            plan.output = Some(output.clone());
        }
    }
}

fn open_source(args: &CaptureArgs, config: &CaptureConfig) -> Result<Box<dyn LineSource>> {
    if let Some(path) = &args.replay {
        let reader: Box<dyn BufRead> = if path.as_os_str() == "-" {
            Box::new(io::stdin().lock())
        } else {
            let file = File::open(path)
                .with_context(|| format!("opening replay {}", path.display()))?;
            Box::new(BufReader::new(file))
        };
        info!("Replaying {}", path.display());
        return Ok(Box::new(ReaderLineSource::new(reader)));
    }

    let port = match (&config.port, args.port_index) {
        (Some(name), _) => name.clone(),
        (None, index) => {
            let names: Vec<String> = source::list_ports()?
                .into_iter()
                .map(|p| p.port_name)
                .collect();
            let selector = index.map_or(PortSelector::Sole, PortSelector::Index);
            source::select_port(&names, &selector)?
        }
    };

    let serial = SerialLineSource::open(&port, config.baud_rate, config.read_timeout())
        .with_context(|| format!("opening serial port {port}"))?;
    println!("\n▶ Streaming from {port} …\n");
    Ok(Box::new(serial))
}

/// Ask the operator to set up the labeled condition; Enter confirms.
fn confirm(plan: &SessionPlan) -> Result<bool> {
    print!(
        "{} ({} '{}' frames), then press Enter to start… ",
        plan.label.setup_instruction(),
        plan.frames,
        plan.label
    );
    io::stdout().flush()?;

    let mut answer = String::new();
    let read = io::stdin().lock().read_line(&mut answer)?;
    Ok(read > 0)
}

// ---------------------------------------------------------------------------
// verify
// ---------------------------------------------------------------------------

fn verify(files: &[PathBuf]) -> Result<()> {
    for path in files {
        let dataset = load_dataset(path)?;
        match dataset.pixel_range() {
            Some((lo, hi)) => println!(
                "{}: {} frames, pixels {lo}..={hi}",
                path.display(),
                dataset.len()
            ),
            None => println!("{}: header only, no frames", path.display()),
        }
    }
    Ok(())
}
