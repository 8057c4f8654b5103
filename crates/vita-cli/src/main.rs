use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::{
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};
use vita_lib::{
    io::{frames as frame_io, text as text_io},
    metrics::hrv::hrv_summary,
    synth::{generate, SynthConfig},
    Frame, FrameResult, ProcessorConfig, RRSeries, RhythmStatus, VitalsProcessor,
};

#[derive(Parser)]
#[command(
    name = "vita",
    version,
    about = "Vita: vital signs from camera PPG recordings"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the estimator over a frame CSV (timestamp_ms,value[,red,ir]) from --input or stdin
    Process {
        #[arg(long)]
        input: Option<PathBuf>,
        /// TOML file overriding the default tunables
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print one summary object instead of one JSON line per frame
        #[arg(long)]
        summary: bool,
    },
    /// Write a synthetic PPG recording as frame CSV
    Simulate {
        #[arg(long, default_value_t = 60.0)]
        duration_s: f64,
        #[arg(long, default_value_t = 30.0)]
        fs: f64,
        #[arg(long, default_value_t = 72.0)]
        bpm: f64,
        #[arg(long, default_value_t = 15.0)]
        breathing_rate: f64,
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
        /// Make every n-th beat premature
        #[arg(long)]
        premature_every: Option<usize>,
        /// Also emit red/IR channels with this ratio of ratios
        #[arg(long)]
        red_ir_ratio: Option<f64>,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// HRV summary from newline-delimited RR intervals (ms)
    Hrv {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print the default configuration as TOML
    DefaultConfig,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Process {
            input,
            config,
            summary,
        } => cmd_process(input.as_deref(), config.as_deref(), summary)?,
        Commands::Simulate {
            duration_s,
            fs,
            bpm,
            breathing_rate,
            noise,
            premature_every,
            red_ir_ratio,
            seed,
            out,
        } => {
            let cfg = SynthConfig {
                fs,
                duration_s,
                heart_rate_bpm: bpm,
                breathing_rate,
                noise,
                premature_every,
                red_ir_ratio,
                seed,
                ..SynthConfig::default()
            };
            cmd_simulate(&cfg, out.as_deref())?
        }
        Commands::Hrv { input } => cmd_hrv(input.as_deref())?,
        Commands::DefaultConfig => print!("{}", ProcessorConfig::default().to_toml_string()?),
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ProcessorConfig> {
    let Some(path) = path else {
        return Ok(ProcessorConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    ProcessorConfig::from_toml_str(&text).with_context(|| format!("loading {}", path.display()))
}

fn read_frames(input: Option<&Path>) -> Result<Vec<Frame>> {
    match input {
        Some(path) => frame_io::read_frames_csv(path),
        None => frame_io::read_frames(io::stdin().lock()),
    }
}

#[derive(Serialize)]
struct SessionSummary {
    frames: u64,
    learning: bool,
    rhythm: RhythmStatus,
    arrhythmia_count: u32,
    substituted_samples: u64,
    spo2_offset: f64,
    last: Option<FrameResult>,
}

fn cmd_process(input: Option<&Path>, config: Option<&Path>, summary: bool) -> Result<()> {
    let config = load_config(config)?;
    let frames = read_frames(input)?;
    let mut processor = VitalsProcessor::new(config)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut last = None;
    for frame in frames {
        let result = processor.process_frame(frame);
        if !summary {
            serde_json::to_writer(&mut out, &result)?;
            writeln!(out)?;
        }
        last = Some(result);
    }
    info!(
        "processed {} frames, {} rhythm events",
        processor.frames_processed(),
        processor.arrhythmia_count()
    );
    if summary {
        let report = SessionSummary {
            frames: processor.frames_processed(),
            learning: processor.is_learning(),
            rhythm: processor.rhythm_status(),
            arrhythmia_count: processor.arrhythmia_count(),
            substituted_samples: processor.substituted_samples(),
            spo2_offset: processor.spo2_offset(),
            last,
        };
        writeln!(out, "{}", serde_json::to_string(&report)?)?;
    }
    out.flush()?;
    Ok(())
}

fn cmd_simulate(cfg: &SynthConfig, out: Option<&Path>) -> Result<()> {
    let frames = generate(cfg);
    match out {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            frame_io::write_frames(file, &frames)
        }
        None => frame_io::write_frames(io::stdout().lock(), &frames),
    }
}

fn read_rr(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_rr_intervals(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_rr_intervals(&buf)
        }
    }
}

fn cmd_hrv(input: Option<&Path>) -> Result<()> {
    let rr = RRSeries {
        rr_ms: read_rr(input)?,
    };
    let summary = hrv_summary(&rr);
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
