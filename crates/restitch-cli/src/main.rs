use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use restitch_lib::{
    io::{cat, export},
    pipeline::{self, PipelineConfig},
    ChannelRegistry,
};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "restitch",
    version,
    about = "Reconstruct dense multi-channel ECG telemetry from sparse CSV exports"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct a recording and write the dense series as CSV
    Reconstruct {
        /// Recording base name or file: .hdr/.csv pair, .cat, or .csv
        /// with embedded header records
        #[arg(long)]
        input: PathBuf,
        /// Output CSV path; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write the diagnostics report as JSON to this path
        #[arg(long)]
        diagnostics: Option<PathBuf>,
        /// Skip artifact correction and spectral cleanup
        #[arg(long)]
        raw: bool,
        /// TOML file overriding pipeline thresholds
        #[arg(long)]
        config: Option<PathBuf>,
        /// Base tick override in milliseconds
        #[arg(long)]
        tick_ms: Option<i64>,
        /// Sentinel value override
        #[arg(long)]
        sentinel: Option<f64>,
    },
    /// Ingest only and print the diagnostics report as JSON
    Inspect {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Reconstruct {
            input,
            out,
            diagnostics,
            raw,
            config,
            tick_ms,
            sentinel,
        } => {
            let cfg = load_config(config.as_deref(), tick_ms, sentinel)?;
            let recording = cat::load_recording(&input)?;
            let registry = ChannelRegistry::from_records(&recording.header)?;
            let reconstruction = if raw {
                pipeline::reconstruct(&registry, &recording.rows, &cfg)?
            } else {
                pipeline::run(&registry, &recording.rows, &cfg)?
            };

            match out {
                Some(path) => {
                    let file = fs::File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    export::write_series_csv(file, &reconstruction.record)?;
                }
                None => {
                    let stdout = io::stdout();
                    export::write_series_csv(stdout.lock(), &reconstruction.record)?;
                }
            }
            if let Some(path) = diagnostics {
                let json = serde_json::to_string_pretty(&reconstruction.diagnostics)?;
                fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        Commands::Inspect { input, config } => {
            let cfg = load_config(config.as_deref(), None, None)?;
            let recording = cat::load_recording(&input)?;
            let registry = ChannelRegistry::from_records(&recording.header)?;
            let reconstruction = pipeline::reconstruct(&registry, &recording.rows, &cfg)?;
            let json = serde_json::to_string_pretty(&reconstruction.diagnostics)?;
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn load_config(
    path: Option<&Path>,
    tick_ms: Option<i64>,
    sentinel: Option<f64>,
) -> Result<PipelineConfig> {
    let mut cfg = match path {
        Some(p) => {
            let text =
                fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(tick) = tick_ms {
        cfg.tick_ms = tick;
    }
    if let Some(s) = sentinel {
        cfg.sentinel = s;
    }
    Ok(cfg)
}
