//! FORC CLI

mod input;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use forc_compute::{CancelToken, ComputePool, extract, preprocess};
use forc_core::{
    DriftCorrection, ExtractConfig, ForcConfig, MeasurementSet, NeighborhoodPolicy,
    PreprocessConfig, SlopeCorrection,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "forc")]
#[command(about = "FORC - first-order reversal curve distributions")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a FORC distribution
    Run {
        /// Input table of (ha, hb, m) readings
        #[arg(short, long)]
        input: PathBuf,

        /// Column delimiter of the input table (default: tab for .tsv/.tab, else comma)
        #[arg(long)]
        delimiter: Option<char>,

        /// JSON run configuration. When given, the parameter flags below are ignored.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Lattice points per axis
        #[arg(long, default_value = "100")]
        resolution: usize,

        /// Neighborhood half-width of the local fit, in samples
        #[arg(long, default_value = "3")]
        smoothing_factor: usize,

        /// Leading readings dropped from every curve
        #[arg(long, default_value = "0")]
        trim_points: usize,

        /// Scale the diagram to a maximum density of 1
        #[arg(long)]
        normalize: bool,

        /// Reversal fields closer than this belong to one curve
        #[arg(long, default_value = "1e-6")]
        hb_tolerance: f64,

        /// Unit factor applied to every density
        #[arg(long, default_value = "1.0", allow_negative_numbers = true)]
        density_scale: f64,

        /// Samples used by each local fit
        #[arg(long, value_enum, default_value = "sample-index")]
        neighborhood: Neighborhood,

        /// Field step of the search radius (default: median applied-field step)
        #[arg(long)]
        field_step: Option<f64>,

        /// Drift correction: moving-average half-width over curve saturation points
        #[arg(long)]
        drift_kernel: Option<usize>,

        /// Drift correction: keep every n-th smoothed point as interpolation node
        #[arg(long, default_value = "3")]
        drift_density: usize,

        /// Slope correction: fit the background where |ha| exceeds this field
        #[arg(long)]
        slope_h_sat: Option<f64>,

        /// Rescale magnetization to [-1, 1]
        #[arg(long)]
        rescale: bool,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto). Use 1 for deterministic scheduling.
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Summarize the reversal curves found in a table
    Inspect {
        /// Input table of (ha, hb, m) readings
        #[arg(short, long)]
        input: PathBuf,

        /// Column delimiter of the input table (default: tab for .tsv/.tab, else comma)
        #[arg(long)]
        delimiter: Option<char>,

        /// Reversal fields closer than this belong to one curve
        #[arg(long, default_value = "1e-6")]
        hb_tolerance: f64,

        /// Leading readings dropped from every curve
        #[arg(long, default_value = "0")]
        trim_points: usize,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Neighborhood {
    SampleIndex,
    FieldDistance,
}

impl From<Neighborhood> for NeighborhoodPolicy {
    fn from(n: Neighborhood) -> Self {
        match n {
            Neighborhood::SampleIndex => NeighborhoodPolicy::SampleIndex,
            Neighborhood::FieldDistance => NeighborhoodPolicy::FieldDistance,
        }
    }
}

/// `--config` file: run parameters plus optional preprocessing.
#[derive(Debug, Clone, Deserialize)]
struct RunConfigFile {
    #[serde(flatten)]
    forc: ForcConfig,
    #[serde(default)]
    preprocess: PreprocessConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            input,
            delimiter,
            config,
            resolution,
            smoothing_factor,
            trim_points,
            normalize,
            hb_tolerance,
            density_scale,
            neighborhood,
            field_step,
            drift_kernel,
            drift_density,
            slope_h_sat,
            rescale,
            output,
            threads,
        } => {
            let (forc, pre) = match config {
                Some(path) => load_config(&path)?,
                None => (
                    ForcConfig {
                        resolution,
                        smoothing_factor,
                        trim_points,
                        normalize,
                        hb_tolerance,
                        density_scale,
                        neighborhood: neighborhood.into(),
                        field_step,
                    },
                    PreprocessConfig {
                        drift: drift_kernel.map(|kernel_size| DriftCorrection {
                            kernel_size,
                            density: drift_density,
                        }),
                        slope: slope_h_sat.map(|h_sat| SlopeCorrection { h_sat }),
                        rescale,
                    },
                ),
            };
            let delimiter = delimiter.map(delimiter_byte).transpose()?;
            cmd_run(&input, delimiter, &forc, &pre, output.as_ref(), threads)
        }
        Commands::Inspect { input, delimiter, hb_tolerance, trim_points, output } => {
            let delimiter = delimiter.map(delimiter_byte).transpose()?;
            let config = ExtractConfig { hb_tolerance, trim_points };
            cmd_inspect(&input, delimiter, &config, output.as_ref())
        }
        Commands::Version => {
            println!("forc {}", forc_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_run(
    input: &Path,
    delimiter: Option<u8>,
    config: &ForcConfig,
    pre: &PreprocessConfig,
    output: Option<&PathBuf>,
    threads: usize,
) -> Result<()> {
    config.validate()?;
    pre.validate()?;
    let pool = build_pool(threads)?;

    let data = load_measurements(input, delimiter, &config.extract_config())?;
    let data = if pre.is_noop() { data } else { preprocess::apply(&data, pre)? };

    let run = forc_compute::run(&data, config, &pool, &CancelToken::new())?;
    let dist = &run.distribution;
    let diag = &run.diagnostics;
    tracing::info!(
        present = dist.n_present(),
        missing = dist.n_missing(),
        singular = diag.outcomes.singular,
        underdetermined = diag.outcomes.underdetermined,
        "FORC distribution computed"
    );

    let (_, cols) = dist.shape();
    let rho: Vec<&[Option<f64>]> = dist.cells().chunks(cols).collect();
    let output_json = serde_json::json!({
        "config": config,
        "preprocess": pre,
        "hc_axis": dist.hc_axis(),
        "hu_axis": dist.hu_axis(),
        "rho": rho,
        "normalized": dist.is_normalized(),
        "max_density": dist.max_density(),
        "diagnostics": diag,
    });

    write_json(output, output_json)
}

fn cmd_inspect(
    input: &Path,
    delimiter: Option<u8>,
    config: &ExtractConfig,
    output: Option<&PathBuf>,
) -> Result<()> {
    let data = load_measurements(input, delimiter, config)?;
    let curves: Vec<serde_json::Value> = data
        .curves()
        .iter()
        .map(|c| {
            serde_json::json!({
                "hb": c.hb(),
                "n_points": c.len(),
                "ha_min": c.ha()[0],
                "ha_max": c.ha()[c.len() - 1],
            })
        })
        .collect();

    let output_json = serde_json::json!({
        "n_curves": data.n_curves(),
        "n_samples": data.n_samples(),
        "field_step": data.field_step(),
        "extent": data.extent(),
        "curves": curves,
        "warnings": data.warnings(),
    });

    write_json(output, output_json)
}

fn load_config(path: &Path) -> Result<(ForcConfig, PreprocessConfig)> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let file: RunConfigFile = serde_json::from_str(&json)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded run configuration");
    Ok((file.forc, file.preprocess))
}

fn delimiter_byte(c: char) -> Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| format!("delimiter must be a single ASCII character, got {c:?}"))
}

fn load_measurements(
    input: &Path,
    delimiter: Option<u8>,
    config: &ExtractConfig,
) -> Result<MeasurementSet> {
    tracing::info!(path = %input.display(), "loading samples");
    let raw = input::read_samples(input, delimiter)?;
    let data = extract(&raw, config)?;
    for w in data.warnings() {
        tracing::warn!("{w}");
    }
    tracing::info!(
        samples = raw.len(),
        curves = data.n_curves(),
        warnings = data.warnings().len(),
        "curves extracted"
    );
    Ok(data)
}

fn build_pool(threads: usize) -> Result<ComputePool> {
    let threads = if threads == 0 {
        std::thread::available_parallelism().map_or(1, |n| n.get())
    } else {
        threads
    };
    let pool = ComputePool::new(threads)?;
    tracing::debug!(threads = pool.threads(), "compute pool ready");
    Ok(pool)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
