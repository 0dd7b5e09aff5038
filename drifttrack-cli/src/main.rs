//! drifttrack CLI.
//!
//! Digitizes simulated tracker hits and reconstructs tracks from them.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use clap::{Parser, Subcommand, ValueEnum};

use drifttrack_algorithms::{process_events, ClusteringAlgorithm, PipelineConfig};
use drifttrack_io::{load_geometry, read_events, read_pipeline_config, CsvWriter};
use log::{info, LevelFilter};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    DrifttrackIo(#[from] drifttrack_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] drifttrack_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Clustering algorithm selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Algorithm {
    /// Connected components (union-find)
    Graph,
    /// Maximal neighbourhoods, clusters may share signals
    Neighbourhood,
}

impl From<Algorithm> for ClusteringAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Graph => Self::Graph,
            Algorithm::Neighbourhood => Self::Neighbourhood,
        }
    }
}

/// Wire-tracker digitization and track reconstruction.
#[derive(Parser)]
#[command(name = "drifttrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Digitize and reconstruct an event file
    Process {
        /// Geometry description (JSON)
        #[arg(short, long)]
        geometry: PathBuf,

        /// Geometry path of the tracker subdetector
        #[arg(short, long)]
        subdetector: String,

        /// Event stream (JSON)
        #[arg(short, long)]
        events: PathBuf,

        /// Directory receiving signals.csv, clusters.csv and tracks.csv
        #[arg(short, long)]
        output: PathBuf,

        /// Pipeline configuration (JSON); flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run seed
        #[arg(long)]
        seed: Option<u64>,

        /// Clustering algorithm to use
        #[arg(short, long, value_enum)]
        algorithm: Option<Algorithm>,

        /// Timing resolution (nanoseconds)
        #[arg(long)]
        sigma_tdc: Option<f64>,

        /// Temporal window for clustering (nanoseconds)
        #[arg(long)]
        time_window: Option<f64>,

        /// Maximum wire index gap inside a cluster
        #[arg(long)]
        max_wire_gap: Option<u32>,

        /// Worker threads (default: all cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Show a summary of a tracker geometry
    Info {
        /// Geometry description (JSON)
        #[arg(short, long)]
        geometry: PathBuf,

        /// Geometry path of the tracker subdetector
        #[arg(short, long)]
        subdetector: String,
    },

    /// Print the default pipeline configuration as JSON
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Process {
            geometry,
            subdetector,
            events,
            output,
            config,
            seed,
            algorithm,
            sigma_tdc,
            time_window,
            max_wire_gap,
            threads,
        } => {
            if let Some(n) = threads {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build_global()?;
            }

            let mut pipeline = match &config {
                Some(path) => read_pipeline_config(path)?,
                None => PipelineConfig::default(),
            };
            if let Some(seed) = seed {
                pipeline.seed = seed;
            }
            if let Some(algorithm) = algorithm {
                pipeline.algorithm = algorithm.into();
            }
            if let Some(sigma) = sigma_tdc {
                pipeline.digitization.sigma_tdc = sigma;
            }
            if let Some(window) = time_window {
                pipeline.clustering.time_window = window;
            }
            if let Some(gap) = max_wire_gap {
                pipeline.clustering.max_wire_gap = gap;
            }
            pipeline.validate()?;

            let start = Instant::now();
            let index = load_geometry(&geometry, &subdetector)?;
            let events = read_events(&events)?;
            info!(
                "Processing {} events with {:?} clustering, seed {}",
                events.len(),
                pipeline.algorithm,
                pipeline.seed
            );

            let outputs = process_events(&events, &index, &pipeline)?;

            std::fs::create_dir_all(&output)?;
            CsvWriter::create(output.join("signals.csv"))?.write_signals_csv(&outputs)?;
            CsvWriter::create(output.join("clusters.csv"))?.write_clusters_csv(&outputs)?;
            CsvWriter::create(output.join("tracks.csv"))?.write_tracks_csv(&outputs)?;

            let signals: usize = outputs.iter().map(|o| o.signals.len()).sum();
            let clusters: usize = outputs.iter().map(|o| o.clusters.len()).sum();
            let tracks: usize = outputs.iter().map(|o| o.tracks.len()).sum();
            let converged = outputs
                .iter()
                .flat_map(|o| &o.tracks)
                .filter(|t| t.is_converged())
                .count();
            let skipped: usize = outputs
                .iter()
                .map(|o| o.assignment.skipped_outside + o.assignment.skipped_multi_plane)
                .sum();

            let elapsed = start.elapsed();
            println!("Events:    {}", outputs.len());
            println!("Signals:   {}", signals);
            println!("Clusters:  {}", clusters);
            println!("Tracks:    {} ({} converged)", tracks, converged);
            println!("Skipped hits: {}", skipped);
            println!(
                "Time: {:.2}s ({:.0} events/s)",
                elapsed.as_secs_f64(),
                outputs.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
            );
            println!("Output written to {}", output.display());
        }

        Commands::Info {
            geometry,
            subdetector,
        } => {
            let index = load_geometry(&geometry, &subdetector)?;
            println!("Subdetector: {} ({})", index.path(), index.subdetector());
            println!("Wires:    {}", index.wires().len());
            println!("Planes:   {}", index.planes().len());
            println!("Stations: {}", index.stations().len());
            println!();
            println!("{:>8} {:>5} {:>10} {:>7}", "station", "view", "z (mm)", "wires");
            for station in index.stations() {
                for &p in &station.planes {
                    let plane = &index.planes()[p];
                    println!(
                        "{:>8} {:>5} {:>10.1} {:>7}",
                        station.id,
                        plane.view.to_string(),
                        plane.z,
                        plane.wires.len()
                    );
                }
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
        }
    }

    Ok(())
}
