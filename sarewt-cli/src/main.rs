//! sarewt CLI.
//!
//! Concatenates, counts and images dijet event datasets stored as HDF5
//! files below a directory.
#![allow(clippy::cast_precision_loss)]

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sarewt_algorithms::ImagerConfig;
use sarewt_core::CutSpec;
use sarewt_io::{
    concatenate_directory, ConcatConfig, DatasetSchema, DirectoryReader, H5Store, ImageSerializer,
    WriteOptions,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    SarewtIo(#[from] sarewt_io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk layout of the input files.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Layout {
    /// jetConstituentsList / eventFeatures with stored names
    Standard,
    /// jet1_PFCands / jet2_PFCands / jet_kinematics / truth_label
    PerJet,
}

impl Layout {
    fn schema(self) -> DatasetSchema {
        match self {
            Layout::Standard => DatasetSchema::standard(),
            Layout::PerJet => DatasetSchema::per_jet(),
        }
    }
}

/// Dijet event dataset processor.
#[derive(Parser)]
#[command(name = "sarewt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log per-file progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read, select and concatenate all events below a directory
    Concat {
        /// Input directory
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long, default_value = "out.h5")]
        output: PathBuf,

        /// Maximum number of events written
        #[arg(short = 'n', long)]
        max_events: Option<usize>,

        /// Split the output into parts of about this many MB
        #[arg(long)]
        mb: Option<f64>,

        /// Keep the |dEta| sideband
        #[arg(long)]
        side: bool,

        /// Keep the |dEta| signal region
        #[arg(long)]
        signal: bool,

        /// Lower bound on mJJ
        #[arg(long, default_value_t = 1100.0)]
        mjj: f32,

        /// |dEta| threshold separating sideband and signal region
        #[arg(long, default_value_t = 1.4)]
        delta_eta: f32,

        /// Input file layout
        #[arg(long, value_enum, default_value_t = Layout::Standard)]
        layout: Layout,

        /// Deflate level of the output datasets
        #[arg(long, default_value_t = 4)]
        compression: u8,
    },

    /// Convert the jet constituents of one file to pT-normalized jet images
    Images {
        /// Input event file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long, default_value = "out.h5")]
        output: PathBuf,

        /// Number of bins per image axis
        #[arg(long, default_value_t = 32)]
        bins: usize,

        /// Maximum number of events, chosen at random
        #[arg(short = 'n', long)]
        max_events: Option<usize>,

        /// Lower bound on mJJ
        #[arg(long, default_value_t = 1100.0)]
        mjj: f32,

        /// Seed for the random subsample
        #[arg(long)]
        seed: Option<u64>,

        /// Input file layout
        #[arg(long, value_enum, default_value_t = Layout::Standard)]
        layout: Layout,
    },

    /// Count events and files in one or more directories
    Count {
        /// Sample directories
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        /// Only count files directly inside each directory
        #[arg(long)]
        no_recursive: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Input file layout
        #[arg(long, value_enum, default_value_t = Layout::Standard)]
        layout: Layout,
    },

    /// Show the datasets of an HDF5 file
    Info {
        /// Input file
        input: PathBuf,
    },
}

#[derive(Serialize)]
struct CountRow {
    sample: String,
    events: usize,
    files: usize,
    skipped: usize,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Concat {
            input,
            output,
            max_events,
            mb,
            side,
            signal,
            mjj,
            delta_eta,
            layout,
            compression,
        } => {
            info!("concatenating data in {}", input.display());
            let start = Instant::now();

            let reader = DirectoryReader::new(&input).with_schema(layout.schema());
            let mut config = ConcatConfig::default()
                .with_mjj_min(mjj)
                .with_sideband(side)
                .with_signal_region(signal)
                .with_delta_eta(delta_eta)
                .with_write_options(WriteOptions::default().try_with_compression(compression)?);
            if let Some(n) = max_events {
                config = config.with_max_events(n);
            }
            if let Some(mb) = mb {
                config = config.with_part_mb(mb);
            }

            let summary = concatenate_directory(&reader, &output, &config)?;
            println!(
                "Wrote {} events to {} file(s) in {:.2}s",
                summary.events,
                summary.outputs.len(),
                start.elapsed().as_secs_f64()
            );
            for path in &summary.outputs {
                println!("  {}", path.display());
            }
        }

        Commands::Images {
            input,
            output,
            bins,
            max_events,
            mjj,
            seed,
            layout,
        } => {
            info!("converting data in file {}", input.display());
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            let serializer = ImageSerializer::new(ImagerConfig::default().with_bins(bins))?
                .with_mjj_min(mjj)
                .with_schema(layout.schema());
            let summary =
                serializer.read_events_write_images(&input, &output, max_events, &mut rng)?;
            println!(
                "Read {} events, wrote {} event image pairs to {}",
                summary.read,
                summary.written,
                output.display()
            );
        }

        Commands::Count {
            dirs,
            no_recursive,
            json,
            layout,
        } => {
            let mut rows = Vec::with_capacity(dirs.len());
            for dir in &dirs {
                let reader = DirectoryReader::new(dir).with_schema(layout.schema());
                let count = reader.count(&CutSpec::new(), !no_recursive)?;
                let sample = dir
                    .file_name()
                    .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned());
                rows.push(CountRow {
                    sample,
                    events: count.events,
                    files: count.files,
                    skipped: count.skipped,
                });
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for row in &rows {
                    println!(
                        "{:<40}: {:>10} events in {:>10} files",
                        row.sample, row.events, row.files
                    );
                    if row.skipped > 0 {
                        println!("{:<40}  {:>10} unreadable files skipped", "", row.skipped);
                    }
                }
            }
        }

        Commands::Info { input } => {
            let store = H5Store::open(&input)?;
            let size = std::fs::metadata(&input).map_or(0, |m| m.len());

            println!("File: {}", input.display());
            println!("Size: {} bytes ({:.2} MB)", size, size as f64 / 1_000_000.0);
            for key in store.keys()? {
                let shape = store.shape(&key)?;
                match store.read_labels(&key) {
                    Ok(labels) => println!("{key}: {shape:?} [{}]", labels.join(", ")),
                    Err(_) => println!("{key}: {shape:?}"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_accepts_per_jet_layout() {
        let cli = Cli::try_parse_from([
            "sarewt", "images", "-i", "in.h5", "--layout", "per-jet", "--seed", "3",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Images {
                layout: Layout::PerJet,
                seed: Some(3),
                ..
            }
        ));
    }

    #[test]
    fn layout_defaults_to_standard() {
        let cli = Cli::try_parse_from(["sarewt", "images", "-i", "in.h5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Images {
                layout: Layout::Standard,
                bins: 32,
                ..
            }
        ));
        let cli = Cli::try_parse_from(["sarewt", "count", "a", "b"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Count {
                layout: Layout::Standard,
                ..
            }
        ));
    }
}
