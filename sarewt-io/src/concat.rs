//! Directory concatenation driver: load, select and rewrite a dataset.

use crate::reader::DirectoryReader;
use crate::stream::ChunkBudget;
use crate::writer::{write_events, write_part, WriteOptions};
use crate::Result;
use log::info;
use sarewt_core::{Cut, CutSpec};
use std::path::{Path, PathBuf};

/// Settings for [`concatenate_directory`].
#[derive(Clone, Debug, PartialEq)]
pub struct ConcatConfig {
    /// Stop after this many selected events.
    pub max_events: Option<usize>,
    /// Write parts of about this many megabytes instead of one file.
    pub part_mb: Option<f64>,
    /// Lower bound on mJJ.
    pub mjj_min: f32,
    /// Keep only |ΔηJJ| above `delta_eta`.
    pub sideband: bool,
    /// Keep only |ΔηJJ| at or below `delta_eta`.
    pub signal_region: bool,
    pub delta_eta: f32,
    pub write: WriteOptions,
}

impl Default for ConcatConfig {
    fn default() -> Self {
        Self {
            max_events: None,
            part_mb: None,
            mjj_min: 1100.0,
            sideband: false,
            signal_region: false,
            delta_eta: 1.4,
            write: WriteOptions::default(),
        }
    }
}

impl ConcatConfig {
    #[must_use]
    pub fn with_max_events(mut self, n: usize) -> Self {
        self.max_events = Some(n);
        self
    }

    #[must_use]
    pub fn with_part_mb(mut self, mb: f64) -> Self {
        self.part_mb = Some(mb);
        self
    }

    #[must_use]
    pub fn with_mjj_min(mut self, mjj: f32) -> Self {
        self.mjj_min = mjj;
        self
    }

    #[must_use]
    pub fn with_sideband(mut self, enabled: bool) -> Self {
        self.sideband = enabled;
        self
    }

    #[must_use]
    pub fn with_signal_region(mut self, enabled: bool) -> Self {
        self.signal_region = enabled;
        self
    }

    #[must_use]
    pub fn with_delta_eta(mut self, delta_eta: f32) -> Self {
        self.delta_eta = delta_eta;
        self
    }

    #[must_use]
    pub fn with_write_options(mut self, write: WriteOptions) -> Self {
        self.write = write;
        self
    }

    /// The selection applied while reading.
    #[must_use]
    pub fn cuts(&self) -> CutSpec {
        let mut cuts = CutSpec::new().with(Cut::Mjj, self.mjj_min);
        if self.sideband {
            cuts.insert(Cut::Sideband, self.delta_eta);
        }
        if self.signal_region {
            cuts.insert(Cut::SignalRegion, self.delta_eta);
        }
        cuts
    }
}

/// What [`concatenate_directory`] wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConcatSummary {
    pub events: usize,
    pub outputs: Vec<PathBuf>,
}

/// Reads every file below the reader's root, applies the configured cuts
/// and writes the result to `out`, either as a single file or as numbered
/// parts.
///
/// # Errors
/// Returns an error if reading fails under the reader's policy, the part
/// size is invalid, or an output cannot be written.
pub fn concatenate_directory(
    reader: &DirectoryReader,
    out: &Path,
    config: &ConcatConfig,
) -> Result<ConcatSummary> {
    let cuts = config.cuts();

    let Some(mb) = config.part_mb else {
        let data = reader.load_all(config.max_events, &cuts)?;
        write_events(out, &data, &config.write)?;
        return Ok(ConcatSummary {
            events: data.events.len(),
            outputs: vec![out.to_path_buf()],
        });
    };

    let budget = ChunkBudget::default().try_with_max_mb(mb)?;
    let labels = reader.read_labels_from_dir()?;
    let mut summary = ConcatSummary::default();

    let mut chunks = reader.stream_by_size(&budget, &cuts)?;
    loop {
        if config.max_events.is_some_and(|max| summary.events >= max) {
            break;
        }
        let Some(chunk) = chunks.next() else {
            break;
        };
        let mut chunk = chunk?;
        if let Some(max) = config.max_events {
            chunk.truncate(max - summary.events);
        }
        let path = write_part(
            out,
            summary.outputs.len(),
            &chunk,
            &labels.particle_feature_names,
            &labels.feature_names,
            &config.write,
        )?;
        summary.events += chunk.len();
        summary.outputs.push(path);
    }
    info!(
        "wrote {} events into {} parts",
        summary.events,
        summary.outputs.len()
    );
    Ok(summary)
}
