//! Bounded-memory chunked streaming over a directory dataset.

use crate::reader::{DirectoryReader, LayoutCheck};
use crate::{Error, Result};
use log::debug;
use sarewt_core::{CutSpec, EventBatch};
use std::path::PathBuf;
use sysinfo::System;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Chunk size threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkLimit {
    /// Emit chunks of exactly this many events.
    Events(usize),
    /// Emit chunks whose array payload stays within this many bytes.
    Bytes(usize),
}

/// Byte budget for size-bounded streaming.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkBudget {
    /// Explicit cap in megabytes. If set, `memory_fraction` is ignored.
    pub max_mb: Option<f64>,
    /// Fraction of available system memory to target (0.0 < fraction <= 1.0).
    pub memory_fraction: f64,
}

impl Default for ChunkBudget {
    fn default() -> Self {
        Self {
            max_mb: None,
            memory_fraction: 0.25,
        }
    }
}

impl ChunkBudget {
    /// A fixed cap in megabytes.
    #[must_use]
    pub fn megabytes(mb: f64) -> Self {
        Self::default().with_max_mb(mb)
    }

    #[must_use]
    pub fn with_max_mb(mut self, mb: f64) -> Self {
        self.max_mb = Some(mb);
        self
    }

    #[must_use]
    pub fn with_memory_fraction(mut self, fraction: f64) -> Self {
        self.memory_fraction = fraction;
        self
    }

    /// Fallible variant of [`Self::with_max_mb`].
    ///
    /// # Errors
    /// Returns an error if `mb` is not a positive finite number.
    pub fn try_with_max_mb(mut self, mb: f64) -> Result<Self> {
        validate_mb(mb)?;
        self.max_mb = Some(mb);
        Ok(self)
    }

    /// Resolve the budget in bytes.
    ///
    /// # Errors
    /// Returns an error if the cap or fraction is invalid, or system memory
    /// cannot be queried.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn resolve_bytes(&self) -> Result<usize> {
        if let Some(mb) = self.max_mb {
            validate_mb(mb)?;
            return Ok(((mb * BYTES_PER_MB).floor() as usize).max(1));
        }
        if !(0.0 < self.memory_fraction && self.memory_fraction <= 1.0) {
            return Err(Error::ConfigError(
                "memory_fraction must be in (0.0, 1.0]".to_string(),
            ));
        }
        let mut system = System::new();
        system.refresh_memory();
        let available = system.available_memory();
        if available == 0 {
            return Err(Error::ConfigError(
                "available system memory reported as 0".to_string(),
            ));
        }
        let budget = (available as f64 * self.memory_fraction).floor() as u64;
        Ok(usize::try_from(budget).unwrap_or(usize::MAX).max(1))
    }
}

fn validate_mb(mb: f64) -> Result<()> {
    if mb.is_finite() && mb > 0.0 {
        Ok(())
    } else {
        Err(Error::ConfigError(format!(
            "chunk size must be a positive number of megabytes, got {mb}"
        )))
    }
}

/// Events per chunk for a byte budget: at least one.
#[must_use]
pub fn rows_for_budget(budget_bytes: usize, bytes_per_event: usize) -> usize {
    (budget_bytes / bytes_per_event.max(1)).max(1)
}

/// Iterator over consecutive chunks of a directory dataset.
///
/// Files are read one at a time into a pending batch. Whenever the pending
/// batch reaches the threshold its first rows are emitted as a chunk and the
/// remainder is kept. The last, possibly smaller, chunk is emitted once the
/// files run out. Iteration stops after the first error.
pub struct EventChunks<'a> {
    reader: &'a DirectoryReader,
    files: std::vec::IntoIter<PathBuf>,
    cuts: CutSpec,
    limit: ChunkLimit,
    rows_per_chunk: Option<usize>,
    pending: Option<EventBatch>,
    layout: LayoutCheck,
    finished: bool,
}

impl<'a> EventChunks<'a> {
    pub(crate) fn new(
        reader: &'a DirectoryReader,
        files: Vec<PathBuf>,
        cuts: CutSpec,
        limit: ChunkLimit,
    ) -> Self {
        let rows_per_chunk = match limit {
            ChunkLimit::Events(n) => Some(n),
            ChunkLimit::Bytes(_) => None,
        };
        Self {
            reader,
            files: files.into_iter(),
            cuts,
            limit,
            rows_per_chunk,
            pending: None,
            layout: LayoutCheck::default(),
            finished: false,
        }
    }

    #[must_use]
    pub fn limit(&self) -> ChunkLimit {
        self.limit
    }

    /// Events per emitted chunk, known once the first event has been read.
    #[must_use]
    pub fn rows_per_chunk(&self) -> Option<usize> {
        self.rows_per_chunk
    }

    fn take_full_chunk(&mut self) -> Option<EventBatch> {
        let rows = self.rows_per_chunk?;
        let pending = self.pending.take()?;
        if pending.len() < rows {
            self.pending = Some(pending);
            return None;
        }
        let (chunk, rest) = pending.split_at(rows);
        self.pending = Some(rest);
        Some(chunk)
    }

    fn push(&mut self, batch: EventBatch) -> Result<()> {
        if self.rows_per_chunk.is_none() && !batch.is_empty() {
            if let ChunkLimit::Bytes(budget) = self.limit {
                let rows = rows_for_budget(budget, batch.bytes_per_event());
                debug!(
                    "{} bytes per event, streaming {rows} events per chunk",
                    batch.bytes_per_event()
                );
                self.rows_per_chunk = Some(rows);
            }
        }
        match self.pending.as_mut() {
            Some(pending) => Ok(pending.append(&batch)?),
            None => {
                self.pending = Some(batch);
                Ok(())
            }
        }
    }
}

impl Iterator for EventChunks<'_> {
    type Item = Result<EventBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(chunk) = self.take_full_chunk() {
                return Some(Ok(chunk));
            }
            let Some(path) = self.files.next() else {
                self.finished = true;
                return self.pending.take().filter(|p| !p.is_empty()).map(Ok);
            };
            let outcome = match self.reader.read_admitted(&path, &self.cuts, &mut self.layout) {
                Ok(Some(batch)) => self.push(batch),
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                self.finished = true;
                return Some(Err(err));
            }
        }
    }
}
