//! Writers for event datasets, image datasets and split file parts.

use crate::reader::DirectoryEvents;
use crate::schema::{
    CONSTITUENTS_KEY, FEATURES_KEY, FEATURE_NAMES_KEY, PARTICLE_NAMES_KEY, TRUTH_LABEL_KEY,
};
use crate::store::H5Store;
use crate::{Error, Result};
use log::info;
use ndarray::{ArrayView2, ArrayView4};
use sarewt_core::EventBatch;
use std::path::{Path, PathBuf};

/// Jet image tensor `[2, N, bins, bins]`.
pub const IMAGES_KEY: &str = "images_j1_j2";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Options applied to every numeric dataset written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteOptions {
    /// Deflate level 0-9; `None` writes contiguous uncompressed datasets.
    pub compression: Option<u8>,
    /// Byte shuffle filter ahead of deflate.
    pub shuffle: bool,
    /// Rows per HDF5 chunk along the event axis.
    pub chunk_rows: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: Some(4),
            shuffle: true,
            chunk_rows: 1024,
        }
    }
}

impl WriteOptions {
    #[must_use]
    pub fn uncompressed() -> Self {
        Self {
            compression: None,
            ..Self::default()
        }
    }

    /// Set the deflate level. Levels above 9 are clamped to 9.
    #[must_use]
    pub fn with_compression(mut self, level: u8) -> Self {
        self.compression = Some(level.min(9));
        self
    }

    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set the chunk row count. Values less than 1 are clamped to 1.
    #[must_use]
    pub fn with_chunk_rows(mut self, rows: usize) -> Self {
        self.chunk_rows = rows.max(1);
        self
    }

    /// Fallible variant of [`Self::with_compression`].
    ///
    /// # Errors
    /// Returns an error if `level` is above 9.
    pub fn try_with_compression(mut self, level: u8) -> Result<Self> {
        if level > 9 {
            return Err(Error::ConfigError(format!(
                "deflate level must be 0-9, got {level}"
            )));
        }
        self.compression = Some(level);
        Ok(self)
    }
}

/// Path of split part `index`: `out.h5` becomes `out_003.h5`.
///
/// Without an extension the suffix is appended.
#[must_use]
pub fn part_path(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{index:03}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{index:03}"),
    };
    path.with_file_name(name)
}

/// Writes an event dataset with its label lists.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_events(path: &Path, data: &DirectoryEvents, options: &WriteOptions) -> Result<()> {
    write_batch(
        path,
        &data.events,
        &data.particle_feature_names,
        &data.feature_names,
        options,
    )
}

fn write_batch(
    path: &Path,
    events: &EventBatch,
    particle_feature_names: &[String],
    feature_names: &[String],
    options: &WriteOptions,
) -> Result<()> {
    let store = H5Store::create(path)?;
    store.write_array(CONSTITUENTS_KEY, events.constituents().view(), options)?;
    store.write_labels(PARTICLE_NAMES_KEY, particle_feature_names)?;
    store.write_array(FEATURES_KEY, events.features().view(), options)?;
    store.write_labels(FEATURE_NAMES_KEY, feature_names)?;
    if let Some(labels) = events.truth_labels() {
        store.write_array(TRUTH_LABEL_KEY, labels.view(), options)?;
    }
    info!("wrote {} events to {}", events.len(), path.display());
    Ok(())
}

/// Writes jet images next to the unmodified event features.
///
/// # Errors
/// Returns an error if the image and feature event counts differ or the
/// file cannot be written.
pub fn write_images(
    path: &Path,
    images: ArrayView4<'_, f32>,
    features: ArrayView2<'_, f32>,
    feature_names: &[String],
    options: &WriteOptions,
) -> Result<()> {
    if images.shape()[1] != features.nrows() {
        return Err(Error::CoreError(sarewt_core::Error::ShapeMismatch(format!(
            "{} images per jet for {} events",
            images.shape()[1],
            features.nrows()
        ))));
    }
    // Chunking runs along the first axis, which is the jet axis here.
    let image_options = options.with_chunk_rows(1);
    let store = H5Store::create(path)?;
    store.write_array(IMAGES_KEY, images, &image_options)?;
    store.write_array(FEATURES_KEY, features, options)?;
    store.write_labels(FEATURE_NAMES_KEY, feature_names)?;
    info!("wrote {} jet image pairs to {}", features.nrows(), path.display());
    Ok(())
}

/// Number of parts needed to keep each part near `mb` megabytes.
///
/// # Errors
/// Returns an error if `mb` is not a positive finite number.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn compute_num_parts(nbytes: usize, mb: f64) -> Result<usize> {
    if !(mb.is_finite() && mb > 0.0) {
        return Err(Error::ConfigError(format!(
            "part size must be a positive number of megabytes, got {mb}"
        )));
    }
    let total_mb = nbytes as f64 / BYTES_PER_MB;
    Ok(((total_mb / mb).ceil() as usize).max(1))
}

/// Splits `data` into near-equal parts of about `mb` megabytes and writes
/// each to its part path. Returns the written paths in part order.
///
/// # Errors
/// Returns an error if `mb` is invalid or a part cannot be written.
pub fn write_file_parts(
    path: &Path,
    data: &DirectoryEvents,
    mb: f64,
    options: &WriteOptions,
) -> Result<Vec<PathBuf>> {
    let n_parts = compute_num_parts(data.events.nbytes(), mb)?;
    info!(
        "dividing {} events into {n_parts} parts of about {mb} MB",
        data.events.len()
    );
    data.events
        .split_even(n_parts)
        .iter()
        .enumerate()
        .map(|(index, part)| {
            let target = part_path(path, index);
            write_batch(
                &target,
                part,
                &data.particle_feature_names,
                &data.feature_names,
                options,
            )?;
            Ok(target)
        })
        .collect()
}

/// Writes one streamed chunk to part path `index` of `path`.
///
/// # Errors
/// Returns an error if the part cannot be written.
pub fn write_part(
    path: &Path,
    index: usize,
    events: &EventBatch,
    particle_feature_names: &[String],
    feature_names: &[String],
    options: &WriteOptions,
) -> Result<PathBuf> {
    let target = part_path(path, index);
    write_batch(&target, events, particle_feature_names, feature_names, options)?;
    Ok(target)
}
