//! Jet images from particle constituents.
//!
//! Each jet's constituents are binned on an eta/phi grid spanning a fixed
//! angular window around the jet axis. A cell holds the summed pT of the
//! particles falling into it, so the image encodes pT density rather than
//! particle multiplicity.
//!
//! # Binning
//!
//! `n_bins` equally spaced edges are laid over the window, which leaves
//! `n_bins - 1` bins between them. Digitization is right-inclusive: a
//! value `x` belongs to bin `i` when `edges[i] < x <= edges[i + 1]`, so a
//! value sitting exactly on an edge goes to the lower bin. Values at or
//! below the first edge, above the last edge, or NaN are not deposited.
//! The image keeps the `n_bins x n_bins` shape; its last row and column
//! stay empty.

use ndarray::{
    Array3, Array4, ArrayBase, ArrayView1, ArrayView2, ArrayView3, ArrayView4, Axis, DataMut, Ix3,
};
use sarewt_core::{Error, FeatureSchema, Result};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Imaging configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImagerConfig {
    /// Number of bin edges per axis, and the side length of the image.
    pub n_bins: usize,
    /// Lower end of the angular window (both axes).
    pub min_angle: f32,
    /// Upper end of the angular window (both axes).
    pub max_angle: f32,
    /// Particle feature column holding eta (relative to the jet axis).
    pub eta_column: usize,
    /// Particle feature column holding phi (relative to the jet axis).
    pub phi_column: usize,
    /// Particle feature column holding pT.
    pub pt_column: usize,
}

impl Default for ImagerConfig {
    fn default() -> Self {
        Self {
            n_bins: 32,
            min_angle: -0.8,
            max_angle: 0.8,
            eta_column: 0,
            phi_column: 1,
            pt_column: 2,
        }
    }
}

impl ImagerConfig {
    /// Set the number of bin edges per axis.
    #[must_use]
    pub fn with_bins(mut self, n_bins: usize) -> Self {
        self.n_bins = n_bins;
        self
    }

    /// Set the angular window.
    #[must_use]
    pub fn with_window(mut self, min_angle: f32, max_angle: f32) -> Self {
        self.min_angle = min_angle;
        self.max_angle = max_angle;
        self
    }

    /// Set the eta, phi and pT particle feature columns.
    #[must_use]
    pub fn with_columns(mut self, eta: usize, phi: usize, pt: usize) -> Self {
        self.eta_column = eta;
        self.phi_column = phi;
        self.pt_column = pt;
        self
    }

    /// Check the configuration.
    ///
    /// # Errors
    /// Returns an error if fewer than two edges are requested or the
    /// window is empty.
    pub fn validate(&self) -> Result<()> {
        if self.n_bins < 2 {
            return Err(Error::ConfigError(format!(
                "at least 2 bin edges are needed, got {}",
                self.n_bins
            )));
        }
        if self.min_angle.is_nan() || self.max_angle.is_nan() || self.min_angle >= self.max_angle
        {
            return Err(Error::ConfigError(format!(
                "invalid angular window [{}, {}]",
                self.min_angle, self.max_angle
            )));
        }
        Ok(())
    }

    fn max_column(&self) -> usize {
        self.eta_column.max(self.phi_column).max(self.pt_column)
    }
}

/// `n_bins` evenly spaced edges from `min` to `max`, both included.
///
/// Edges are computed in `f64` so inner edges do not pick up `f32`
/// rounding from the step multiplication.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bin_edges(n_bins: usize, min: f32, max: f32) -> Vec<f64> {
    let (min, max) = (f64::from(min), f64::from(max));
    match n_bins {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let step = (max - min) / (n_bins - 1) as f64;
            let mut edges: Vec<f64> = (0..n_bins).map(|i| i as f64 * step + min).collect();
            edges[n_bins - 1] = max;
            edges
        }
    }
}

/// Bin index of `value` under right-inclusive digitization.
///
/// Returns `i` with `edges[i] < value <= edges[i + 1]`, or `None` when the
/// value lies outside `(edges[0], edges[last]]` or is NaN. `edges` must be
/// sorted ascending.
#[must_use]
pub fn digitize_right(value: f32, edges: &[f64]) -> Option<usize> {
    let value = f64::from(value);
    let above = edges.partition_point(|&edge| edge < value);
    if above == 0 || above == edges.len() {
        None
    } else {
        Some(above - 1)
    }
}

/// Rasterizer turning constituent lists into pT-weighted jet images.
#[derive(Clone, Debug)]
pub struct JetImager {
    config: ImagerConfig,
    edges: Vec<f64>,
}

impl JetImager {
    /// Create an imager, precomputing the bin edges.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ImagerConfig) -> Result<Self> {
        config.validate()?;
        let edges = bin_edges(config.n_bins, config.min_angle, config.max_angle);
        Ok(Self { config, edges })
    }

    /// Image side length.
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.config.n_bins
    }

    /// Bin edges shared by both axes.
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Imaging configuration.
    #[must_use]
    pub fn config(&self) -> &ImagerConfig {
        &self.config
    }

    /// Rasterize one jet per event.
    ///
    /// `jets` has shape `[N, particles, particle_features]`; the result has
    /// shape `[N, n_bins, n_bins]` indexed `[event, eta_bin, phi_bin]`.
    ///
    /// # Errors
    /// Returns an error if the configured columns do not exist.
    pub fn rasterize(&self, jets: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        let n_features = jets.len_of(Axis(2));
        if self.config.max_column() >= n_features {
            return Err(Error::ShapeMismatch(format!(
                "imaging needs particle feature column {} but constituents have {n_features}",
                self.config.max_column()
            )));
        }

        let n_bins = self.config.n_bins;
        let mut images = Array3::<f32>::zeros((jets.len_of(Axis(0)), n_bins, n_bins));

        for (jet, mut image) in jets.outer_iter().zip(images.outer_iter_mut()) {
            for particle in jet.outer_iter() {
                let eta_bin = digitize_right(particle[self.config.eta_column], &self.edges);
                let phi_bin = digitize_right(particle[self.config.phi_column], &self.edges);
                if let (Some(eta_bin), Some(phi_bin)) = (eta_bin, phi_bin) {
                    image[[eta_bin, phi_bin]] += particle[self.config.pt_column];
                }
            }
        }

        Ok(images)
    }

    /// Rasterize every jet of every event.
    ///
    /// `constituents` has shape `[N, jets, particles, particle_features]`;
    /// the result has shape `[jets, N, n_bins, n_bins]`.
    ///
    /// # Errors
    /// Returns an error if the configured columns do not exist.
    pub fn rasterize_events(&self, constituents: ArrayView4<'_, f32>) -> Result<Array4<f32>> {
        let n_events = constituents.len_of(Axis(0));
        let n_jets = constituents.len_of(Axis(1));
        let n_bins = self.config.n_bins;

        let mut images = Array4::<f32>::zeros((n_jets, n_events, n_bins, n_bins));
        for (jet_idx, mut jet_images) in images.outer_iter_mut().enumerate() {
            let raw = self.rasterize(constituents.index_axis(Axis(1), jet_idx))?;
            jet_images.assign(&raw);
        }
        Ok(images)
    }
}

/// Divide each image by its jet's total pT.
///
/// Images whose jet pT is not strictly positive are left unscaled.
///
/// # Errors
/// Returns an error if the number of pT values differs from the number of
/// images.
pub fn normalize_by_pt<S>(images: &mut ArrayBase<S, Ix3>, jet_pt: ArrayView1<'_, f32>) -> Result<()>
where
    S: DataMut<Elem = f32>,
{
    if images.len_of(Axis(0)) != jet_pt.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} jet pT values for {} images",
            jet_pt.len(),
            images.len_of(Axis(0))
        )));
    }
    for (mut image, &pt) in images.outer_iter_mut().zip(jet_pt) {
        if pt > 0.0 {
            image /= pt;
        }
    }
    Ok(())
}

/// Normalize `[jets, N, n_bins, n_bins]` images by the `j1Pt`, `j2Pt`, ...
/// feature columns.
///
/// # Errors
/// Returns an error if a jet pT feature is missing from the schema or the
/// event counts differ.
pub fn normalize_event_images(
    images: &mut Array4<f32>,
    features: ArrayView2<'_, f32>,
    schema: &FeatureSchema,
) -> Result<()> {
    for (jet_idx, mut jet_images) in images.outer_iter_mut().enumerate() {
        let column = schema.index_of(&format!("j{}Pt", jet_idx + 1))?;
        if column >= features.ncols() {
            return Err(Error::ShapeMismatch(format!(
                "jet pT column {column} outside {} feature columns",
                features.ncols()
            )));
        }
        normalize_by_pt(&mut jet_images, features.column(column))?;
    }
    Ok(())
}
