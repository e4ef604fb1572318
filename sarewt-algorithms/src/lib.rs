//! sarewt-algorithms: Event-level transforms for dijet datasets.
//!
//! This crate provides:
//! - **Rasterization** of jet constituents into pT-weighted eta/phi images
//! - **Normalization** of jet images by the jet transverse momentum
//! - **Subsampling** of event batches by joint random permutation
//!
#![warn(missing_docs)]

pub mod raster;
mod sampling;

pub use raster::{
    bin_edges, digitize_right, normalize_by_pt, normalize_event_images, ImagerConfig, JetImager,
};
pub use sampling::subsample;
