//! sarewt-core: Core types for dijet event datasets.
//!
//! This crate provides the paired constituent/feature event batch,
//! the named feature schema, and the selection engine that turns a
//! cut specification into a keep-mask.
//!

pub mod cuts;
pub mod error;
pub mod event;
pub mod schema;

pub use cuts::{compute_mask, Cut, CutSpec};
pub use error::{Error, Result};
pub use event::{EventBatch, JETS_PER_EVENT, PARTICLES_PER_JET};
pub use schema::{FeatureSchema, DIJET_FEATURE_NAMES};
