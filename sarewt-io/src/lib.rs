//! sarewt-io: HDF5 directory datasets for sarewt.
//!
//! This crate reads dijet event files spread over a directory tree and
//! offers full loads, count-only scans and bounded-memory chunked streaming,
//! together with writers for concatenated, split and imaged datasets.
//!

pub mod concat;
pub mod discovery;
mod error;
pub mod images;
mod policy;
mod reader;
pub mod schema;
mod store;
pub mod stream;
pub mod writer;

pub use concat::{concatenate_directory, ConcatConfig, ConcatSummary};
pub use discovery::{list_files, DiscoveryConfig};
pub use error::{Error, Result};
pub use images::{ImageSerializer, ImageSummary};
pub use policy::FailurePolicy;
pub use reader::{DirectoryCount, DirectoryEvents, DirectoryFeatures, DirectoryReader};
pub use schema::{ConstituentLayout, DatasetLabels, DatasetSchema, LabelSource};
pub use store::H5Store;
pub use stream::{ChunkBudget, ChunkLimit, EventChunks};
pub use writer::{compute_num_parts, part_path, write_events, write_file_parts, write_images, WriteOptions};
