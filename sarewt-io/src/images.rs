//! Event-file to jet-image serialization.

use crate::schema::DatasetSchema;
use crate::store::H5Store;
use crate::writer::{write_images, WriteOptions};
use crate::Result;
use log::info;
use rand::Rng;
use sarewt_algorithms::{normalize_event_images, subsample, ImagerConfig, JetImager};
use sarewt_core::{Cut, CutSpec, FeatureSchema};
use std::path::Path;

/// Counts reported by [`ImageSerializer::read_events_write_images`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageSummary {
    /// Events in the input file.
    pub read: usize,
    /// Events imaged and written.
    pub written: usize,
}

/// Turns one event file into pT-normalized jet images.
#[derive(Clone, Debug)]
pub struct ImageSerializer {
    imager: JetImager,
    mjj_min: f32,
    schema: DatasetSchema,
    write: WriteOptions,
}

impl ImageSerializer {
    /// # Errors
    /// Returns an error if the imaging configuration is invalid.
    pub fn new(config: ImagerConfig) -> Result<Self> {
        Ok(Self {
            imager: JetImager::new(config)?,
            mjj_min: 1100.0,
            schema: DatasetSchema::standard(),
            write: WriteOptions::default(),
        })
    }

    #[must_use]
    pub fn with_mjj_min(mut self, mjj: f32) -> Self {
        self.mjj_min = mjj;
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: DatasetSchema) -> Self {
        self.schema = schema;
        self
    }

    #[must_use]
    pub fn with_write_options(mut self, write: WriteOptions) -> Self {
        self.write = write;
        self
    }

    #[must_use]
    pub fn imager(&self) -> &JetImager {
        &self.imager
    }

    /// Reads `input`, keeps at most `max_events` events chosen uniformly at
    /// random, applies the mJJ cut, images both jets, normalizes each image
    /// by its jet pT and writes `[2, N, bins, bins]` images with the
    /// unmodified features and feature names to `output`.
    ///
    /// # Errors
    /// Returns an error if the input cannot be read, its feature names do not
    /// describe its feature columns, or the output cannot be written.
    pub fn read_events_write_images<R>(
        &self,
        input: &Path,
        output: &Path,
        max_events: Option<usize>,
        rng: &mut R,
    ) -> Result<ImageSummary>
    where
        R: Rng + ?Sized,
    {
        let store = H5Store::open(input)?;
        let events = self.schema.read_events(&store)?;
        let labels = self.schema.read_labels(&store)?;
        let feature_schema = FeatureSchema::for_width(&labels.feature_names, events.features().ncols())?;
        let read = events.len();
        info!("read {read} events from {}", input.display());

        let events = match max_events {
            Some(n) => subsample(events, n, rng),
            None => events,
        };
        let cuts = CutSpec::new().with(Cut::Mjj, self.mjj_min);
        let events = events.select(&cuts.mask(events.features().view(), &feature_schema)?)?;

        let mut images = self.imager.rasterize_events(events.constituents().view())?;
        normalize_event_images(&mut images, events.features().view(), &feature_schema)?;
        write_images(
            output,
            images.view(),
            events.features().view(),
            &labels.feature_names,
            &self.write,
        )?;

        Ok(ImageSummary {
            read,
            written: events.len(),
        })
    }
}
