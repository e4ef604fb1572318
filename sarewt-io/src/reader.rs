//! Directory-scoped dataset reader.
//!
//! A [`DirectoryReader`] lists the files below its root on every call, reads
//! them one at a time through a [`DatasetSchema`], applies cuts and hands
//! per-file failures to its [`FailurePolicy`]. It offers full loads,
//! count-only scans and chunked streaming.

use crate::discovery::{self, DiscoveryConfig};
use crate::policy::FailurePolicy;
use crate::schema::{DatasetLabels, DatasetSchema};
use crate::store::H5Store;
use crate::stream::{ChunkBudget, ChunkLimit, EventChunks};
use crate::{Error, Result};
use log::{debug, info};
use ndarray::{concatenate, Array2, Axis};
use sarewt_core::{CutSpec, EventBatch, FeatureSchema};
use std::path::{Path, PathBuf};

/// Events of a whole directory together with their column names.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectoryEvents {
    pub events: EventBatch,
    pub particle_feature_names: Vec<String>,
    pub feature_names: Vec<String>,
}

/// Event features of a whole directory together with their names.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectoryFeatures {
    pub features: Array2<f32>,
    pub feature_names: Vec<String>,
}

/// Outcome of a count-only scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DirectoryCount {
    /// Files that were read.
    pub files: usize,
    /// Events passing the cuts.
    pub events: usize,
    /// Files skipped because they could not be read.
    pub skipped: usize,
}

/// Rejects batches whose per-event layout differs from the first
/// non-empty batch seen.
#[derive(Debug, Default)]
pub(crate) struct LayoutCheck {
    template: Option<EventBatch>,
}

impl LayoutCheck {
    pub(crate) fn admit(&mut self, batch: &EventBatch) -> sarewt_core::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        match &self.template {
            Some(template) => template.check_compatible(batch),
            None => {
                self.template = Some(batch.take(&[0]));
                Ok(())
            }
        }
    }
}

/// Reader over every dataset file below a root directory.
#[derive(Clone, Debug)]
pub struct DirectoryReader {
    root: PathBuf,
    schema: DatasetSchema,
    feature_schema: FeatureSchema,
    discovery: DiscoveryConfig,
    policy: FailurePolicy,
}

impl DirectoryReader {
    /// Creates a reader for `root` with the standard layout. No file is
    /// touched until a read is requested.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            schema: DatasetSchema::standard(),
            feature_schema: FeatureSchema::default(),
            discovery: DiscoveryConfig::default(),
            policy: FailurePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: DatasetSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Names of the event feature columns used to evaluate cuts.
    #[must_use]
    pub fn with_feature_schema(mut self, feature_schema: FeatureSchema) -> Self {
        self.feature_schema = feature_schema;
        self
    }

    #[must_use]
    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    #[must_use]
    pub fn feature_schema(&self) -> &FeatureSchema {
        &self.feature_schema
    }

    /// Sorted dataset files below the root.
    #[must_use]
    pub fn list_files(&self) -> Vec<PathBuf> {
        discovery::list_files(&self.root, &self.discovery)
    }

    /// Reads one file and applies `cuts`, failing on any error.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, lacks a dataset, has
    /// mismatched row counts, or a cut names an unknown feature.
    pub fn read_events_from_file(&self, path: &Path, cuts: &CutSpec) -> Result<EventBatch> {
        let store = H5Store::open(path)?;
        let events = self.schema.read_events(&store)?;
        let events = self.apply_cuts(events, cuts)?;
        debug!("{}: {} events", path.display(), events.len());
        Ok(events)
    }

    /// Reads one file under the reader's failure policy.
    ///
    /// `Ok(None)` means the file was skipped.
    ///
    /// # Errors
    /// Returns an error if the policy does not skip the failure.
    pub fn read_file(&self, path: &Path, cuts: &CutSpec) -> Result<Option<EventBatch>> {
        self.policy.apply(path, self.read_events_from_file(path, cuts))
    }

    pub(crate) fn read_admitted(
        &self,
        path: &Path,
        cuts: &CutSpec,
        layout: &mut LayoutCheck,
    ) -> Result<Option<EventBatch>> {
        let outcome = self.read_events_from_file(path, cuts).and_then(|events| {
            layout.admit(&events)?;
            Ok(events)
        });
        self.policy.apply(path, outcome)
    }

    /// Label lists of one file.
    ///
    /// # Errors
    /// Returns an error if the file or its label datasets cannot be read.
    pub fn read_labels_from_file(&self, path: &Path) -> Result<DatasetLabels> {
        let store = H5Store::open(path)?;
        self.schema.read_labels(&store)
    }

    /// Label lists of the first file that provides them. Empty lists if no
    /// file does.
    ///
    /// # Errors
    /// Returns an error only under [`FailurePolicy::Abort`].
    pub fn read_labels_from_dir(&self) -> Result<DatasetLabels> {
        for path in self.list_files() {
            if let Some(labels) = self.policy.apply(&path, self.read_labels_from_file(&path))? {
                return Ok(labels);
            }
        }
        Ok(DatasetLabels::default())
    }

    /// Loads every selected event below the root in file order.
    ///
    /// With `read_n` set, reading stops as soon as that many events are
    /// collected and the result holds exactly `read_n` events (or fewer if
    /// the directory runs out).
    ///
    /// # Errors
    /// Returns an error if the policy does not skip a failing file or a cut
    /// names an unknown feature.
    pub fn load_all(&self, read_n: Option<usize>, cuts: &CutSpec) -> Result<DirectoryEvents> {
        let files = self.list_files();
        info!("reading {} files from {}", files.len(), self.root.display());

        let mut layout = LayoutCheck::default();
        let mut parts = Vec::new();
        let mut total = 0usize;

        for path in &files {
            if read_n.is_some_and(|n| total >= n) {
                break;
            }
            let Some(events) = self.read_admitted(path, cuts, &mut layout)? else {
                continue;
            };
            total += events.len();
            parts.push(events);
        }

        let labels = self.read_labels_from_dir()?;
        let mut events = EventBatch::concat(parts)?.unwrap_or_else(|| {
            EventBatch::empty(
                labels.particle_feature_names.len(),
                labels.feature_names.len(),
            )
        });
        if let Some(n) = read_n {
            events.truncate(n);
        }
        info!("read {} events from {}", events.len(), self.root.display());

        Ok(DirectoryEvents {
            events,
            particle_feature_names: labels.particle_feature_names,
            feature_names: labels.feature_names,
        })
    }

    /// Loads only the event feature matrix of every file.
    ///
    /// # Errors
    /// Same conditions as [`Self::load_all`].
    pub fn load_features(&self, read_n: Option<usize>, cuts: &CutSpec) -> Result<DirectoryFeatures> {
        let files = self.list_files();
        let mut parts: Vec<Array2<f32>> = Vec::new();
        let mut total = 0usize;

        for path in &files {
            if read_n.is_some_and(|n| total >= n) {
                break;
            }
            let width = parts.first().map(Array2::ncols);
            let outcome = self.read_features_from_file(path, cuts).and_then(|features| {
                match width {
                    Some(width) if features.nrows() > 0 && features.ncols() != width => {
                        Err(Error::CoreError(sarewt_core::Error::ShapeMismatch(format!(
                            "{} features do not match {width} features",
                            features.ncols()
                        ))))
                    }
                    _ => Ok(features),
                }
            });
            let Some(features) = self.policy.apply(path, outcome)? else {
                continue;
            };
            if features.nrows() == 0 {
                continue;
            }
            total += features.nrows();
            parts.push(features);
        }

        let feature_names = self.read_labels_from_dir()?.feature_names;
        let mut features = if parts.is_empty() {
            Array2::zeros((0, feature_names.len()))
        } else {
            let views: Vec<_> = parts.iter().map(|a| a.view()).collect();
            concatenate(Axis(0), &views)?
        };
        if let Some(n) = read_n {
            if n < features.nrows() {
                features = features.slice(ndarray::s![..n, ..]).to_owned();
            }
        }

        Ok(DirectoryFeatures {
            features,
            feature_names,
        })
    }

    /// Counts selected events without reading constituents.
    ///
    /// `recursive` overrides the reader's discovery setting for this call.
    ///
    /// # Errors
    /// Returns an error if the policy does not skip a failing file or a cut
    /// names an unknown feature.
    pub fn count(&self, cuts: &CutSpec, recursive: bool) -> Result<DirectoryCount> {
        let discovery = self.discovery.clone().with_recursive(recursive);
        let mut count = DirectoryCount::default();

        for path in discovery::list_files(&self.root, &discovery) {
            let outcome = self
                .read_features_from_file(&path, cuts)
                .map(|features| features.nrows());
            match self.policy.apply(&path, outcome)? {
                Some(events) => {
                    count.files += 1;
                    count.events += events;
                }
                None => count.skipped += 1,
            }
        }
        info!(
            "{}: {} events in {} files",
            self.root.display(),
            count.events,
            count.files
        );
        Ok(count)
    }

    /// Streams the directory in chunks of exactly `chunk_n` events; only
    /// the last chunk may be smaller.
    ///
    /// # Errors
    /// Returns an error if `chunk_n` is 0.
    pub fn stream_by_count(&self, chunk_n: usize, cuts: &CutSpec) -> Result<EventChunks<'_>> {
        if chunk_n == 0 {
            return Err(Error::ConfigError(
                "chunk size must be at least one event".to_string(),
            ));
        }
        Ok(EventChunks::new(
            self,
            self.list_files(),
            cuts.clone(),
            ChunkLimit::Events(chunk_n),
        ))
    }

    /// Streams the directory in chunks whose array payload fits `budget`.
    ///
    /// # Errors
    /// Returns an error if the budget cannot be resolved.
    pub fn stream_by_size(&self, budget: &ChunkBudget, cuts: &CutSpec) -> Result<EventChunks<'_>> {
        let bytes = budget.resolve_bytes()?;
        debug!("streaming {} with a {bytes} byte budget", self.root.display());
        Ok(EventChunks::new(
            self,
            self.list_files(),
            cuts.clone(),
            ChunkLimit::Bytes(bytes),
        ))
    }

    fn read_features_from_file(&self, path: &Path, cuts: &CutSpec) -> Result<Array2<f32>> {
        let store = H5Store::open(path)?;
        let features = self.schema.read_features(&store)?;
        if cuts.is_empty() {
            return Ok(features);
        }
        let mask = cuts.mask(features.view(), &self.feature_schema)?;
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        Ok(features.select(Axis(0), &keep))
    }

    fn apply_cuts(&self, events: EventBatch, cuts: &CutSpec) -> Result<EventBatch> {
        if cuts.is_empty() {
            return Ok(events);
        }
        let mask = cuts.mask(events.features().view(), &self.feature_schema)?;
        Ok(events.select(&mask)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{write_events, WriteOptions};
    use ndarray::Array4;
    use sarewt_core::Cut;
    use tempfile::tempdir;

    /// Writes `n` events whose mJJ runs from `first_mjj` in steps of 1.
    #[allow(clippy::cast_precision_loss)]
    fn write_fixture(path: &Path, n: usize, first_mjj: f32) {
        let constituents = Array4::from_shape_fn((n, 2, 4, 3), |(i, jet, p, f)| {
            first_mjj + i as f32 + (jet * 100 + p * 10 + f) as f32 * 0.001
        });
        let features = Array2::from_shape_fn((n, 11), |(i, col)| match col {
            0 => first_mjj + i as f32,
            9 => if i % 2 == 0 { 0.5 } else { 2.0 },
            _ => 500.0,
        });
        let events = DirectoryEvents {
            events: EventBatch::new(constituents, features).unwrap(),
            particle_feature_names: vec!["eta".into(), "phi".into(), "pt".into()],
            feature_names: sarewt_core::DIJET_FEATURE_NAMES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        };
        write_events(path, &events, &WriteOptions::default()).unwrap();
    }

    #[test]
    fn load_all_preserves_file_order_and_labels() {
        let dir = tempdir().unwrap();
        write_fixture(&dir.path().join("b.h5"), 3, 2000.0);
        write_fixture(&dir.path().join("a.h5"), 2, 1000.0);

        let loaded = DirectoryReader::new(dir.path())
            .load_all(None, &CutSpec::new())
            .unwrap();
        assert_eq!(loaded.events.len(), 5);
        let mjj: Vec<f32> = loaded.events.features().column(0).to_vec();
        assert_eq!(mjj, vec![1000.0, 1001.0, 2000.0, 2001.0, 2002.0]);
        assert_eq!(loaded.feature_names.len(), 11);
        assert_eq!(loaded.particle_feature_names, vec!["eta", "phi", "pt"]);
    }

    #[test]
    fn cuts_apply_per_file() {
        let dir = tempdir().unwrap();
        write_fixture(&dir.path().join("a.h5"), 10, 1095.0);

        let reader = DirectoryReader::new(dir.path());
        let cuts = CutSpec::new().with(Cut::Mjj, 1100.0);
        let loaded = reader.load_all(None, &cuts).unwrap();
        assert_eq!(loaded.events.len(), 4);
        assert!(loaded.events.features().column(0).iter().all(|&m| m > 1100.0));

        let count = reader.count(&cuts, true).unwrap();
        assert_eq!(count.events, 4);
        assert_eq!(count.files, 1);
    }

    #[test]
    fn read_n_truncates_exactly() {
        let dir = tempdir().unwrap();
        write_fixture(&dir.path().join("a.h5"), 6, 0.0);
        write_fixture(&dir.path().join("b.h5"), 6, 100.0);
        write_fixture(&dir.path().join("c.h5"), 6, 200.0);

        let reader = DirectoryReader::new(dir.path());
        let loaded = reader.load_all(Some(8), &CutSpec::new()).unwrap();
        assert_eq!(loaded.events.len(), 8);
        assert_eq!(loaded.events.features()[[7, 0]], 101.0);
        assert_eq!(loaded.events.constituents()[[7, 0, 0, 0]], 101.0);

        let features = reader.load_features(Some(8), &CutSpec::new()).unwrap();
        assert_eq!(features.features, loaded.events.features().clone());
    }

    #[test]
    fn empty_directory_gives_empty_result() {
        let dir = tempdir().unwrap();
        let reader = DirectoryReader::new(dir.path());
        let loaded = reader.load_all(None, &CutSpec::new()).unwrap();
        assert!(loaded.events.is_empty());
        assert!(loaded.feature_names.is_empty());
        assert_eq!(reader.count(&CutSpec::new(), true).unwrap(), DirectoryCount::default());
        assert_eq!(reader.stream_by_count(5, &CutSpec::new()).unwrap().count(), 0);
    }

    #[test]
    fn corrupt_file_is_skipped_or_aborts() {
        let dir = tempdir().unwrap();
        write_fixture(&dir.path().join("a.h5"), 4, 0.0);
        std::fs::write(dir.path().join("b.h5"), b"garbage").unwrap();

        let reader = DirectoryReader::new(dir.path());
        assert_eq!(reader.load_all(None, &CutSpec::new()).unwrap().events.len(), 4);
        let count = reader.count(&CutSpec::new(), true).unwrap();
        assert_eq!((count.files, count.events, count.skipped), (1, 4, 1));

        let strict = reader.clone().with_policy(FailurePolicy::Abort);
        assert!(strict.load_all(None, &CutSpec::new()).is_err());
    }

    #[test]
    fn file_with_other_layout_is_skipped() {
        let dir = tempdir().unwrap();
        write_fixture(&dir.path().join("a.h5"), 4, 0.0);
        let store = H5Store::create(dir.path().join("b.h5")).unwrap();
        let opts = WriteOptions::default();
        store
            .write_array("jetConstituentsList", Array4::<f32>::zeros((3, 2, 7, 3)).view(), &opts)
            .unwrap();
        store
            .write_array("eventFeatures", Array2::<f32>::zeros((3, 11)).view(), &opts)
            .unwrap();
        drop(store);

        let loaded = DirectoryReader::new(dir.path())
            .load_all(None, &CutSpec::new())
            .unwrap();
        assert_eq!(loaded.events.len(), 4);
    }

    #[test]
    fn unknown_feature_in_cut_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        write_fixture(&dir.path().join("a.h5"), 4, 0.0);
        let reader = DirectoryReader::new(dir.path())
            .with_feature_schema(FeatureSchema::new(["m", "pt"]));
        let cuts = CutSpec::new().with(Cut::Mjj, 1.0);
        assert!(reader.load_all(None, &cuts).is_err());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let dir = tempdir().unwrap();
        let reader = DirectoryReader::new(dir.path());
        assert!(reader.stream_by_count(0, &CutSpec::new()).is_err());
    }

    #[test]
    fn zero_read_n_still_returns_labels() {
        let dir = tempdir().unwrap();
        write_fixture(&dir.path().join("a.h5"), 4, 0.0);

        let reader = DirectoryReader::new(dir.path());
        let loaded = reader.load_all(Some(0), &CutSpec::new()).unwrap();
        assert!(loaded.events.is_empty());
        assert_eq!(loaded.events.features().ncols(), 11);
        assert_eq!(loaded.feature_names.len(), 11);
        assert_eq!(loaded.particle_feature_names, vec!["eta", "phi", "pt"]);

        let features = reader.load_features(Some(0), &CutSpec::new()).unwrap();
        assert_eq!(features.features.shape(), &[0, 11]);
        assert_eq!(features.feature_names.len(), 11);
    }

    #[test]
    fn labels_come_from_later_file_when_cap_is_reached_early() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.h5"), b"garbage").unwrap();
        let store = H5Store::create(dir.path().join("b.h5")).unwrap();
        let opts = WriteOptions::default();
        store
            .write_array("jetConstituentsList", Array4::<f32>::zeros((5, 2, 4, 3)).view(), &opts)
            .unwrap();
        store
            .write_array("eventFeatures", Array2::<f32>::zeros((5, 11)).view(), &opts)
            .unwrap();
        drop(store);
        write_fixture(&dir.path().join("c.h5"), 3, 0.0);

        let loaded = DirectoryReader::new(dir.path())
            .load_all(Some(2), &CutSpec::new())
            .unwrap();
        assert_eq!(loaded.events.len(), 2);
        assert_eq!(loaded.feature_names.len(), 11);
        assert_eq!(loaded.particle_feature_names, vec!["eta", "phi", "pt"]);
    }

    #[test]
    fn read_file_follows_policy() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("a.h5");
        let bad = dir.path().join("b.h5");
        write_fixture(&good, 3, 1099.0);
        std::fs::write(&bad, b"garbage").unwrap();

        let reader = DirectoryReader::new(dir.path());
        let cuts = CutSpec::new().with(Cut::Mjj, 1100.0);
        assert_eq!(reader.read_file(&good, &cuts).unwrap().map(|e| e.len()), Some(1));
        assert!(reader.read_file(&bad, &cuts).unwrap().is_none());

        let strict = reader.with_policy(FailurePolicy::Abort);
        assert!(strict.read_file(&bad, &cuts).is_err());
        assert!(strict.read_file(&good, &cuts).unwrap().is_some());
    }

    #[test]
    fn labels_from_first_readable_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.h5"), b"garbage").unwrap();
        write_fixture(&dir.path().join("b.h5"), 2, 0.0);
        let labels = DirectoryReader::new(dir.path()).read_labels_from_dir().unwrap();
        assert_eq!(labels.particle_feature_names, vec!["eta", "phi", "pt"]);
    }
}
