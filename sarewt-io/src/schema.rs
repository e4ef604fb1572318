//! On-disk layouts of a dijet file record.

use crate::store::H5Store;
use crate::Result;
use ndarray::{Array1, Array2, Array3, Array4, Axis, Ix1, Ix2, Ix3, Ix4};
use sarewt_core::{EventBatch, DIJET_FEATURE_NAMES};

/// Combined constituent tensor `[N, 2, 100, F]`.
pub const CONSTITUENTS_KEY: &str = "jetConstituentsList";
/// Event feature matrix `[N, F]`.
pub const FEATURES_KEY: &str = "eventFeatures";
/// Names of the event feature columns.
pub const FEATURE_NAMES_KEY: &str = "eventFeatureNames";
/// Names of the per-particle feature columns.
pub const PARTICLE_NAMES_KEY: &str = "particleFeatureNames";

/// First-jet constituents `[N, 100, F]` in the per-jet layout.
pub const JET1_CANDS_KEY: &str = "jet1_PFCands";
/// Second-jet constituents `[N, 100, F]` in the per-jet layout.
pub const JET2_CANDS_KEY: &str = "jet2_PFCands";
/// Event feature matrix in the per-jet layout.
pub const JET_KINEMATICS_KEY: &str = "jet_kinematics";
/// Per-event truth label in the per-jet layout.
pub const TRUTH_LABEL_KEY: &str = "truth_label";

/// Particle feature names of the per-jet layout.
pub const CARTESIAN_PARTICLE_NAMES: [&str; 4] = ["px", "py", "pz", "E"];

/// Where the constituent tensor lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstituentLayout {
    /// One `[N, 2, 100, F]` dataset.
    Combined { key: String },
    /// One `[N, 100, F]` dataset per jet, stacked on read.
    PerJet { keys: [String; 2] },
}

/// Where the label lists come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelSource {
    /// String datasets stored next to the arrays.
    InFile {
        feature_names_key: String,
        particle_names_key: String,
    },
    /// Names known ahead of time and not stored in the file.
    Fixed {
        feature_names: Vec<String>,
        particle_names: Vec<String>,
    },
}

/// Feature and particle column names of a dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetLabels {
    pub particle_feature_names: Vec<String>,
    pub feature_names: Vec<String>,
}

/// Describes how a file record is laid out on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetSchema {
    pub constituents: ConstituentLayout,
    pub features_key: String,
    pub labels: LabelSource,
    /// Optional truth label dataset, attached to the batch when present.
    pub truth_label_key: Option<String>,
}

impl Default for DatasetSchema {
    fn default() -> Self {
        Self::standard()
    }
}

impl DatasetSchema {
    /// `jetConstituentsList` / `eventFeatures` with in-file label lists.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            constituents: ConstituentLayout::Combined {
                key: CONSTITUENTS_KEY.to_string(),
            },
            features_key: FEATURES_KEY.to_string(),
            labels: LabelSource::InFile {
                feature_names_key: FEATURE_NAMES_KEY.to_string(),
                particle_names_key: PARTICLE_NAMES_KEY.to_string(),
            },
            truth_label_key: None,
        }
    }

    /// `jet1_PFCands` / `jet2_PFCands` / `jet_kinematics` with a truth label
    /// and compiled-in names.
    #[must_use]
    pub fn per_jet() -> Self {
        Self {
            constituents: ConstituentLayout::PerJet {
                keys: [JET1_CANDS_KEY.to_string(), JET2_CANDS_KEY.to_string()],
            },
            features_key: JET_KINEMATICS_KEY.to_string(),
            labels: LabelSource::Fixed {
                feature_names: DIJET_FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
                particle_names: CARTESIAN_PARTICLE_NAMES
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            },
            truth_label_key: Some(TRUTH_LABEL_KEY.to_string()),
        }
    }

    /// Reads the constituent tensor of one file as `[N, 2, 100, F]`.
    ///
    /// # Errors
    /// Returns an error if a dataset is missing or the per-jet tensors
    /// disagree in shape.
    pub fn read_constituents(&self, store: &H5Store) -> Result<Array4<f32>> {
        match &self.constituents {
            ConstituentLayout::Combined { key } => store.read_array::<Ix4>(key),
            ConstituentLayout::PerJet { keys } => {
                let first: Array3<f32> = store.read_array::<Ix3>(&keys[0])?;
                let second: Array3<f32> = store.read_array::<Ix3>(&keys[1])?;
                Ok(ndarray::stack(Axis(1), &[first.view(), second.view()])?)
            }
        }
    }

    /// Reads the event feature matrix of one file.
    ///
    /// # Errors
    /// Returns an error if the dataset is missing or not two-dimensional.
    pub fn read_features(&self, store: &H5Store) -> Result<Array2<f32>> {
        store.read_array::<Ix2>(&self.features_key)
    }

    /// Reads the truth labels if the schema names them and the file has them.
    ///
    /// # Errors
    /// Returns an error if the dataset exists but cannot be read.
    pub fn read_truth_labels(&self, store: &H5Store) -> Result<Option<Array1<f32>>> {
        match &self.truth_label_key {
            Some(key) if store.contains(key) => Ok(Some(store.read_array::<Ix1>(key)?)),
            _ => Ok(None),
        }
    }

    /// Reads the complete event batch of one file.
    ///
    /// # Errors
    /// Returns an error if any required dataset is missing or the row counts
    /// of the arrays differ.
    pub fn read_events(&self, store: &H5Store) -> Result<EventBatch> {
        let constituents = self.read_constituents(store)?;
        let features = self.read_features(store)?;
        let batch = EventBatch::new(constituents, features)?;
        match self.read_truth_labels(store)? {
            Some(labels) => Ok(batch.with_truth_labels(labels)?),
            None => Ok(batch),
        }
    }

    /// Resolves the label lists for one file.
    ///
    /// # Errors
    /// Returns an error if in-file label datasets are missing or unreadable.
    pub fn read_labels(&self, store: &H5Store) -> Result<DatasetLabels> {
        match &self.labels {
            LabelSource::InFile {
                feature_names_key,
                particle_names_key,
            } => Ok(DatasetLabels {
                particle_feature_names: store.read_labels(particle_names_key)?,
                feature_names: store.read_labels(feature_names_key)?,
            }),
            LabelSource::Fixed {
                feature_names,
                particle_names,
            } => Ok(DatasetLabels {
                particle_feature_names: particle_names.clone(),
                feature_names: feature_names.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WriteOptions;
    use crate::Error;
    use tempfile::tempdir;

    #[test]
    fn per_jet_layout_is_stacked_on_the_jet_axis() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("per_jet.h5");
        let opts = WriteOptions::default();
        let store = H5Store::create(&path).unwrap();
        store
            .write_array(JET1_CANDS_KEY, Array3::<f32>::from_elem((3, 5, 4), 1.0).view(), &opts)
            .unwrap();
        store
            .write_array(JET2_CANDS_KEY, Array3::<f32>::from_elem((3, 5, 4), 2.0).view(), &opts)
            .unwrap();
        store
            .write_array(JET_KINEMATICS_KEY, Array2::<f32>::zeros((3, 11)).view(), &opts)
            .unwrap();
        store
            .write_array(TRUTH_LABEL_KEY, Array1::<f32>::from(vec![0.0, 1.0, 0.0]).view(), &opts)
            .unwrap();

        let schema = DatasetSchema::per_jet();
        let batch = schema.read_events(&store).unwrap();
        assert_eq!(batch.constituents().shape(), &[3, 2, 5, 4]);
        assert!(batch.constituents().index_axis(Axis(1), 0).iter().all(|&v| v == 1.0));
        assert!(batch.constituents().index_axis(Axis(1), 1).iter().all(|&v| v == 2.0));
        assert_eq!(batch.truth_labels().unwrap().to_vec(), vec![0.0, 1.0, 0.0]);

        let labels = schema.read_labels(&store).unwrap();
        assert_eq!(labels.feature_names.len(), 11);
        assert_eq!(labels.particle_feature_names, vec!["px", "py", "pz", "E"]);
    }

    #[test]
    fn row_count_mismatch_is_a_shape_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mismatch.h5");
        let opts = WriteOptions::default();
        let store = H5Store::create(&path).unwrap();
        store
            .write_array(CONSTITUENTS_KEY, Array4::<f32>::zeros((4, 2, 3, 3)).view(), &opts)
            .unwrap();
        store
            .write_array(FEATURES_KEY, Array2::<f32>::zeros((5, 11)).view(), &opts)
            .unwrap();

        let err = DatasetSchema::standard().read_events(&store).unwrap_err();
        assert!(matches!(err, Error::CoreError(sarewt_core::Error::ShapeMismatch(_))));
        assert!(err.is_recoverable());
    }

    #[test]
    fn standard_layout_requires_label_datasets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nolabels.h5");
        let store = H5Store::create(&path).unwrap();
        let err = DatasetSchema::standard().read_labels(&store).unwrap_err();
        assert!(matches!(err, Error::MissingDataset { .. }));
    }
}
