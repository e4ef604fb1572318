//! Keyed array store backed by a single HDF5 file.
//!
//! Every dataset is addressed by its key at the file root. Numeric arrays
//! are read as `f32` (HDF5 converts on read), label arrays are decoded to
//! `String`s whatever string flavour they were stored with.

use crate::writer::WriteOptions;
use crate::{Error, Result};
use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, File};
use ndarray::{Array, ArrayView, ArrayView1, Dimension};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Upper bound on the byte length of a fixed-size label string.
const LABEL_CAPACITY: usize = 256;

/// A single HDF5 file opened as a keyed array store.
pub struct H5Store {
    file: File,
    path: PathBuf,
}

impl H5Store {
    /// Opens an existing file read-only.
    ///
    /// # Errors
    /// Returns an error if the file is missing or not a readable HDF5 file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Creates (or truncates) a file for writing.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(&path)?;
        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if a dataset or group named `key` exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.file.link_exists(key)
    }

    /// Names of all root-level members.
    ///
    /// # Errors
    /// Returns an error if the file index cannot be read.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.file.member_names()?)
    }

    /// Shape of the dataset at `key`.
    ///
    /// # Errors
    /// Returns an error if the dataset is missing.
    pub fn shape(&self, key: &str) -> Result<Vec<usize>> {
        Ok(self.dataset(key)?.shape())
    }

    /// Reads the dataset at `key` as an `f32` array of dimension `D`.
    ///
    /// # Errors
    /// Returns an error if the dataset is missing, has a different rank, or
    /// cannot be converted to `f32`.
    pub fn read_array<D: Dimension>(&self, key: &str) -> Result<Array<f32, D>> {
        Ok(self.dataset(key)?.read::<f32, D>()?)
    }

    /// Reads the string dataset at `key`.
    ///
    /// # Errors
    /// Returns an error if the dataset is missing or does not hold strings.
    pub fn read_labels(&self, key: &str) -> Result<Vec<String>> {
        let dataset = self.dataset(key)?;
        let labels = match dataset.dtype()?.to_descriptor()? {
            TypeDescriptor::VarLenUnicode => dataset
                .read_raw::<VarLenUnicode>()?
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            TypeDescriptor::VarLenAscii => dataset
                .read_raw::<VarLenAscii>()?
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            TypeDescriptor::FixedAscii(_) => dataset
                .read_raw::<FixedAscii<LABEL_CAPACITY>>()?
                .iter()
                .map(|s| trim_padding(s.as_str()))
                .collect(),
            TypeDescriptor::FixedUnicode(_) => dataset
                .read_raw::<FixedUnicode<LABEL_CAPACITY>>()?
                .iter()
                .map(|s| trim_padding(s.as_str()))
                .collect(),
            other => {
                return Err(Error::InvalidFormat(format!(
                    "dataset '{key}' holds {other:?}, expected strings"
                )))
            }
        };
        Ok(labels)
    }

    /// Writes `data` as a new `f32` dataset.
    ///
    /// Non-empty arrays are chunked along the first axis and compressed
    /// according to `options`.
    ///
    /// # Errors
    /// Returns an error if the dataset exists already or HDF5 I/O fails.
    pub fn write_array<D: Dimension>(
        &self,
        key: &str,
        data: ArrayView<'_, f32, D>,
        options: &WriteOptions,
    ) -> Result<()> {
        let shape = data.shape().to_vec();
        let mut builder = self.file.new_dataset::<f32>().shape(shape.clone());

        if let Some(level) = options.compression {
            if shape.iter().all(|&dim| dim > 0) {
                let mut chunk = shape;
                chunk[0] = chunk[0].min(options.chunk_rows.max(1));
                builder = builder.chunk(chunk).deflate(level);
                if options.shuffle {
                    builder = builder.shuffle();
                }
            }
        }

        let dataset = builder.create(key)?;
        let standard = data.as_standard_layout();
        dataset.write(standard.view())?;
        Ok(())
    }

    /// Writes `labels` as a variable-length UTF-8 string dataset.
    ///
    /// # Errors
    /// Returns an error if a label is not valid UTF-8 or HDF5 I/O fails.
    pub fn write_labels(&self, key: &str, labels: &[String]) -> Result<()> {
        let values = labels
            .iter()
            .map(|label| to_var_len_unicode(label))
            .collect::<Result<Vec<_>>>()?;
        let dataset = self
            .file
            .new_dataset::<VarLenUnicode>()
            .shape(vec![values.len()])
            .create(key)?;
        dataset.write(ArrayView1::from(values.as_slice()))?;
        Ok(())
    }

    fn dataset(&self, key: &str) -> Result<Dataset> {
        if !self.contains(key) {
            return Err(Error::MissingDataset {
                key: key.to_string(),
            });
        }
        Ok(self.file.dataset(key)?)
    }
}

fn trim_padding(value: &str) -> String {
    value.trim_end_matches(['\0', ' ']).to_string()
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 label '{value}': {e}")))
}
