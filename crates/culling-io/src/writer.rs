//! Result writer for experiment artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{Dataset, ExperimentName};

/// Writes experiment artifacts into one output directory.
///
/// Creates the output directory on construction if it does not exist.
/// Every file is named `{experiment}_{suffix}`, so several experiments can
/// share a directory without clobbering each other.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Return the output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Return the experiment name.
    #[must_use]
    pub fn experiment(&self) -> &ExperimentName {
        &self.experiment
    }

    /// Return `{output_dir}/{experiment}_{suffix}`.
    #[must_use]
    pub fn path_for(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{suffix}", self.experiment.as_str()))
    }

    /// Return the path of the serialized final model.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.path_for("model.bin")
    }

    /// Return the directory holding per-resample checkpoints.
    #[must_use]
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.output_dir.join("checkpoints")
    }

    /// Serialize `value` as pretty JSON to `{experiment}_{suffix}`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::Json`] | `value` cannot be encoded |
    /// | [`IoError::WriteFile`] | The file cannot be written |
    #[instrument(skip_all, fields(suffix = %suffix))]
    pub fn write_json<T: Serialize>(&self, suffix: &str, value: &T) -> Result<PathBuf, IoError> {
        let path = self.path_for(suffix);
        let json = serde_json::to_string_pretty(value).map_err(|e| IoError::Json {
            path: path.clone(),
            source: e,
        })?;
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), "result written");
        Ok(path)
    }

    /// Write `dataset` as CSV to `{experiment}_{suffix}`.
    ///
    /// The response comes first, followed by predictors in schema order.
    /// Categorical cells are written as their level labels, so the file can
    /// be read back with [`DatasetReader`](crate::DatasetReader).
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CsvWrite`] if a record cannot be written.
    #[instrument(skip_all, fields(suffix = %suffix, n_rows = dataset.n_rows()))]
    pub fn write_dataset(&self, suffix: &str, dataset: &Dataset) -> Result<PathBuf, IoError> {
        let path = self.path_for(suffix);
        let csv_err = |e: csv::Error| IoError::CsvWrite {
            path: path.clone(),
            source: e,
        };

        let mut wtr = csv::Writer::from_path(&path).map_err(csv_err)?;
        let header = std::iter::once(dataset.response_name().to_string())
            .chain(dataset.predictor_names());
        wtr.write_record(header).map_err(csv_err)?;

        for (row, y) in dataset.response().iter().enumerate() {
            let record = std::iter::once(y.to_string()).chain(
                dataset
                    .predictors()
                    .iter()
                    .map(|p| p.column.display_value(row)),
            );
            wtr.write_record(record).map_err(csv_err)?;
        }
        wtr.flush().map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), "dataset written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Column, Predictor};
    use crate::reader::{DatasetReader, read_json};

    fn writer(dir: &Path) -> ResultWriter {
        ResultWriter::new(dir, ExperimentName::new("exp".into()).unwrap()).unwrap()
    }

    #[test]
    fn creates_output_dir_and_names_files() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("nested").join("out");
        let w = writer(&out);
        assert!(out.is_dir());
        assert_eq!(w.path_for("ranks.json"), out.join("exp_ranks.json"));
        assert_eq!(w.model_path(), out.join("exp_model.bin"));
        assert_eq!(w.checkpoint_dir(), out.join("checkpoints"));
    }

    #[test]
    fn json_written_and_readable() {
        let tmp = tempfile::tempdir().unwrap();
        let w = writer(tmp.path());
        let path = w.write_json("values.json", &vec![1.5, 2.5]).unwrap();
        let back: Vec<f64> = read_json(&path).unwrap();
        assert_eq!(back, vec![1.5, 2.5]);
    }

    #[test]
    fn dataset_written_and_reread() {
        let tmp = tempfile::tempdir().unwrap();
        let w = writer(tmp.path());
        let ds = Dataset::new(
            "y".into(),
            vec![1.0, 2.5],
            vec![
                Predictor {
                    name: "a".into(),
                    column: Column::Numeric(vec![0.5, -1.0]),
                },
                Predictor {
                    name: "soil".into(),
                    column: Column::Categorical {
                        levels: vec!["clay".into(), "sand".into()],
                        codes: vec![1, 0],
                    },
                },
            ],
        )
        .unwrap();

        let path = w.write_dataset("pruned.csv", &ds).unwrap();
        let back = DatasetReader::new(&path, "y")
            .with_categorical(["soil"])
            .read()
            .unwrap();
        assert_eq!(back, ds);
    }
}
