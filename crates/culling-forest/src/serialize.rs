//! Model files: a bincode-encoded forest behind a version header.
//!
//! The version is the first field of the envelope, so it can be decoded on
//! its own before the rest of the file is trusted. Files are written to a
//! `.tmp` sibling and renamed into place.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::RfError;
use crate::forest::RandomForest;

const FORMAT_VERSION: u32 = 1;

#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope<F> {
    format_version: u32,
    feature_names: Vec<String>,
    forest: F,
}

/// Leading bytes of every envelope.
#[derive(serde::Deserialize)]
struct VersionHeader {
    format_version: u32,
}

impl RandomForest {
    /// Write the model to `path`, replacing any previous file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::SerializeModel`] | bincode encoding failed |
    /// | [`RfError::WriteModel`] | writing or renaming the file failed |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RfError> {
        let path = path.as_ref();
        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            feature_names: self.feature_names.clone(),
            forest: self,
        };
        let bytes =
            bincode::serialize(&envelope).map_err(|source| RfError::SerializeModel { source })?;

        let tmp = path.with_extension("bin.tmp");
        let write_err = |source| RfError::WriteModel {
            path: path.to_path_buf(),
            source,
        };
        std::fs::write(&tmp, &bytes).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)?;

        info!(size_bytes = bytes.len(), n_trees = self.trees.len(), "model saved");
        Ok(())
    }

    /// Read a model written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::ReadModel`] | the file cannot be read |
    /// | [`RfError::IncompatibleModelVersion`] | written by another format version |
    /// | [`RfError::DeserializeModel`] | the bytes are not a model |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RfError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| RfError::ReadModel {
            path: path.to_path_buf(),
            source,
        })?;
        let decode_err = |source| RfError::DeserializeModel {
            path: path.to_path_buf(),
            source,
        };

        let header: VersionHeader = bincode::deserialize(&bytes).map_err(decode_err)?;
        if header.format_version != FORMAT_VERSION {
            return Err(RfError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: header.format_version,
                path: path.to_path_buf(),
            });
        }

        let envelope: ModelEnvelope<RandomForest> =
            bincode::deserialize(&bytes).map_err(decode_err)?;
        if envelope.feature_names != envelope.forest.feature_names {
            return Err(decode_err(Box::new(bincode::ErrorKind::Custom(
                "feature names in header and forest disagree".to_string(),
            ))));
        }

        debug!(
            n_trees = envelope.forest.n_trees(),
            n_features = envelope.forest.n_features(),
            "model loaded"
        );
        Ok(envelope.forest)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{FORMAT_VERSION, ModelEnvelope};
    use crate::RfError;
    use crate::config::RandomForestConfig;
    use crate::forest::RandomForest;

    fn small_forest() -> RandomForest {
        let features: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 5) as f64]).collect();
        let targets: Vec<f64> = features.iter().map(|r| 2.0 * r[0] - r[1]).collect();
        let names = vec!["dose".to_string(), "batch".to_string()];
        RandomForestConfig::new(6)
            .unwrap()
            .with_min_samples_leaf(2)
            .fit(&features, &targets, &names)
            .unwrap()
            .into_forest()
    }

    #[test]
    fn saved_model_predicts_identically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        let forest = small_forest();
        forest.save(&path).unwrap();
        let loaded = RandomForest::load(&path).unwrap();

        let rows = vec![vec![3.5, 0.0], vec![17.0, 2.0], vec![38.0, 4.0]];
        assert_eq!(loaded.predict_batch(&rows).unwrap(), forest.predict_batch(&rows).unwrap());
        assert_eq!(loaded.feature_names(), forest.feature_names());
        assert!(!dir.path().join("model.bin.tmp").exists());
    }

    #[test]
    fn overwrite_replaces_previous_model() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, b"stale").unwrap();
        small_forest().save(&path).unwrap();
        assert!(RandomForest::load(&path).is_ok());
    }

    #[test]
    fn missing_and_garbage_files() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            RandomForest::load(dir.path().join("absent.bin")),
            Err(RfError::ReadModel { .. })
        ));

        let path = dir.path().join("garbage.bin");
        std::fs::write(&path, [1u8, 0, 0]).unwrap();
        assert!(matches!(
            RandomForest::load(&path),
            Err(RfError::DeserializeModel { .. })
        ));
    }

    #[test]
    fn future_version_is_rejected_before_decoding() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future.bin");
        // A future layout whose body this build cannot parse.
        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION + 1,
            feature_names: vec!["dose".to_string()],
            forest: "opaque".to_string(),
        };
        std::fs::write(&path, bincode::serialize(&envelope).unwrap()).unwrap();
        assert!(matches!(
            RandomForest::load(&path),
            Err(RfError::IncompatibleModelVersion { found: 2, expected: 1, .. })
        ));
    }
}
