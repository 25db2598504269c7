//! Per-resample checkpoints: bincode inside a versioned envelope, written
//! atomically, one file per outer resample.

use std::fs;
use std::path::{Path, PathBuf};

use culling_forest::RegressionMetrics;
use culling_io::ExperimentName;
use tracing::{debug, info, instrument};

use crate::error::RfeError;
use crate::shrink::RankEntry;

/// Current checkpoint format version.
const FORMAT_VERSION: u32 = 1;

/// Everything one completed outer resample produced.
///
/// The performance lists and `subset_sizes` / `predictor_counts` are
/// parallel, one entry per schedule step.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Checkpoint {
    /// 1-based resample index.
    pub resample: usize,
    /// Elimination rank of every predictor present at the first step.
    pub ranks: Vec<RankEntry>,
    /// Internal-CV performance per step.
    pub train: Vec<RegressionMetrics>,
    /// Holdout performance of the refit model per step.
    pub test: Vec<RegressionMetrics>,
    /// Null-baseline performance per step.
    pub null: Vec<RegressionMetrics>,
    /// Subset-size label per step.
    pub subset_sizes: Vec<usize>,
    /// Number of predictors actually trained on per step.
    pub predictor_counts: Vec<usize>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CheckpointEnvelope<C> {
    format_version: u32,
    checkpoint: C,
}

/// Which resamples still need to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePlan {
    /// Indices with a checkpoint on disk.
    pub completed: Vec<usize>,
    /// Indices without one.
    pub pending: Vec<usize>,
}

/// Directory of checkpoints for one experiment.
///
/// Paths are derived from resample indices as
/// `{dir}/{experiment}_resample_{index:03}.bin`; file names are never parsed.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    experiment: ExperimentName,
}

impl CheckpointStore {
    /// Open (creating if needed) the checkpoint directory.
    ///
    /// # Errors
    ///
    /// Returns [`RfeError::CheckpointDir`] if the directory cannot be created.
    pub fn new(dir: &Path, experiment: ExperimentName) -> Result<Self, RfeError> {
        fs::create_dir_all(dir).map_err(|e| RfeError::CheckpointDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            experiment,
        })
    }

    /// Return the checkpoint directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Return the path of resample `index`.
    #[must_use]
    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}_resample_{index:03}.bin", self.experiment.as_str()))
    }

    /// Return `true` if resample `index` has completed.
    #[must_use]
    pub fn exists(&self, index: usize) -> bool {
        self.path_for(index).is_file()
    }

    /// Split resamples `1..=times` into completed and pending.
    #[must_use]
    pub fn resume_plan(&self, times: usize) -> ResumePlan {
        let (completed, pending) = (1..=times).partition(|&i| self.exists(i));
        ResumePlan { completed, pending }
    }

    /// Write a checkpoint via a temporary file and rename.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfeError::EncodeCheckpoint`] | bincode encoding failed |
    /// | [`RfeError::WriteCheckpoint`] | write or rename failed |
    #[instrument(skip_all, fields(resample = checkpoint.resample))]
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf, RfeError> {
        let path = self.path_for(checkpoint.resample);
        let envelope = CheckpointEnvelope {
            format_version: FORMAT_VERSION,
            checkpoint,
        };
        let bytes = bincode::serialize(&envelope).map_err(|e| RfeError::EncodeCheckpoint {
            resample: checkpoint.resample,
            source: e,
        })?;

        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, &bytes).map_err(|e| RfeError::WriteCheckpoint {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &path).map_err(|e| RfeError::WriteCheckpoint {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), size_bytes = bytes.len(), "checkpoint written");
        Ok(path)
    }

    /// Read the checkpoint of resample `index`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfeError::ReadCheckpoint`] | file read failed |
    /// | [`RfeError::DecodeCheckpoint`] | bincode decoding failed |
    /// | [`RfeError::IncompatibleCheckpointVersion`] | format version mismatch |
    pub fn load(&self, index: usize) -> Result<Checkpoint, RfeError> {
        let path = self.path_for(index);
        let bytes = fs::read(&path).map_err(|e| RfeError::ReadCheckpoint {
            path: path.clone(),
            source: e,
        })?;
        let envelope: CheckpointEnvelope<Checkpoint> =
            bincode::deserialize(&bytes).map_err(|e| RfeError::DecodeCheckpoint {
                path: path.clone(),
                source: e,
            })?;
        if envelope.format_version != FORMAT_VERSION {
            return Err(RfeError::IncompatibleCheckpointVersion {
                path,
                expected: FORMAT_VERSION,
                found: envelope.format_version,
            });
        }
        debug!(index, "checkpoint loaded");
        Ok(envelope.checkpoint)
    }

    /// Load every completed checkpoint among `1..=times`, in index order.
    ///
    /// # Errors
    ///
    /// Propagates [`load`](Self::load) errors.
    pub fn load_completed(&self, times: usize) -> Result<Vec<Checkpoint>, RfeError> {
        self.resume_plan(times)
            .completed
            .into_iter()
            .map(|i| self.load(i))
            .collect()
    }
}
