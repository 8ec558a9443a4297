//! The artifact directory shared by training and serving.
//!
//! Training overwrites every file here wholesale; there is no versioning.
//! Files are written through a temp file in the same directory and renamed
//! into place, so a concurrent reader sees either the old or the new file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;
use crate::config::Params;
use crate::ml::forest::RandomForestModel;
use crate::ml::metrics::{ClassificationReport, ConfusionMatrix};

pub const MODEL_FILE_NAME: &str = "model.json";
pub const CONFUSION_MATRIX_FILE_NAME: &str = "confusion_matrix.csv";
pub const CLASSIFICATION_REPORT_FILE_NAME: &str = "classification_report.csv";
pub const RUN_ID_FILE_NAME: &str = "latest_run.txt";
pub const RUN_LOG_FILE_NAME: &str = "runs.jsonl";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to create artifact directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// One line of `runs.jsonl`: what a training run used and produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub run_name: String,
    pub started_at: String,
    pub finished_at: String,
    pub params: Params,
    pub accuracy: f32,
    /// BLAKE3 hex digest of the model file written by this run.
    pub model_digest: String,
}

/// Paths and writers for one artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The store at `<project root>/artifacts`.
    pub fn from_project_root() -> Result<Self, app_dirs::AppDirError> {
        Ok(Self::new(app_dirs::artifacts_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE_NAME)
    }

    pub fn confusion_matrix_path(&self) -> PathBuf {
        self.dir.join(CONFUSION_MATRIX_FILE_NAME)
    }

    pub fn classification_report_path(&self) -> PathBuf {
        self.dir.join(CLASSIFICATION_REPORT_FILE_NAME)
    }

    pub fn run_id_path(&self) -> PathBuf {
        self.dir.join(RUN_ID_FILE_NAME)
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.dir.join(RUN_LOG_FILE_NAME)
    }

    /// Create the artifact directory if it does not exist.
    pub fn ensure_dir(&self) -> Result<(), ArtifactError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ArtifactError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    /// Write the model as pretty JSON and return the file's BLAKE3 digest.
    pub fn save_model(&self, model: &RandomForestModel) -> Result<String, ArtifactError> {
        let path = self.model_path();
        let bytes = serde_json::to_vec_pretty(model).map_err(|source| ArtifactError::Encode {
            path: path.clone(),
            source,
        })?;
        self.write_atomic(&path, &bytes)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    pub fn write_confusion_matrix(&self, cm: &ConfusionMatrix) -> Result<(), ArtifactError> {
        self.write_atomic(&self.confusion_matrix_path(), cm.to_csv().as_bytes())
    }

    pub fn write_classification_report(
        &self,
        report: &ClassificationReport,
    ) -> Result<(), ArtifactError> {
        self.write_atomic(&self.classification_report_path(), report.to_csv().as_bytes())
    }

    pub fn write_run_id(&self, run_id: &str) -> Result<(), ArtifactError> {
        self.write_atomic(&self.run_id_path(), run_id.as_bytes())
    }

    /// Read the id of the most recent training run.
    pub fn read_run_id(&self) -> Result<String, ArtifactError> {
        let path = self.run_id_path();
        std::fs::read_to_string(&path)
            .map(|text| text.trim().to_string())
            .map_err(|source| ArtifactError::Read { path, source })
    }

    /// Append one run record to `runs.jsonl`.
    pub fn append_run_record(&self, record: &RunRecord) -> Result<(), ArtifactError> {
        let path = self.run_log_path();
        let mut line = serde_json::to_string(record).map_err(|source| ArtifactError::Encode {
            path: path.clone(),
            source,
        })?;
        line.push('\n');
        self.ensure_dir()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|source| ArtifactError::Write { path, source })
    }

    /// Read every record from `runs.jsonl`, oldest first. Unparseable lines
    /// are skipped.
    pub fn read_run_records(&self) -> Result<Vec<RunRecord>, ArtifactError> {
        let path = self.run_log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|source| ArtifactError::Read { path, source })?;
        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
        self.ensure_dir()?;
        let write_err = |source: std::io::Error| ArtifactError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut file = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        file.write_all(bytes).map_err(write_err)?;
        file.persist(path).map_err(|err| write_err(err.error))?;
        Ok(())
    }
}

/// BLAKE3 hex digest of a file's contents.
pub fn file_digest(path: &Path) -> Result<String, ArtifactError> {
    let bytes = std::fs::read(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
