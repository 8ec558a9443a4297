//! One-shot training pipeline: split, fit, evaluate, persist.

use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::info;
use uuid::Uuid;

use crate::app_dirs::AppDirError;
use crate::artifacts::{ArtifactError, ArtifactStore, RunRecord};
use crate::config::{ConfigError, Params};
use crate::dataset::{Dataset, DatasetError, SplitError, stratified_split};
use crate::ml::forest::{ForestError, ForestOptions, RandomForestModel, train_random_forest};
use crate::ml::metrics::{ClassificationReport, ConfusionMatrix, classification_report};

/// Name recorded for every run in the run log.
pub const RUN_NAME: &str = "rf-iris";

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("split error: {0}")]
    Split(#[from] SplitError),
    #[error("training error: {0}")]
    Forest(#[from] ForestError),
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Dirs(#[from] AppDirError),
    #[error("failed to format timestamp: {0}")]
    Time(#[from] time::error::Format),
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub run_id: String,
    pub accuracy: f32,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
    pub model: RandomForestModel,
    pub model_digest: String,
}

/// Train on `dataset` with `params` and write every artifact into `store`.
///
/// Previous artifacts are overwritten. Nothing is cleaned up on failure.
pub fn run_training(
    dataset: &Dataset,
    params: &Params,
    store: &ArtifactStore,
) -> Result<TrainingOutcome, TrainError> {
    params.validate()?;
    let started_at = now_rfc3339()?;
    let run_id = Uuid::new_v4().simple().to_string();
    info!(%run_id, run_name = RUN_NAME, ?params, "starting training run");

    let split = stratified_split(dataset, params.train_size, params.random_state)?;
    info!(
        train_rows = split.train.len(),
        test_rows = split.test.len(),
        "split dataset"
    );

    let options = ForestOptions {
        n_estimators: params.n_estimators,
        max_depth: params.max_depth,
        max_features: None,
        seed: params.random_state,
    };
    let model = train_random_forest(&split.train, &options)?;

    let (confusion, report) = evaluate(&model, &split.test);
    info!(accuracy = report.accuracy, "evaluated on held-out split");

    store.ensure_dir()?;
    let model_digest = store.save_model(&model)?;
    info!(path = %store.model_path().display(), digest = %model_digest, "saved model");
    store.write_confusion_matrix(&confusion)?;
    store.write_classification_report(&report)?;
    store.write_run_id(&run_id)?;
    store.append_run_record(&RunRecord {
        run_id: run_id.clone(),
        run_name: RUN_NAME.to_string(),
        started_at,
        finished_at: now_rfc3339()?,
        params: params.clone(),
        accuracy: report.accuracy,
        model_digest: model_digest.clone(),
    })?;

    Ok(TrainingOutcome {
        run_id,
        accuracy: report.accuracy,
        confusion,
        report,
        model,
        model_digest,
    })
}

/// Score `model` on `dataset`, returning the confusion matrix and report.
pub fn evaluate(
    model: &RandomForestModel,
    dataset: &Dataset,
) -> (ConfusionMatrix, ClassificationReport) {
    let predicted: Vec<usize> = dataset
        .x
        .iter()
        .map(|row| model.predict_class_index(row))
        .collect();
    let confusion = ConfusionMatrix::from_labels(model.classes.len(), &dataset.y, &predicted);
    let labels: Vec<String> = (0..model.classes.len()).map(|k| k.to_string()).collect();
    let report = classification_report(&confusion, &labels);
    (confusion, report)
}

fn now_rfc3339() -> Result<String, time::error::Format> {
    OffsetDateTime::now_utc().format(&Rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::load_iris;
    use tempfile::tempdir;

    fn small_params() -> Params {
        Params {
            n_estimators: 25,
            ..Params::default()
        }
    }

    #[test]
    fn writes_every_artifact() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("artifacts"));
        let outcome = run_training(&load_iris().unwrap(), &small_params(), &store).unwrap();

        assert!(store.model_path().is_file());
        assert!(store.confusion_matrix_path().is_file());
        assert!(store.classification_report_path().is_file());
        assert_eq!(store.read_run_id().unwrap(), outcome.run_id);
        assert_eq!(outcome.run_id.len(), 32);

        let loaded = RandomForestModel::load_json(&store.model_path()).unwrap();
        assert_eq!(loaded, outcome.model);
        assert_eq!(
            crate::artifacts::file_digest(&store.model_path()).unwrap(),
            outcome.model_digest
        );

        let records = store.read_run_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].run_name, RUN_NAME);
        assert_eq!(records[0].params, small_params());
    }

    #[test]
    fn rerun_overwrites_and_keeps_history() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let iris = load_iris().unwrap();
        let first = run_training(&iris, &small_params(), &store).unwrap();
        let second = run_training(&iris, &small_params(), &store).unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(store.read_run_id().unwrap(), second.run_id);
        assert_eq!(store.read_run_records().unwrap().len(), 2);
    }

    #[test]
    fn invalid_params_abort_before_writing() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("artifacts"));
        let params = Params {
            train_size: 0.0,
            ..Params::default()
        };
        let err = run_training(&load_iris().unwrap(), &params, &store).unwrap_err();
        assert!(matches!(err, TrainError::Config(_)));
        assert!(!store.dir().exists());
    }
}
