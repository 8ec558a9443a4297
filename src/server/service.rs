//! The prediction path, independent of HTTP.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::artifacts::file_digest;
use crate::features::FeatureVector;
use crate::ml::classifier::{Classifier, LoadedModel};
use crate::ml::forest::ForestError;

/// Why a prediction could not be produced.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("failed to load model: {0}")]
    Load(#[from] ForestError),
    #[error("model loading task failed: {0}")]
    LoadTask(#[from] tokio::task::JoinError),
    #[error("model returned class {0}, which is not a valid label")]
    InvalidClass(usize),
}

/// One scored feature vector, as returned on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: u8,
    pub proba: Option<Vec<f64>>,
}

/// Owns the model handle for one server process.
///
/// The model is loaded on the first prediction. Concurrent first requests
/// wait on the same load; once loaded it is never replaced.
#[derive(Debug)]
pub struct PredictionService {
    model_path: PathBuf,
    model: OnceCell<LoadedModel>,
}

impl PredictionService {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            model: OnceCell::new(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Whether a model (trained or stand-in) has been installed.
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Return the model, loading it on first use.
    ///
    /// A failed load leaves the cell empty so a later request retries.
    pub async fn model(&self) -> Result<&LoadedModel, PredictError> {
        self.model
            .get_or_try_init(|| async {
                let path = self.model_path.clone();
                let model = tokio::task::spawn_blocking(move || load_model(&path)).await??;
                Ok::<_, PredictError>(model)
            })
            .await
    }

    /// Score one feature vector.
    pub async fn predict(&self, features: &FeatureVector) -> Result<Prediction, PredictError> {
        let model = self.model().await?;
        score(model, features)
    }
}

/// Score `features` with an already-loaded model.
pub fn score(model: &LoadedModel, features: &FeatureVector) -> Result<Prediction, PredictError> {
    let row = features.to_array();
    let class = model.predict_class(&row);
    let prediction = u8::try_from(class).map_err(|_| PredictError::InvalidClass(class))?;
    Ok(Prediction {
        prediction,
        proba: model.predict_proba(&row),
    })
}

fn load_model(path: &Path) -> Result<LoadedModel, ForestError> {
    let model = LoadedModel::load_or_stub(path)?;
    match &model {
        LoadedModel::Trained(forest) => {
            let digest = file_digest(path).unwrap_or_default();
            info!(
                path = %path.display(),
                trees = forest.trees.len(),
                digest = %digest,
                "loaded trained model"
            );
        }
        LoadedModel::Stub(_) => {
            warn!(
                path = %path.display(),
                "model artifact not found; serving constant stand-in predictions"
            );
        }
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::load_iris;
    use crate::ml::forest::{ForestOptions, train_random_forest};
    use std::sync::Arc;
    use tempfile::tempdir;

    const SETOSA: FeatureVector = FeatureVector {
        sepal_length: 5.1,
        sepal_width: 3.5,
        petal_length: 1.4,
        petal_width: 0.2,
    };

    #[tokio::test]
    async fn missing_artifact_serves_stand_in() {
        let dir = tempdir().unwrap();
        let service = PredictionService::new(dir.path().join("model.json"));
        assert!(!service.is_loaded());
        let prediction = service.predict(&SETOSA).await.unwrap();
        assert_eq!(
            prediction,
            Prediction {
                prediction: 0,
                proba: Some(vec![1.0, 0.0, 0.0]),
            }
        );
        assert!(service.is_loaded());
    }

    #[tokio::test]
    async fn corrupt_artifact_errors_then_retries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"{}").unwrap();
        let service = PredictionService::new(&path);
        assert!(matches!(
            service.predict(&SETOSA).await,
            Err(PredictError::Load(_))
        ));
        assert!(!service.is_loaded());

        std::fs::remove_file(&path).unwrap();
        assert!(service.predict(&SETOSA).await.is_ok());
    }

    #[tokio::test]
    async fn model_is_not_reloaded_after_first_use() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        let service = PredictionService::new(&path);
        service.predict(&SETOSA).await.unwrap();

        let options = ForestOptions {
            n_estimators: 5,
            ..ForestOptions::default()
        };
        let forest = train_random_forest(&load_iris().unwrap(), &options).unwrap();
        std::fs::write(&path, serde_json::to_vec(&forest).unwrap()).unwrap();

        let model = service.model().await.unwrap();
        assert_eq!(model.kind(), "stub");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_share_one_model() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        let options = ForestOptions {
            n_estimators: 10,
            ..ForestOptions::default()
        };
        let forest = train_random_forest(&load_iris().unwrap(), &options).unwrap();
        std::fs::write(&path, serde_json::to_vec(&forest).unwrap()).unwrap();

        let service = Arc::new(PredictionService::new(&path));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.predict(&SETOSA).await })
            })
            .collect();
        let expected = score(&LoadedModel::Trained(forest), &SETOSA).unwrap();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), expected);
        }
        assert_eq!(service.model().await.unwrap().kind(), "trained");
    }

    #[test]
    fn score_reports_proba_in_class_order() {
        let prediction = score(
            &LoadedModel::Stub(crate::ml::classifier::ConstantModel {
                class: 2,
                proba: vec![0.1, 0.2, 0.7],
            }),
            &SETOSA,
        )
        .unwrap();
        assert_eq!(prediction.prediction, 2);
        assert_eq!(prediction.proba, Some(vec![0.1, 0.2, 0.7]));
    }
}
