//! The serving-side classifier interface and its two implementations.

use std::path::Path;

use super::forest::{ForestError, RandomForestModel};
use crate::features::{self, CLASS_NAMES, FEATURE_NAMES};

/// Anything the prediction service can score a feature vector with.
pub trait Classifier {
    /// Predicted class index.
    fn predict_class(&self, features: &[f64]) -> usize;

    /// Per-class probabilities, when the model can estimate them.
    fn predict_proba(&self, features: &[f64]) -> Option<Vec<f64>>;
}

impl Classifier for RandomForestModel {
    fn predict_class(&self, features: &[f64]) -> usize {
        self.predict_class_index(features)
    }

    fn predict_proba(&self, features: &[f64]) -> Option<Vec<f64>> {
        Some(RandomForestModel::predict_proba(self, features))
    }
}

/// Fixed-output stand-in used when no trained artifact exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantModel {
    pub class: usize,
    pub proba: Vec<f64>,
}

impl Default for ConstantModel {
    fn default() -> Self {
        Self {
            class: 0,
            proba: vec![1.0, 0.0, 0.0],
        }
    }
}

impl Classifier for ConstantModel {
    fn predict_class(&self, _features: &[f64]) -> usize {
        self.class
    }

    fn predict_proba(&self, _features: &[f64]) -> Option<Vec<f64>> {
        Some(self.proba.clone())
    }
}

/// The model a server process ended up with.
#[derive(Debug, Clone)]
pub enum LoadedModel {
    /// A forest read from the artifact file.
    Trained(RandomForestModel),
    /// The constant stand-in; the artifact file was absent.
    Stub(ConstantModel),
}

impl LoadedModel {
    /// Load the artifact at `path`, or fall back to the stand-in when the
    /// file does not exist. Unreadable or invalid artifacts are errors.
    pub fn load_or_stub(path: &Path) -> Result<Self, ForestError> {
        if !path.exists() {
            return Ok(LoadedModel::Stub(ConstantModel::default()));
        }
        let model = RandomForestModel::load_json(path)?;
        if !features::matches_contract(&model.feature_names) {
            return Err(ForestError::Invalid(format!(
                "artifact feature order {:?} does not match {:?}",
                model.feature_names, FEATURE_NAMES
            )));
        }
        if !model.classes.iter().map(String::as_str).eq(CLASS_NAMES) {
            return Err(ForestError::Invalid(format!(
                "artifact classes {:?} do not match {:?}",
                model.classes, CLASS_NAMES
            )));
        }
        Ok(LoadedModel::Trained(model))
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LoadedModel::Trained(_) => "trained",
            LoadedModel::Stub(_) => "stub",
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            LoadedModel::Trained(model) => model as &dyn Classifier,
            LoadedModel::Stub(model) => model,
        }
    }
}

impl Classifier for LoadedModel {
    fn predict_class(&self, features: &[f64]) -> usize {
        self.inner().predict_class(features)
    }

    fn predict_proba(&self, features: &[f64]) -> Option<Vec<f64>> {
        self.inner().predict_proba(features)
    }
}
