//! The feature-vector contract shared by training and serving.
//!
//! Column order is fixed here and nowhere else. The trainer records
//! [`FEATURE_NAMES`] in the model artifact and the server refuses artifacts
//! trained on a different order.

use serde::{Deserialize, Serialize};

/// Number of features per row.
pub const FEATURE_LEN: usize = 4;

/// Feature columns, in model input order.
pub const FEATURE_NAMES: [&str; FEATURE_LEN] =
    ["sepal_length", "sepal_width", "petal_length", "petal_width"];

/// Class labels, indexed by class id.
pub const CLASS_NAMES: [&str; 3] = ["setosa", "versicolor", "virginica"];

/// Four morphological measurements of one flower, in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl FeatureVector {
    /// Flatten into model input order.
    pub fn to_array(&self) -> [f64; FEATURE_LEN] {
        [
            self.sepal_length,
            self.sepal_width,
            self.petal_length,
            self.petal_width,
        ]
    }
}

/// Check that `names` matches the serving column order exactly.
pub fn matches_contract<S: AsRef<str>>(names: &[S]) -> bool {
    names.len() == FEATURE_LEN
        && names
            .iter()
            .zip(FEATURE_NAMES.iter())
            .all(|(name, expected)| name.as_ref() == *expected)
}
