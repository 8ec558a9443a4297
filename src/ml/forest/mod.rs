//! Deterministic random-forest classifier.
//!
//! A bagged ensemble of CART trees grown on Gini impurity with per-node
//! feature subsampling. It avoids external ML dependencies while still
//! supporting:
//! - Multi-class probability estimates (mean of leaf class distributions).
//! - Fully seeded training, so equal options give byte-identical models.
//! - Reproducible JSON model export/load.

mod model;
mod train;

pub use model::{DecisionTree, ForestError, MODEL_VERSION, Node, RandomForestModel};
pub use train::{ForestOptions, train_random_forest};
