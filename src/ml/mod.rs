//! Machine learning building blocks for training and inference.
//!
//! The forest is trained by `irisml-train` and scored by the server; both
//! sides live here so the artifact format has a single owner.

pub mod classifier;
pub mod forest;
pub mod metrics;
