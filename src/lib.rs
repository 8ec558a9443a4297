//! Iris random-forest training, reporting and prediction serving.
/// Project directory resolution.
pub mod app_dirs;
/// Artifact files shared by training and serving.
pub mod artifacts;
/// Training parameters and server settings.
pub mod config;
/// Embedded dataset and train/test splitting.
pub mod dataset;
/// Feature-vector contract.
pub mod features;
/// Concurrent load generator for the prediction server.
pub mod loadtest;
/// Tracing setup.
pub mod logging;
/// Random forest, evaluation metrics and the serving classifier interface.
pub mod ml;
/// Data-quality report.
pub mod report;
/// HTTP prediction server.
pub mod server;
/// The training pipeline.
pub mod training;
