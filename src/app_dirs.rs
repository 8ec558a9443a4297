//! Project directory helpers anchored to a single project root.
//!
//! Training, serving and reporting all agree on where artifacts, reports and
//! logs live. The root defaults to the current working directory and can be
//! redirected with `IRISML_HOME` for tests or side-by-side checkouts.

use std::{
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

use thiserror::Error;

/// Environment variable that overrides the project root.
pub const HOME_ENV: &str = "IRISML_HOME";
/// Directory holding the model and evaluation artifacts.
pub const ARTIFACTS_DIR_NAME: &str = "artifacts";
/// Directory holding generated HTML reports.
pub const REPORTS_DIR_NAME: &str = "reports";
/// Directory holding per-launch log files.
pub const LOGS_DIR_NAME: &str = "logs";

static ROOT_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

/// Errors that can occur while resolving or preparing project directories.
#[derive(Debug, Error)]
pub enum AppDirError {
    /// The current working directory could not be determined.
    #[error("Unable to resolve the current directory: {0}")]
    NoBaseDir(std::io::Error),
    /// Failed to create a project directory.
    #[error("Failed to create directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Return the project root without creating anything.
pub fn project_root() -> Result<PathBuf, AppDirError> {
    if let Some(path) = ROOT_OVERRIDE.lock().ok().and_then(|guard| guard.clone()) {
        return Ok(path);
    }
    if let Ok(path) = std::env::var(HOME_ENV)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }
    std::env::current_dir().map_err(AppDirError::NoBaseDir)
}

/// Return the artifacts directory path. The directory is not created.
pub fn artifacts_dir() -> Result<PathBuf, AppDirError> {
    Ok(project_root()?.join(ARTIFACTS_DIR_NAME))
}

/// Return the reports directory, creating it if needed.
pub fn reports_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(project_root()?.join(REPORTS_DIR_NAME))
}

/// Return the logs directory, creating it if needed.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(project_root()?.join(LOGS_DIR_NAME))
}

/// Create `path` and its parents, returning it on success.
pub fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
fn set_root_override(path: PathBuf) {
    let mut guard = ROOT_OVERRIDE
        .lock()
        .expect("root override mutex poisoned");
    *guard = Some(path);
}

#[cfg(test)]
fn clear_root_override() {
    let mut guard = ROOT_OVERRIDE
        .lock()
        .expect("root override mutex poisoned");
    *guard = None;
}
