//! Data-quality report over the train/test split.
//!
//! Summarizes shapes, columns, missing values and per-column statistics of
//! both partitions and renders them as a standalone HTML page.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::app_dirs;
use crate::dataset::{Dataset, DatasetError, SplitError, stratified_split};

pub const REPORT_FILE_NAME: &str = "data_quality_report.html";
/// Split ratio used for the report, independent of `params.toml`.
pub const REPORT_TRAIN_SIZE: f64 = 0.8;
/// Seed used for the report split.
pub const REPORT_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("split error: {0}")]
    Split(#[from] SplitError),
    #[error(transparent)]
    Dirs(#[from] app_dirs::AppDirError),
    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Descriptive statistics for one column, pandas `describe()` style.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

/// Everything shown in the HTML report.
#[derive(Debug, Clone, PartialEq)]
pub struct DataQualityReport {
    pub train_shape: (usize, usize),
    pub test_shape: (usize, usize),
    pub columns: Vec<String>,
    /// `(column, dtype)` pairs.
    pub dtypes: Vec<(String, &'static str)>,
    pub missing_train: usize,
    pub missing_test: usize,
    /// Statistics of the training partition.
    pub train_stats: Vec<ColumnStats>,
}

impl DataQualityReport {
    /// Split `dataset` with the fixed report seed and summarize both sides.
    pub fn build(dataset: &Dataset) -> Result<Self, ReportError> {
        let split = stratified_split(dataset, REPORT_TRAIN_SIZE, REPORT_SEED)?;
        let columns = split.train.column_names();
        let dtypes = columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let dtype = if idx < split.train.feature_names.len() {
                    "float64"
                } else {
                    "int64"
                };
                (name.clone(), dtype)
            })
            .collect();
        Ok(Self {
            train_shape: split.train.shape(),
            test_shape: split.test.shape(),
            columns,
            dtypes,
            missing_train: missing_values(&split.train),
            missing_test: missing_values(&split.test),
            train_stats: describe(&split.train),
        })
    }

    /// Render the report as a standalone HTML page.
    pub fn to_html(&self) -> String {
        let mut stats_table = String::from("<table class=\"stats\">\n<tr><th></th>");
        for stats in &self.train_stats {
            let _ = write!(stats_table, "<th>{}</th>", escape_html(&stats.name));
        }
        stats_table.push_str("</tr>\n");
        let rows: [(&str, fn(&ColumnStats) -> f64); 8] = [
            ("count", |s| s.count as f64),
            ("mean", |s| s.mean),
            ("std", |s| s.std),
            ("min", |s| s.min),
            ("25%", |s| s.q25),
            ("50%", |s| s.median),
            ("75%", |s| s.q75),
            ("max", |s| s.max),
        ];
        for (label, pick) in rows {
            let _ = write!(stats_table, "<tr><th>{label}</th>");
            for stats in &self.train_stats {
                let _ = write!(stats_table, "<td>{}</td>", format_stat(pick(stats)));
            }
            stats_table.push_str("</tr>\n");
        }
        stats_table.push_str("</table>");

        let features = escape_html(&format!("{:?}", self.columns));
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <title>Data Quality Report</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; }}
        .section {{ margin: 20px 0; padding: 20px; border: 1px solid #ddd; border-radius: 5px; }}
        .metric {{ margin: 10px 0; }}
        table.stats {{ border-collapse: collapse; }}
        table.stats th, table.stats td {{ border: 1px solid #ddd; padding: 4px 8px; text-align: right; }}
    </style>
</head>
<body>
    <h1>Data Quality Report</h1>

    <div class="section">
        <h2>Dataset Overview</h2>
        <div class="metric"><strong>Training data shape:</strong> {train_shape:?}</div>
        <div class="metric"><strong>Test data shape:</strong> {test_shape:?}</div>
        <div class="metric"><strong>Features:</strong> {features}</div>
    </div>

    <div class="section">
        <h2>Data Quality Metrics</h2>
        <div class="metric"><strong>Missing values in training:</strong> {missing_train}</div>
        <div class="metric"><strong>Missing values in test:</strong> {missing_test}</div>
    </div>

    <div class="section">
        <h2>Feature Statistics</h2>
        {stats_table}
    </div>
</body>
</html>
"#,
            train_shape = self.train_shape,
            test_shape = self.test_shape,
            missing_train = self.missing_train,
            missing_test = self.missing_test,
        )
    }

    /// Write the HTML page to `path`, creating parent directories.
    pub fn write_html(&self, path: &Path) -> Result<(), ReportError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ReportError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, self.to_html()).map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Default report location: `<root>/reports/data_quality_report.html`.
pub fn default_report_path() -> Result<PathBuf, ReportError> {
    Ok(app_dirs::reports_dir()?.join(REPORT_FILE_NAME))
}

/// Count `NaN` cells across the feature matrix.
pub fn missing_values(dataset: &Dataset) -> usize {
    dataset
        .x
        .iter()
        .flatten()
        .filter(|value| value.is_nan())
        .count()
}

/// Per-column statistics for every feature column plus the target.
pub fn describe(dataset: &Dataset) -> Vec<ColumnStats> {
    let mut stats: Vec<ColumnStats> = dataset
        .feature_names
        .iter()
        .enumerate()
        .map(|(col, name)| {
            let values: Vec<f64> = dataset.x.iter().filter_map(|row| row.get(col).copied()).collect();
            column_stats(name, &values)
        })
        .collect();
    let target: Vec<f64> = dataset.y.iter().map(|&label| label as f64).collect();
    stats.push(column_stats(crate::dataset::TARGET_COLUMN, &target));
    stats
}

fn column_stats(name: &str, values: &[f64]) -> ColumnStats {
    let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    present.sort_by(f64::total_cmp);
    let count = present.len();
    let mean = if count == 0 {
        f64::NAN
    } else {
        present.iter().sum::<f64>() / count as f64
    };
    let std = if count < 2 {
        f64::NAN
    } else {
        let ss: f64 = present.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (count - 1) as f64).sqrt()
    };
    ColumnStats {
        name: name.to_string(),
        count,
        mean,
        std,
        min: quantile(&present, 0.0),
        q25: quantile(&present, 0.25),
        median: quantile(&present, 0.5),
        q75: quantile(&present, 0.75),
        max: quantile(&present, 1.0),
    }
}

/// Linear-interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn format_stat(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{value:.6}")
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
