use thiserror::Error;

use super::{Dataset, TARGET_COLUMN};
use crate::features::{CLASS_NAMES, FEATURE_NAMES};

/// Fisher's Iris measurements, 50 rows per class.
pub const IRIS_CSV: &str = include_str!("../../data/iris.csv");

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset is empty")]
    Empty,
    #[error("unexpected header: {0}")]
    InvalidHeader(String),
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: invalid number `{value}`")]
    InvalidNumber { line: usize, value: String },
    #[error("line {line}: label {label} is not one of {n_classes} classes")]
    InvalidLabel {
        line: usize,
        label: String,
        n_classes: usize,
    },
}

/// Load the embedded Iris dataset.
pub fn load_iris() -> Result<Dataset, DatasetError> {
    parse_csv(IRIS_CSV)
}

/// Parse a CSV table whose header is the feature columns followed by `target`.
///
/// Empty cells and `nan` parse as missing values (`f64::NAN`); labels must be
/// integer class ids.
pub fn parse_csv(text: &str) -> Result<Dataset, DatasetError> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());
    let (_, header) = lines.next().ok_or(DatasetError::Empty)?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let expected_header: Vec<&str> = FEATURE_NAMES
        .iter()
        .copied()
        .chain(std::iter::once(TARGET_COLUMN))
        .collect();
    if columns != expected_header {
        return Err(DatasetError::InvalidHeader(header.to_string()));
    }

    let n_classes = CLASS_NAMES.len();
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != columns.len() {
            return Err(DatasetError::FieldCount {
                line: line_no,
                expected: columns.len(),
                found: fields.len(),
            });
        }
        let (label_field, feature_fields) = fields.split_last().ok_or(DatasetError::Empty)?;
        let row = feature_fields
            .iter()
            .map(|value| parse_value(value, line_no))
            .collect::<Result<Vec<f64>, _>>()?;
        let label = label_field
            .parse::<usize>()
            .ok()
            .filter(|&label| label < n_classes)
            .ok_or_else(|| DatasetError::InvalidLabel {
                line: line_no,
                label: label_field.to_string(),
                n_classes,
            })?;
        x.push(row);
        y.push(label);
    }
    if x.is_empty() {
        return Err(DatasetError::Empty);
    }

    Ok(Dataset {
        feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        class_names: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
        x,
        y,
    })
}

fn parse_value(value: &str, line: usize) -> Result<f64, DatasetError> {
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    value
        .parse::<f64>()
        .map_err(|_| DatasetError::InvalidNumber {
            line,
            value: value.to_string(),
        })
}
