//! The embedded Iris dataset and deterministic train/test splitting.

mod iris;
mod split;

pub use iris::{DatasetError, IRIS_CSV, load_iris, parse_csv};
pub use split::{SplitError, TrainTestSplit, stratified_split};

/// Name of the label column in tabular views of a dataset.
pub const TARGET_COLUMN: &str = "target";

/// In-memory tabular dataset with integer class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Feature column names, in row order.
    pub feature_names: Vec<String>,
    /// Class names indexed by label.
    pub class_names: Vec<String>,
    /// Feature matrix, row-major.
    pub x: Vec<Vec<f64>>,
    /// Class indices aligned with `x`.
    pub y: Vec<usize>,
}

impl Dataset {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Number of classes.
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    /// `(rows, columns)` including the target column.
    pub fn shape(&self) -> (usize, usize) {
        (self.len(), self.feature_names.len() + 1)
    }

    /// Column names including the trailing target column.
    pub fn column_names(&self) -> Vec<String> {
        let mut columns = self.feature_names.clone();
        columns.push(TARGET_COLUMN.to_string());
        columns
    }

    /// Copy the rows at `indices` into a new dataset with the same schema.
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            class_names: self.class_names.clone(),
            x: indices.iter().map(|&i| self.x[i].clone()).collect(),
            y: indices.iter().map(|&i| self.y[i]).collect(),
        }
    }

    /// Count rows per class label.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes()];
        for &label in &self.y {
            if let Some(slot) = counts.get_mut(label) {
                *slot += 1;
            }
        }
        counts
    }
}
