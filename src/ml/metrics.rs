//! Evaluation metrics for classification models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Confusion matrix for a `K`-class classifier.
pub struct ConfusionMatrix {
    /// Number of classes.
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    /// Build a matrix from aligned truth and prediction labels.
    pub fn from_labels(n_classes: usize, truth: &[usize], predicted: &[usize]) -> Self {
        let mut cm = Self::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            cm.add(t, p);
        }
        cm
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    /// Render as CSV: a header of predicted class ids, one row per true class.
    pub fn to_csv(&self) -> String {
        let header: Vec<String> = (0..self.n_classes).map(|k| k.to_string()).collect();
        let mut out = header.join(",");
        out.push('\n');
        for truth in 0..self.n_classes {
            let row: Vec<String> = (0..self.n_classes)
                .map(|pred| self.get(truth, pred).to_string())
                .collect();
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Precision/recall statistics for a single class.
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f32,
    /// `TP / (TP + FN)`.
    pub recall: f32,
    /// Harmonic mean of precision and recall.
    pub f1: f32,
    /// Total number of true examples for the class.
    pub support: u32,
}

/// Per-class scores plus accuracy and macro/weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub class_labels: Vec<String>,
    pub per_class: Vec<PerClassStats>,
    pub accuracy: f32,
    pub macro_avg: PerClassStats,
    pub weighted_avg: PerClassStats,
}

/// Compute per-class precision, recall and F1 from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = cm.get(class_idx, class_idx) as f32;
        let mut fp = 0f32;
        let mut fn_ = 0f32;
        let mut support = 0u32;
        for j in 0..k {
            let v = cm.get(class_idx, j);
            support = support.saturating_add(v);
            if j != class_idx {
                fn_ += v as f32;
            }
        }
        for i in 0..k {
            if i != class_idx {
                fp += cm.get(i, class_idx) as f32;
            }
        }
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        stats.push(PerClassStats {
            precision,
            recall,
            f1: f1_score(precision, recall),
            support,
        });
    }
    stats
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f32 {
    let mut correct = 0u64;
    let mut total = 0u64;
    for truth in 0..cm.n_classes {
        for predicted in 0..cm.n_classes {
            let v = cm.get(truth, predicted) as u64;
            total += v;
            if truth == predicted {
                correct += v;
            }
        }
    }
    if total == 0 {
        0.0
    } else {
        (correct as f32) / (total as f32)
    }
}

/// Build the full classification report for a confusion matrix.
///
/// `class_labels` names the columns; it usually holds the class ids as strings.
pub fn classification_report(cm: &ConfusionMatrix, class_labels: &[String]) -> ClassificationReport {
    let per_class = precision_recall_by_class(cm);
    let total_support: u32 = per_class.iter().map(|s| s.support).sum();
    let k = per_class.len().max(1) as f32;
    let macro_avg = PerClassStats {
        precision: per_class.iter().map(|s| s.precision).sum::<f32>() / k,
        recall: per_class.iter().map(|s| s.recall).sum::<f32>() / k,
        f1: per_class.iter().map(|s| s.f1).sum::<f32>() / k,
        support: total_support,
    };
    let weight = |pick: fn(&PerClassStats) -> f32| {
        if total_support == 0 {
            return 0.0;
        }
        per_class
            .iter()
            .map(|s| pick(s) * s.support as f32)
            .sum::<f32>()
            / total_support as f32
    };
    let weighted_avg = PerClassStats {
        precision: weight(|s| s.precision),
        recall: weight(|s| s.recall),
        f1: weight(|s| s.f1),
        support: total_support,
    };
    ClassificationReport {
        class_labels: class_labels.to_vec(),
        per_class,
        accuracy: accuracy(cm),
        macro_avg,
        weighted_avg,
    }
}

impl ClassificationReport {
    /// Render as CSV with one column per class plus `accuracy`, `macro avg`
    /// and `weighted avg`, and rows `precision`, `recall`, `f1-score`, `support`.
    ///
    /// The `accuracy` column repeats the accuracy in every row, `support`
    /// included.
    pub fn to_csv(&self) -> String {
        let mut columns: Vec<(String, [String; 4])> = self
            .class_labels
            .iter()
            .cloned()
            .zip(self.per_class.iter().map(stat_cells))
            .collect();
        let accuracy = self.accuracy.to_string();
        columns.push((
            "accuracy".to_string(),
            [accuracy.clone(), accuracy.clone(), accuracy.clone(), accuracy],
        ));
        columns.push(("macro avg".to_string(), stat_cells(&self.macro_avg)));
        columns.push(("weighted avg".to_string(), stat_cells(&self.weighted_avg)));

        let mut out = String::new();
        out.push_str(
            &std::iter::once(String::new())
                .chain(columns.iter().map(|(name, _)| name.clone()))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
        for (row, row_name) in ["precision", "recall", "f1-score", "support"]
            .iter()
            .enumerate()
        {
            out.push_str(row_name);
            for (_, cells) in &columns {
                out.push(',');
                out.push_str(&cells[row]);
            }
            out.push('\n');
        }
        out
    }
}

fn stat_cells(stats: &PerClassStats) -> [String; 4] {
    [
        stats.precision.to_string(),
        stats.recall.to_string(),
        stats.f1.to_string(),
        stats.support.to_string(),
    ]
}

fn f1_score(precision: f32, recall: f32) -> f32 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}
