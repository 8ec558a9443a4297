use rand::{Rng, SeedableRng, rngs::StdRng, seq::index};

use super::model::{DecisionTree, ForestError, MODEL_VERSION, Node, RandomForestModel};
use crate::dataset::Dataset;

/// Training hyperparameters for the forest.
#[derive(Debug, Clone)]
pub struct ForestOptions {
    /// Number of trees.
    pub n_estimators: usize,
    /// Maximum depth of each tree.
    pub max_depth: usize,
    /// Features considered per split; `None` means `round(sqrt(n_features))`.
    pub max_features: Option<usize>,
    /// Seed for bootstrapping and feature sampling.
    pub seed: u64,
}

impl Default for ForestOptions {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 4,
            max_features: None,
            seed: 42,
        }
    }
}

/// Fit a random forest on `dataset`.
pub fn train_random_forest(
    dataset: &Dataset,
    options: &ForestOptions,
) -> Result<RandomForestModel, ForestError> {
    if dataset.x.len() != dataset.y.len() {
        return Err(ForestError::Training("mismatched X/Y lengths".to_string()));
    }
    if dataset.is_empty() {
        return Err(ForestError::Training("empty dataset".to_string()));
    }
    if options.n_estimators == 0 {
        return Err(ForestError::Training(
            "n_estimators must be at least 1".to_string(),
        ));
    }
    let n_classes = dataset.n_classes();
    if n_classes < 2 {
        return Err(ForestError::Training("need at least 2 classes".to_string()));
    }
    if let Some(label) = dataset.y.iter().find(|&&label| label >= n_classes) {
        return Err(ForestError::Training(format!(
            "label {label} out of range for {n_classes} classes"
        )));
    }
    let n_features = dataset.feature_names.len();
    if n_features == 0 || n_features > u16::MAX as usize {
        return Err(ForestError::Training(format!(
            "unsupported feature count {n_features}"
        )));
    }
    if let Some(row) = dataset.x.iter().position(|row| row.len() != n_features) {
        return Err(ForestError::Training(format!(
            "row {row} does not have {n_features} features"
        )));
    }

    let max_features = options
        .max_features
        .unwrap_or_else(|| (n_features as f64).sqrt().round() as usize)
        .clamp(1, n_features);
    let grower = TreeGrower {
        x: &dataset.x,
        y: &dataset.y,
        n_classes,
        n_features,
        max_features,
        max_depth: options.max_depth,
    };

    let n = dataset.len();
    let mut trees = Vec::with_capacity(options.n_estimators);
    for tree_idx in 0..options.n_estimators {
        let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(tree_idx as u64));
        let mut rows: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
        trees.push(grower.grow(&mut rows, &mut rng));
    }

    Ok(RandomForestModel {
        model_version: MODEL_VERSION,
        feature_names: dataset.feature_names.clone(),
        classes: dataset.class_names.clone(),
        n_estimators: options.n_estimators,
        max_depth: options.max_depth,
        random_state: options.seed,
        trees,
    })
}

struct TreeGrower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    n_features: usize,
    max_features: usize,
    max_depth: usize,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    impurity: f64,
    feature_index: usize,
    threshold: f64,
}

impl TreeGrower<'_> {
    fn grow(&self, rows: &mut [usize], rng: &mut StdRng) -> DecisionTree {
        let mut nodes = Vec::new();
        self.grow_node(&mut nodes, rows, 0, rng);
        DecisionTree { nodes }
    }

    fn grow_node(
        &self,
        nodes: &mut Vec<Node>,
        rows: &mut [usize],
        depth: usize,
        rng: &mut StdRng,
    ) -> u32 {
        let counts = self.class_counts(rows);
        let node_idx = nodes.len();
        nodes.push(leaf(&counts));

        let parent_impurity = gini(&counts, rows.len());
        if depth >= self.max_depth || rows.len() < 2 || parent_impurity <= 0.0 {
            return node_idx as u32;
        }

        let mut features = index::sample(rng, self.n_features, self.max_features).into_vec();
        features.sort_unstable();
        let Some(best) = features
            .into_iter()
            .filter_map(|feature| self.best_split_for_feature(rows, feature))
            .fold(None::<SplitCandidate>, |best, candidate| match best {
                Some(current) if current.impurity <= candidate.impurity => Some(current),
                _ => Some(candidate),
            })
        else {
            return node_idx as u32;
        };
        if best.impurity >= parent_impurity - 1e-12 {
            return node_idx as u32;
        }

        let split_at = partition(rows, |row| {
            self.x[row][best.feature_index] <= best.threshold
        });
        let (left_rows, right_rows) = rows.split_at_mut(split_at);
        let left = self.grow_node(nodes, left_rows, depth + 1, rng);
        let right = self.grow_node(nodes, right_rows, depth + 1, rng);
        nodes[node_idx] = Node::Split {
            feature_index: best.feature_index as u16,
            threshold: best.threshold,
            left,
            right,
        };
        node_idx as u32
    }

    /// Lowest weighted Gini over midpoints between consecutive distinct values.
    fn best_split_for_feature(&self, rows: &[usize], feature: usize) -> Option<SplitCandidate> {
        let mut values: Vec<(f64, usize)> = rows
            .iter()
            .map(|&row| (self.x[row][feature], self.y[row]))
            .collect();
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total = values.len();
        let total_counts = self.class_counts(rows);
        let mut left_counts = vec![0usize; self.n_classes];
        let mut best: Option<SplitCandidate> = None;
        for i in 0..total - 1 {
            left_counts[values[i].1] += 1;
            let (value, next) = (values[i].0, values[i + 1].0);
            if !(value < next) {
                continue;
            }
            let threshold = value + (next - value) / 2.0;
            if !threshold.is_finite() {
                continue;
            }
            let n_left = i + 1;
            let n_right = total - n_left;
            let right_counts: Vec<usize> = total_counts
                .iter()
                .zip(&left_counts)
                .map(|(all, left)| all - left)
                .collect();
            let impurity = (n_left as f64 * gini(&left_counts, n_left)
                + n_right as f64 * gini(&right_counts, n_right))
                / total as f64;
            if best.is_none_or(|current| impurity < current.impurity) {
                best = Some(SplitCandidate {
                    impurity,
                    feature_index: feature,
                    threshold,
                });
            }
        }
        best
    }

    fn class_counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &row in rows {
            counts[self.y[row]] += 1;
        }
        counts
    }
}

fn leaf(counts: &[usize]) -> Node {
    let total = counts.iter().sum::<usize>().max(1) as f64;
    Node::Leaf {
        distribution: counts.iter().map(|&c| c as f64 / total).collect(),
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Reorder `rows` so entries matching `pred` come first; returns their count.
fn partition(rows: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut split = 0usize;
    for i in 0..rows.len() {
        if pred(rows[i]) {
            rows.swap(split, i);
            split += 1;
        }
    }
    split
}
