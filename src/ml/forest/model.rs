use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Artifact format version written by this build.
pub const MODEL_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum ForestError {
    #[error("failed to read model {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode model: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid model: {0}")]
    Invalid(String),
    #[error("invalid training input: {0}")]
    Training(String),
}

/// One node of a flattened decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Internal node routing `feature <= threshold` left, everything else right.
    Split {
        feature_index: u16,
        threshold: f64,
        left: u32,
        right: u32,
    },
    /// Terminal node holding a normalized class distribution.
    Leaf { distribution: Vec<f64> },
}

/// CART tree stored as a node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    /// Walk the tree and return the leaf distribution for a feature vector.
    ///
    /// Missing features read as `0.0`; `NaN` compares false and routes right.
    pub fn leaf_distribution(&self, features: &[f64]) -> &[f64] {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature_index,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features
                        .get(*feature_index as usize)
                        .copied()
                        .unwrap_or(0.0);
                    idx = if value <= *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
            }
        }
    }

    /// Depth of the deepest leaf (a lone root leaf has depth 0).
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => {
                    1 + walk(nodes, *left as usize).max(walk(nodes, *right as usize))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { distribution } => {
                    if distribution.len() != n_classes {
                        return Err(format!(
                            "leaf {idx} has {} probabilities but expected {n_classes}",
                            distribution.len()
                        ));
                    }
                }
                Node::Split {
                    feature_index,
                    left,
                    right,
                    ..
                } => {
                    if *feature_index as usize >= n_features {
                        return Err(format!(
                            "node {idx} splits on feature {feature_index} of {n_features}"
                        ));
                    }
                    // Children always follow their parent, which also rules out cycles.
                    for child in [*left as usize, *right as usize] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {idx} has invalid child {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Random-forest model for multi-class classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestModel {
    /// Model format version.
    pub model_version: i64,
    /// Feature columns the model was trained on, in input order.
    pub feature_names: Vec<String>,
    /// Ordered list of class names.
    pub classes: Vec<String>,
    /// Number of trees requested at training time.
    pub n_estimators: usize,
    /// Depth limit used at training time.
    pub max_depth: usize,
    /// Seed used at training time.
    pub random_state: u64,
    pub trees: Vec<DecisionTree>,
}

impl RandomForestModel {
    /// Validate structural invariants of the model.
    pub fn validate(&self) -> Result<(), ForestError> {
        if self.model_version != MODEL_VERSION {
            return Err(ForestError::Invalid(format!(
                "unsupported model_version {} (expected {MODEL_VERSION})",
                self.model_version
            )));
        }
        if self.classes.len() < 2 {
            return Err(ForestError::Invalid(
                "model must contain at least 2 classes".to_string(),
            ));
        }
        if self.trees.is_empty() {
            return Err(ForestError::Invalid("model has no trees".to_string()));
        }
        for (tree_idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_names.len(), self.classes.len())
                .map_err(|err| ForestError::Invalid(format!("tree {tree_idx}: {err}")))?;
        }
        Ok(())
    }

    /// Decode and validate a model from JSON bytes.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ForestError> {
        let model: Self = serde_json::from_slice(bytes)?;
        model.validate()?;
        Ok(model)
    }

    /// Load a model from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self, ForestError> {
        let bytes = std::fs::read(path).map_err(|source| ForestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_slice(&bytes)
    }

    /// Predict class probabilities as the mean of the trees' leaf distributions.
    pub fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0f64; self.classes.len()];
        for tree in &self.trees {
            for (slot, p) in proba.iter_mut().zip(tree.leaf_distribution(features)) {
                *slot += p;
            }
        }
        let n_trees = self.trees.len().max(1) as f64;
        for p in &mut proba {
            *p /= n_trees;
        }
        proba
    }

    /// Predict the most probable class index; ties go to the lowest index.
    pub fn predict_class_index(&self, features: &[f64]) -> usize {
        argmax(&self.predict_proba(features))
    }
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f64::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(threshold: f64, left: Vec<f64>, right: Vec<f64>) -> DecisionTree {
        DecisionTree {
            nodes: vec![
                Node::Split {
                    feature_index: 0,
                    threshold,
                    left: 1,
                    right: 2,
                },
                Node::Leaf { distribution: left },
                Node::Leaf {
                    distribution: right,
                },
            ],
        }
    }

    fn two_tree_model() -> RandomForestModel {
        RandomForestModel {
            model_version: MODEL_VERSION,
            feature_names: vec!["a".into(), "b".into()],
            classes: vec!["x".into(), "y".into()],
            n_estimators: 2,
            max_depth: 1,
            random_state: 0,
            trees: vec![
                stump(0.5, vec![1.0, 0.0], vec![0.0, 1.0]),
                stump(1.5, vec![1.0, 0.0], vec![0.0, 1.0]),
            ],
        }
    }

    #[test]
    fn leaf_routing_uses_inclusive_threshold() {
        let tree = stump(0.5, vec![1.0, 0.0], vec![0.0, 1.0]);
        assert_eq!(tree.leaf_distribution(&[0.5]), &[1.0, 0.0]);
        assert_eq!(tree.leaf_distribution(&[0.6]), &[0.0, 1.0]);
        assert_eq!(tree.leaf_distribution(&[f64::NAN]), &[0.0, 1.0]);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn proba_averages_trees() {
        let model = two_tree_model();
        assert_eq!(model.predict_proba(&[0.0, 0.0]), vec![1.0, 0.0]);
        assert_eq!(model.predict_proba(&[1.0, 0.0]), vec![0.5, 0.5]);
        assert_eq!(model.predict_proba(&[2.0, 0.0]), vec![0.0, 1.0]);
        // Tie resolves to the lowest class index.
        assert_eq!(model.predict_class_index(&[1.0, 0.0]), 0);
        assert_eq!(model.predict_class_index(&[2.0, 0.0]), 1);
    }

    #[test]
    fn validate_rejects_backward_child() {
        let mut model = two_tree_model();
        model.trees[0].nodes[0] = Node::Split {
            feature_index: 0,
            threshold: 0.0,
            left: 0,
            right: 2,
        };
        assert!(matches!(model.validate(), Err(ForestError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_unknown_feature() {
        let mut model = two_tree_model();
        model.trees[1].nodes[0] = Node::Split {
            feature_index: 9,
            threshold: 0.0,
            left: 1,
            right: 2,
        };
        assert!(matches!(model.validate(), Err(ForestError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_other_versions() {
        let mut model = two_tree_model();
        model.model_version = MODEL_VERSION + 1;
        assert!(model.validate().is_err());
    }

    #[test]
    fn json_decode_validates() {
        let mut model = two_tree_model();
        model.trees.clear();
        let bytes = serde_json::to_vec(&model).unwrap();
        assert!(matches!(
            RandomForestModel::from_json_slice(&bytes),
            Err(ForestError::Invalid(_))
        ));
        assert!(matches!(
            RandomForestModel::from_json_slice(b"{not json"),
            Err(ForestError::Decode(_))
        ));
    }

    #[test]
    fn json_preserves_every_float_bit() {
        let mut model = two_tree_model();
        model.trees[0] = stump(0.1 + 0.2, vec![1.0 / 3.0, 2.0 / 3.0], vec![2.0 / 7.0, 5.0 / 7.0]);
        model.trees[1] = stump((4.9 + 5.0) / 2.0, vec![0.1, 0.9], vec![1.0 / 9.0, 8.0 / 9.0]);
        let bytes = serde_json::to_vec_pretty(&model).unwrap();
        let decoded = RandomForestModel::from_json_slice(&bytes).unwrap();
        assert_eq!(decoded, model);
        assert_eq!(decoded.predict_proba(&[0.3, 0.0]), model.predict_proba(&[0.3, 0.0]));
    }
}
