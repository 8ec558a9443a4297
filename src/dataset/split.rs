use std::collections::BTreeMap;

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use thiserror::Error;

use super::Dataset;

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("train_size must be in (0, 1), got {0}")]
    InvalidTrainSize(f64),
    #[error("cannot split an empty dataset")]
    Empty,
}

/// Disjoint train and test partitions of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Dataset,
    pub test: Dataset,
}

/// Split `dataset` per class so both partitions keep the class proportions.
///
/// Each class's rows are shuffled with an RNG seeded from `seed`, then the
/// first `round(n * train_size)` go to train. Classes with at least two rows
/// always contribute to both sides. The same seed and ratio always yield the
/// same partition.
pub fn stratified_split(
    dataset: &Dataset,
    train_size: f64,
    seed: u64,
) -> Result<TrainTestSplit, SplitError> {
    if !(train_size > 0.0 && train_size < 1.0) {
        return Err(SplitError::InvalidTrainSize(train_size));
    }
    if dataset.is_empty() {
        return Err(SplitError::Empty);
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in dataset.y.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_idx = Vec::with_capacity(dataset.len());
    let mut test_idx = Vec::new();
    for (_label, mut indices) in by_class {
        indices.shuffle(&mut rng);
        let n = indices.len();
        let n_train = if n < 2 {
            n
        } else {
            (((n as f64) * train_size).round() as usize).clamp(1, n - 1)
        };
        train_idx.extend_from_slice(&indices[..n_train]);
        test_idx.extend_from_slice(&indices[n_train..]);
    }

    Ok(TrainTestSplit {
        train: dataset.select(&train_idx),
        test: dataset.select(&test_idx),
    })
}
