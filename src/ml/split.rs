use crate::error::{PipelineError, Result};
use crate::ml::models::TrainingDataset;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Disjoint train/test partition of a labeled dataset
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: TrainingDataset,
    pub test: TrainingDataset,
}

/// Number of holdout rows for `n` labeled rows
///
/// Rounds up, then keeps at least one row on each side.
pub fn test_size(n: usize, test_fraction: f64) -> usize {
    let raw = (n as f64 * test_fraction).ceil() as usize;
    raw.clamp(1, n.saturating_sub(1))
}

/// Seeded random split; the same seed and input always give the same partition
pub fn train_test_split(
    dataset: &TrainingDataset,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    let n = dataset.n_samples();
    if n < 2 {
        return Err(PipelineError::InsufficientData {
            required: 2,
            actual: n,
        });
    }
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::Validation(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = test_size(n, test_fraction);
    let (test_idx, train_idx) = indices.split_at(n_test);

    let split = TrainTestSplit {
        train: dataset.select(train_idx),
        test: dataset.select(test_idx),
    };

    debug!(
        "Split {} labeled rows into {} train / {} test (seed {})",
        n,
        split.train.n_samples(),
        split.test.n_samples(),
        seed
    );

    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use std::collections::HashSet;

    fn dataset(n: usize) -> TrainingDataset {
        TrainingDataset::new(
            (0..n).map(|i| format!("K{i:04}")).collect(),
            Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64),
            Array1::from_shape_fn(n, |i| i % 2),
            vec!["a".into(), "b".into()],
            "fp".into(),
        )
        .unwrap()
    }

    #[test]
    fn test_size_rounding() {
        assert_eq!(test_size(597, 0.25), 150);
        assert_eq!(test_size(100, 0.25), 25);
        assert_eq!(test_size(2, 0.25), 1);
        assert_eq!(test_size(3, 0.9), 2);
    }

    #[test]
    fn test_split_is_a_partition() {
        let ds = dataset(597);
        for seed in [0u64, 1, 42, 7_777] {
            let split = train_test_split(&ds, 0.25, seed).unwrap();
            assert_eq!(split.test.n_samples(), 150);
            assert_eq!(split.train.n_samples(), 447);

            let train: HashSet<&String> = split.train.keys.iter().collect();
            let test: HashSet<&String> = split.test.keys.iter().collect();
            assert!(train.is_disjoint(&test));
            assert_eq!(train.len() + test.len(), 597);
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let ds = dataset(50);
        let a = train_test_split(&ds, 0.25, 42).unwrap();
        let b = train_test_split(&ds, 0.25, 42).unwrap();
        assert_eq!(a.test.keys, b.test.keys);
        assert_eq!(a.train.keys, b.train.keys);

        let c = train_test_split(&ds, 0.25, 43).unwrap();
        assert_ne!(a.test.keys, c.test.keys);
    }

    #[test]
    fn test_rows_stay_aligned() {
        let ds = dataset(20);
        let split = train_test_split(&ds, 0.25, 3).unwrap();
        for (i, key) in split.test.keys.iter().enumerate() {
            let original: usize = key[1..].parse().unwrap();
            assert_eq!(split.test.features[[i, 0]], (original * 2) as f64);
            assert_eq!(split.test.labels[i], original % 2);
        }
    }

    #[test]
    fn test_too_few_rows() {
        let ds = dataset(1);
        assert!(matches!(
            train_test_split(&ds, 0.25, 42),
            Err(PipelineError::InsufficientData { .. })
        ));
    }
}
