use crate::error::{PipelineError, Result};
use crate::ml::tree::{CartTree, TreeParams};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bagging settings for a forest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

/// Features drawn per split: floor(sqrt(n)), at least one
pub fn default_max_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt().floor() as usize).max(1)
}

/// Bootstrap-aggregated CART trees
///
/// Tree `i` draws its bootstrap sample and per-split features from a ChaCha8
/// stream seeded with `seed + i`, so the ensemble is identical however rayon
/// schedules the trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<CartTree>,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(
        features: ArrayView2<f64>,
        labels: ArrayView1<usize>,
        params: &ForestParams,
    ) -> Result<Self> {
        let n = features.nrows();
        if n == 0 {
            return Err(PipelineError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if params.n_trees == 0 {
            return Err(PipelineError::Validation(
                "forest needs at least one tree".to_string(),
            ));
        }

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            max_features: Some(default_max_features(features.ncols())),
        };

        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(i as u64));
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                CartTree::fit(features, labels, &rows, &tree_params, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut importances = vec![0.0; features.ncols()];
        for tree in &trees {
            for (total, value) in importances.iter_mut().zip(tree.importances()) {
                *total += value;
            }
        }
        // single-leaf trees contribute nothing, so the mean alone can sum below 1
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        debug!(
            "Grew {} trees (max depth {}, {} features per split)",
            trees.len(),
            params.max_depth,
            tree_params.max_features.unwrap_or(features.ncols())
        );

        Ok(Self { trees, importances })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean of the per-tree normalized importances, renormalized to sum to 1
    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(CartTree::depth).max().unwrap_or(0)
    }

    /// Mean positive-class probability over all trees
    pub fn predict_proba(&self, features: ArrayView2<f64>) -> Array1<f64> {
        let mut sum = Array1::<f64>::zeros(features.nrows());
        for tree in &self.trees {
            sum += &tree.predict_proba(features);
        }
        sum / self.trees.len() as f64
    }
}
