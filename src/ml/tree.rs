use crate::error::{PipelineError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Growth limits for one CART tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Root is depth 0; nodes at this depth are always leaves
    pub max_depth: usize,

    /// Nodes with fewer rows are not split
    pub min_samples_split: usize,

    /// Features drawn per split; `None` considers all of them
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        /// Training rows per class (negative, positive)
        counts: [usize; 2],
    },
    Split {
        feature: usize,
        /// Rows with `value <= threshold` go left
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity_decrease: f64,
}

/// Binary classification tree grown greedily on Gini impurity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartTree {
    root: TreeNode,
    n_features: usize,
    /// Normalized total impurity decrease per feature (sums to 1 unless the
    /// tree is a single leaf)
    importances: Vec<f64>,
}

fn gini(counts: [usize; 2]) -> f64 {
    let total = (counts[0] + counts[1]) as f64;
    if total == 0.0 {
        return 0.0;
    }
    let p0 = counts[0] as f64 / total;
    let p1 = counts[1] as f64 / total;
    1.0 - p0 * p0 - p1 * p1
}

fn class_counts(labels: ArrayView1<usize>, rows: &[usize]) -> [usize; 2] {
    let mut counts = [0usize; 2];
    for &i in rows {
        counts[labels[i].min(1)] += 1;
    }
    counts
}

impl CartTree {
    /// Grow a tree on the rows listed in `rows` (repeats allowed, as in a
    /// bootstrap sample)
    pub fn fit(
        features: ArrayView2<f64>,
        labels: ArrayView1<usize>,
        rows: &[usize],
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Result<Self> {
        if rows.is_empty() {
            return Err(PipelineError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if features.nrows() != labels.len() {
            return Err(PipelineError::Training(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }

        let n_features = features.ncols();
        let mut importances = vec![0.0; n_features];
        let mut builder = TreeBuilder {
            features,
            labels,
            params,
            n_total: rows.len() as f64,
            importances: &mut importances,
            rng,
        };
        let root = builder.build(rows.to_vec(), 0);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            root,
            n_features,
            importances,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    /// Depth of the deepest leaf
    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }

    /// Positive-class share of the leaf `row` falls into
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { counts } => {
                    let total = counts[0] + counts[1];
                    return if total == 0 {
                        0.0
                    } else {
                        counts[1] as f64 / total as f64
                    };
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn predict_proba(&self, features: ArrayView2<f64>) -> Array1<f64> {
        features
            .rows()
            .into_iter()
            .map(|row| self.predict_row(row))
            .collect()
    }
}

/// `'d` is the training data, `'b` the state borrowed for one fit
struct TreeBuilder<'f, 'l, 'b> {
    features: ArrayView2<'f, f64>,
    labels: ArrayView1<'l, usize>,
    params: &'b TreeParams,
    n_total: f64,
    importances: &'b mut [f64],
    rng: &'b mut ChaCha8Rng,
}

impl TreeBuilder<'_, '_, '_> {
    fn build(&mut self, rows: Vec<usize>, depth: usize) -> TreeNode {
        let counts = class_counts(self.labels, &rows);
        let pure = counts[0] == 0 || counts[1] == 0;

        if pure || depth >= self.params.max_depth || rows.len() < self.params.min_samples_split {
            return TreeNode::Leaf { counts };
        }

        let Some(best) = self.find_best_split(&rows, counts) else {
            return TreeNode::Leaf { counts };
        };

        self.importances[best.feature] +=
            rows.len() as f64 / self.n_total * best.impurity_decrease;

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.features[[i, best.feature]] <= best.threshold);

        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);

        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n = self.features.ncols();
        match self.params.max_features {
            Some(k) if k < n => {
                let mut drawn = index::sample(&mut *self.rng, n, k.max(1)).into_vec();
                drawn.sort_unstable();
                drawn
            }
            _ => (0..n).collect(),
        }
    }

    /// Lowest weighted child impurity over the candidate features; thresholds
    /// are midpoints between consecutive distinct values
    fn find_best_split(&mut self, rows: &[usize], counts: [usize; 2]) -> Option<BestSplit> {
        let parent = gini(counts);
        let n = rows.len() as f64;
        let mut best: Option<BestSplit> = None;

        for feature in self.candidate_features() {
            let mut values: Vec<(f64, usize)> = rows
                .iter()
                .map(|&i| (self.features[[i, feature]], self.labels[i].min(1)))
                .collect();
            values.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = [0usize; 2];
            for i in 1..values.len() {
                left[values[i - 1].1] += 1;

                let (lo, hi) = (values[i - 1].0, values[i].0);
                if lo >= hi {
                    continue;
                }

                let right = [counts[0] - left[0], counts[1] - left[1]];
                let n_left = i as f64;
                let child = (n_left * gini(left) + (n - n_left) * gini(right)) / n;
                let decrease = parent - child;

                if decrease > 1e-12
                    && best
                        .as_ref()
                        .map_or(true, |b| decrease > b.impurity_decrease)
                {
                    let mut threshold = lo + (hi - lo) / 2.0;
                    if threshold >= hi {
                        threshold = lo;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        impurity_decrease: decrease,
                    });
                }
            }
        }

        best
    }
}
