//! Isolation forest for unsupervised outlier scoring.
//!
//! Builds many random partition trees over subsamples of the data; points
//! that take fewer partitions to isolate score as more anomalous. Scores
//! follow the sklearn orientation: more negative = more anomalous.

use ndarray::{Array2, ArrayView1};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

const EULER_MASCHERONI: f64 = 0.577_215_664_9;

/// Tunable parameters for the forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees.
    pub n_estimators: usize,
    /// Maximum samples drawn (without replacement) per tree.
    pub max_samples: usize,
    /// Expected anomaly fraction, sets the decision threshold at fit time.
    pub contamination: f64,
    /// RNG seed; a given seed and dataset always produce the same forest.
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.05,
            seed: 42,
        }
    }
}

/// One node of an isolation tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tree {
    root: Node,
}

impl Tree {
    fn build(data: &Array2<f64>, rows: &[usize], max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: build_node(data, rows, 0, max_depth, rng),
        }
    }

    fn path_length(&self, sample: ArrayView1<'_, f64>) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;

        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] < *threshold {
                        left
                    } else {
                        right
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

fn build_node(
    data: &Array2<f64>,
    rows: &[usize],
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= max_depth || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    let feature = rng.gen_range(0..data.ncols());

    let mut min_val = f64::INFINITY;
    let mut max_val = f64::NEG_INFINITY;
    for &row in rows {
        let v = data[[row, feature]];
        min_val = min_val.min(v);
        max_val = max_val.max(v);
    }

    // All values equal along the chosen feature: nothing left to split.
    if (max_val - min_val).abs() < 1e-10 {
        return Node::Leaf { size: rows.len() };
    }

    let threshold = rng.gen_range(min_val..max_val);

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .copied()
        .partition(|&row| data[[row, feature]] < threshold);

    if left_rows.is_empty() || right_rows.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_node(data, &left_rows, depth + 1, max_depth, rng)),
        right: Box::new(build_node(data, &right_rows, depth + 1, max_depth, rng)),
    }
}

/// Average path length of an unsuccessful BST search over `n` points; the
/// normalizing constant from the isolation forest paper.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A fitted isolation forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    params: ForestParams,
    trees: Vec<Tree>,
    subsample_size: usize,
    /// Score threshold below which a point is flagged, set from the
    /// contamination quantile of the training scores.
    offset: f64,
}

impl IsolationForest {
    /// Fits the forest on the training matrix (one row per sample).
    #[must_use]
    pub fn fit(data: &Array2<f64>, params: &ForestParams) -> Self {
        let n_samples = data.nrows();
        let subsample_size = params.max_samples.min(n_samples).max(2);
        let max_depth = (subsample_size as f64).log2().ceil() as usize;

        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees: Vec<Tree> = (0..params.n_estimators)
            .map(|_| {
                let rows: Vec<usize> =
                    (0..n_samples).choose_multiple(&mut rng, subsample_size);
                Tree::build(data, &rows, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            params: params.clone(),
            trees,
            subsample_size,
            offset: 0.0,
        };

        let mut scores = forest.score_samples(data);
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let cutoff = ((n_samples as f64) * forest.params.contamination).ceil() as usize;
        forest.offset = scores[cutoff.min(n_samples - 1)];

        forest
    }

    /// Raw anomaly scores, one per row; more negative = more anomalous.
    #[must_use]
    pub fn score_samples(&self, data: &Array2<f64>) -> Vec<f64> {
        let normalizer = average_path_length(self.subsample_size);

        (0..data.nrows())
            .map(|i| {
                let sample = data.row(i);
                let mean_path: f64 = self
                    .trees
                    .iter()
                    .map(|tree| tree.path_length(sample))
                    .sum::<f64>()
                    / self.trees.len() as f64;

                if normalizer > 0.0 {
                    -(2.0_f64.powf(-mean_path / normalizer))
                } else {
                    -0.5
                }
            })
            .collect()
    }

    /// Binary anomaly flags, one per row: true when a row's score falls
    /// below the threshold learned at fit time.
    #[must_use]
    pub fn predict(&self, data: &Array2<f64>) -> Vec<bool> {
        self.score_samples(data)
            .into_iter()
            .map(|score| score < self.offset)
            .collect()
    }
}
