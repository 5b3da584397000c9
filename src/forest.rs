//! Random forest classifier.
//!
//! CART trees with Gini impurity, grown to purity on bootstrap samples, considering a random
//! subset of `sqrt(n_features)` features at each split. Prediction is a majority vote.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Forest hyper-parameters.
#[derive(Debug, Clone)]
pub struct ForestParams {
    pub tree_count: usize,
    /// Features considered per split. `None` means `sqrt(n_features)`.
    pub max_features: Option<usize>,
    /// Nodes with fewer samples than this become leaves.
    pub min_samples_split: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            tree_count: 100,
            max_features: None,
            min_samples_split: 2,
            max_depth: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        class: u16,
    },
    Split {
        feature: u16,
        threshold: f32,
        left: u32,
        right: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn predict(&self, features: &[f32]) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { class } => return *class as usize,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature as usize] <= *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[idx] {
                stack.push((*left as usize, depth + 1));
                stack.push((*right as usize, depth + 1));
            }
        }
        max_depth
    }
}

/// A trained random forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fits a forest on `samples` (one row per sample) with class indices `labels`.
    pub fn fit(
        samples: &[Vec<f32>],
        labels: &[usize],
        n_classes: usize,
        params: &ForestParams,
    ) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::MalformedArtifact {
                artifact: "training set",
                reason: "no samples".to_string(),
            });
        }
        if samples.len() != labels.len() {
            return Err(Error::MalformedArtifact {
                artifact: "training set",
                reason: format!("{} samples but {} labels", samples.len(), labels.len()),
            });
        }
        let n_features = samples[0].len();
        if let Some(row) = samples.iter().find(|row| row.len() != n_features) {
            return Err(Error::InvalidFeatureLength {
                expected: n_features,
                actual: row.len(),
            });
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(Error::MalformedArtifact {
                artifact: "training set",
                reason: format!("label {} out of range for {} classes", label, n_classes),
            });
        }

        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .clamp(1, n_features.max(1));

        let mut rng = StdRng::seed_from_u64(params.seed);
        let builder = TreeBuilder {
            samples,
            labels,
            n_classes,
            n_features,
            max_features,
            min_samples_split: params.min_samples_split.max(2),
            max_depth: params.max_depth,
        };

        let trees = (0..params.tree_count.max(1))
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.random());
                let bootstrap: Vec<usize> = (0..samples.len())
                    .map(|_| tree_rng.random_range(0..samples.len()))
                    .collect();
                builder.build(bootstrap, &mut tree_rng)
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Fitted {} trees (max depth {})",
            trees.len(),
            trees.iter().map(DecisionTree::depth).max().unwrap_or(0)
        );

        Ok(Self {
            n_features,
            n_classes,
            trees,
        })
    }

    /// Number of features the forest was trained on.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Predicts the class index for one sample.
    ///
    /// Fails with [`Error::InvalidFeatureLength`] if `features` does not match the training
    /// width.
    pub fn predict(&self, features: &[f32]) -> Result<usize> {
        if features.len() != self.n_features {
            return Err(Error::InvalidFeatureLength {
                expected: self.n_features,
                actual: features.len(),
            });
        }

        let mut votes = vec![0u32; self.n_classes];
        for tree in &self.trees {
            votes[tree.predict(features)] += 1;
        }

        // Ties go to the lowest class index.
        let mut best = 0;
        for (class, &count) in votes.iter().enumerate() {
            if count > votes[best] {
                best = class;
            }
        }
        Ok(best)
    }
}

struct TreeBuilder<'a> {
    samples: &'a [Vec<f32>],
    labels: &'a [usize],
    n_classes: usize,
    n_features: usize,
    max_features: usize,
    min_samples_split: usize,
    max_depth: Option<usize>,
}

struct BestSplit {
    feature: usize,
    threshold: f32,
    score: f64,
}

impl TreeBuilder<'_> {
    fn build(&self, root: Vec<usize>, rng: &mut StdRng) -> DecisionTree {
        let mut nodes = vec![Node::Leaf { class: 0 }];
        let mut stack = vec![(0usize, root, 0usize)];
        let mut features: Vec<usize> = (0..self.n_features).collect();

        while let Some((node_id, indices, depth)) = stack.pop() {
            let counts = self.class_counts(&indices);
            let majority = counts
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
                .map(|(class, _)| class)
                .unwrap_or(0);
            let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
            let depth_reached = self.max_depth.is_some_and(|d| depth >= d);

            let split = if pure || depth_reached || indices.len() < self.min_samples_split {
                None
            } else {
                features.shuffle(rng);
                self.best_split(&indices, &features)
            };

            let Some(split) = split else {
                nodes[node_id] = Node::Leaf {
                    class: majority as u16,
                };
                continue;
            };

            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&i| self.samples[i][split.feature] <= split.threshold);

            let left_id = nodes.len();
            nodes.push(Node::Leaf { class: 0 });
            let right_id = nodes.len();
            nodes.push(Node::Leaf { class: 0 });
            nodes[node_id] = Node::Split {
                feature: split.feature as u16,
                threshold: split.threshold,
                left: left_id as u32,
                right: right_id as u32,
            };
            stack.push((left_id, left, depth + 1));
            stack.push((right_id, right, depth + 1));
        }

        DecisionTree { nodes }
    }

    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in indices {
            counts[self.labels[i]] += 1;
        }
        counts
    }

    /// Searches features in the given (shuffled) order until `max_features` non-constant ones
    /// have been evaluated, and returns the split with the lowest weighted Gini impurity.
    fn best_split(&self, indices: &[usize], features: &[usize]) -> Option<BestSplit> {
        let total_counts = self.class_counts(indices);
        let n = indices.len();
        let mut best: Option<BestSplit> = None;
        let mut evaluated = 0;
        let mut column: Vec<(f32, usize)> = Vec::with_capacity(n);

        for &feature in features {
            if evaluated >= self.max_features {
                break;
            }

            column.clear();
            column.extend(indices.iter().map(|&i| (self.samples[i][feature], self.labels[i])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));
            if column[0].0 == column[n - 1].0 {
                continue;
            }
            evaluated += 1;

            // Maximizing sum(c_l^2)/n_l + sum(c_r^2)/n_r minimizes the weighted Gini impurity.
            let mut left = vec![0usize; self.n_classes];
            let mut right = total_counts.clone();
            let mut sq_left = 0usize;
            let mut sq_right: usize = right.iter().map(|c| c * c).sum();

            for pos in 0..n - 1 {
                let class = column[pos].1;
                sq_left += 2 * left[class] + 1;
                left[class] += 1;
                sq_right -= 2 * right[class] - 1;
                right[class] -= 1;

                let (value, next) = (column[pos].0, column[pos + 1].0);
                if value == next {
                    continue;
                }

                let n_left = (pos + 1) as f64;
                let n_right = (n - pos - 1) as f64;
                let score = sq_left as f64 / n_left + sq_right as f64 / n_right;
                if best.as_ref().map_or(true, |b| score > b.score) {
                    let mut threshold = value + (next - value) / 2.0;
                    // Guard against the midpoint rounding up to `next`.
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        score,
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three well-separated clusters in 4 dimensions.
    fn clusters(per_class: usize) -> (Vec<Vec<f32>>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(7);
        let mut samples = Vec::new();
        let mut labels = Vec::new();
        for class in 0..3 {
            for _ in 0..per_class {
                let center = class as f32 * 10.0;
                samples.push(
                    (0..4)
                        .map(|_| center + rng.random_range(-1.0..1.0))
                        .collect(),
                );
                labels.push(class);
            }
        }
        (samples, labels)
    }

    #[test]
    fn test_fits_separable_clusters() {
        let (samples, labels) = clusters(20);
        let params = ForestParams {
            tree_count: 15,
            ..Default::default()
        };
        let forest = RandomForest::fit(&samples, &labels, 3, &params).unwrap();
        assert_eq!(forest.tree_count(), 15);
        assert_eq!(forest.n_features(), 4);

        for (sample, &label) in samples.iter().zip(&labels) {
            assert_eq!(forest.predict(sample).unwrap(), label);
        }
        assert_eq!(forest.predict(&[20.5, 19.5, 20.0, 20.2]).unwrap(), 2);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (samples, labels) = clusters(10);
        let params = ForestParams {
            tree_count: 5,
            ..Default::default()
        };
        let a = RandomForest::fit(&samples, &labels, 3, &params).unwrap();
        let b = RandomForest::fit(&samples, &labels, 3, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_class_always_predicts_it() {
        let samples = vec![vec![0.1, 0.2], vec![0.3, 0.1], vec![0.2, 0.2]];
        let forest = RandomForest::fit(&samples, &[0, 0, 0], 26, &ForestParams::default()).unwrap();
        assert_eq!(forest.predict(&[5.0, -3.0]).unwrap(), 0);
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (samples, labels) = clusters(5);
        let forest = RandomForest::fit(&samples, &labels, 3, &ForestParams::default()).unwrap();
        assert!(matches!(
            forest.predict(&[1.0, 2.0]),
            Err(Error::InvalidFeatureLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        assert!(RandomForest::fit(&[], &[], 2, &ForestParams::default()).is_err());
        assert!(RandomForest::fit(&[vec![1.0]], &[5], 2, &ForestParams::default()).is_err());
        let ragged = [vec![1.0], vec![1.0, 2.0]];
        assert!(RandomForest::fit(&ragged, &[0, 1], 2, &ForestParams::default()).is_err());
    }
}
