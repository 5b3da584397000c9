//! Classifier training
//!
//! Loads the corpus, holds out a stratified test partition, fits the random forest on the rest
//! and persists it together with the label table and the measured accuracy.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::thread::{self, JoinHandle};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::alphabet::{ALPHABET, CLASS_COUNT};
use crate::artifact::{self, SchemaTag};
use crate::config::{AppConfig, TrainingConfig};
use crate::dataset::Corpus;
use crate::error::{Error, Result};
use crate::features::FEATURE_LEN;
use crate::forest::{ForestParams, RandomForest};
use crate::status::{StatusEvent, StatusSender};

/// Sample indices of a train/test split.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Splits sample indices into a test partition of `ceil(test_fraction * n)` samples, shared
/// between the classes in proportion to their size.
///
/// Each class first gets the floor of its share. Leftover slots go to the classes with the
/// largest remainders. Classes with at least two samples always land in both partitions, which
/// can push the test partition over its target when there are many small classes. A class
/// with a single sample goes to the training side.
pub fn stratified_split(labels: &[usize], test_fraction: f64, seed: u64) -> Split {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_classes = labels.iter().max().map_or(0, |&m| m + 1);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        by_class[label].push(i);
    }

    let quotas = test_quotas(&by_class, labels.len(), test_fraction);
    let mut split = Split {
        train: Vec::with_capacity(labels.len()),
        test: Vec::new(),
    };
    for (mut members, n_test) in by_class.into_iter().zip(quotas) {
        members.shuffle(&mut rng);
        split.test.extend_from_slice(&members[..n_test]);
        split.train.extend_from_slice(&members[n_test..]);
    }

    split.train.shuffle(&mut rng);
    split
}

/// Number of test samples taken from each class.
fn test_quotas(by_class: &[Vec<usize>], total: usize, test_fraction: f64) -> Vec<usize> {
    if total == 0 {
        return vec![0; by_class.len()];
    }
    // The epsilon keeps 0.2 * 260 from rounding up to 53.
    let target = ((total as f64 * test_fraction) - 1e-9).ceil().clamp(0.0, total as f64) as usize;

    let mut quotas = vec![0; by_class.len()];
    let mut remainders = vec![0; by_class.len()];
    for (class, members) in by_class.iter().enumerate() {
        let n = members.len();
        if n < 2 {
            continue;
        }
        let share = n * target;
        quotas[class] = (share / total).clamp(1, n - 1);
        remainders[class] = share % total;
    }

    let mut order: Vec<usize> = (0..by_class.len()).filter(|&c| by_class[c].len() >= 2).collect();
    order.sort_by(|&a, &b| remainders[b].cmp(&remainders[a]).then(a.cmp(&b)));

    let mut assigned: usize = quotas.iter().sum();
    while assigned < target {
        let mut grew = false;
        for &class in &order {
            if assigned == target {
                break;
            }
            if quotas[class] < by_class[class].len() - 1 {
                quotas[class] += 1;
                assigned += 1;
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
    quotas
}

/// A fitted classifier ready for inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub tag: SchemaTag,
    /// Letter for each class index.
    pub labels: [char; CLASS_COUNT],
    pub forest: RandomForest,
    /// Held-out accuracy in percent.
    pub accuracy: f64,
}

impl TrainedModel {
    /// Predicts the letter for a feature vector.
    pub fn predict(&self, features: &[f32]) -> Result<char> {
        let class = self.forest.predict(features)?;
        self.labels
            .get(class)
            .copied()
            .ok_or_else(|| Error::MalformedArtifact {
                artifact: "model",
                reason: format!("class {} has no label", class),
            })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        artifact::write_atomic(path, |w| Ok(bincode::serialize_into(w, self)?))?;
        log::info!("Saved model to {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ModelNotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let model: TrainedModel = bincode::deserialize_from(reader)?;
        model.tag.check("model", SchemaTag::current(FEATURE_LEN))?;
        if model.forest.n_features() != FEATURE_LEN {
            return Err(Error::MalformedArtifact {
                artifact: "model",
                reason: format!("forest expects {} features", model.forest.n_features()),
            });
        }
        if model.forest.n_classes() != CLASS_COUNT {
            return Err(Error::MalformedArtifact {
                artifact: "model",
                reason: format!("forest predicts {} classes", model.forest.n_classes()),
            });
        }
        Ok(model)
    }
}

/// Fits a model on `corpus` and measures it on the held-out partition.
///
/// Returns the model together with the split it was trained and measured on.
pub fn fit(corpus: &Corpus, training: &TrainingConfig) -> Result<(TrainedModel, Split)> {
    if corpus.is_empty() {
        return Err(Error::MalformedArtifact {
            artifact: "corpus",
            reason: "no samples".to_string(),
        });
    }

    let labels = corpus.class_indices();
    let split = stratified_split(&labels, training.test_fraction, training.seed);
    log::info!(
        "Split {} samples into {} train / {} test",
        labels.len(),
        split.train.len(),
        split.test.len()
    );

    let train_x: Vec<Vec<f32>> = split.train.iter().map(|&i| corpus.data[i].clone()).collect();
    let train_y: Vec<usize> = split.train.iter().map(|&i| labels[i]).collect();
    let params = ForestParams {
        tree_count: training.tree_count,
        seed: training.seed,
        ..Default::default()
    };
    let forest = RandomForest::fit(&train_x, &train_y, CLASS_COUNT, &params)?;

    let eval = if split.test.is_empty() {
        log::warn!("No held-out samples, reporting training accuracy");
        &split.train
    } else {
        &split.test
    };
    let mut correct = 0;
    for &i in eval {
        if forest.predict(&corpus.data[i])? == labels[i] {
            correct += 1;
        }
    }
    let accuracy = correct as f64 / eval.len() as f64 * 100.0;
    log::debug!("Held-out accuracy {:.2}% on {} samples", accuracy, eval.len());

    let model = TrainedModel {
        tag: SchemaTag::current(FEATURE_LEN),
        labels: ALPHABET,
        forest,
        accuracy,
    };
    Ok((model, split))
}

/// Loads the corpus, trains and saves the model.
///
/// The last event sent on success is [`StatusEvent::Trained`] with the held-out accuracy.
pub fn train(config: &AppConfig, status: &StatusSender) -> Result<TrainedModel> {
    status.info("Training classifier...");
    let corpus = Corpus::load(&config.corpus_path)?;

    let (model, split) = fit(&corpus, &config.training)?;
    model.save(&config.model_path)?;

    let name = config
        .model_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| config.model_path.display().to_string());
    status.info(format!("Model saved as '{}'.", name));
    status.send(StatusEvent::Trained {
        accuracy: model.accuracy,
        train_samples: split.train.len(),
        test_samples: split.test.len(),
    });
    Ok(model)
}

/// Runs [`train`], turning failures into status text.
pub fn run_training(config: &AppConfig, status: &StatusSender) {
    match train(config, status) {
        Ok(_) => {}
        Err(Error::CorpusNotFound(_)) => {
            status.error("Dataset not found. Please create the dataset first.")
        }
        Err(e) => status.error(format!("Training failed: {}", e)),
    }
}

/// Runs [`run_training`] on a background thread.
pub fn spawn_training(config: AppConfig, status: StatusSender) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("trainer".into())
        .spawn(move || run_training(&config, &status))?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features;
    use crate::ml::test_support::synthetic_hand;
    use crate::status;

    /// `per_class` copies of one distinct feature vector per class.
    fn corpus(per_class: usize, classes: usize) -> Corpus {
        let mut corpus = Corpus::new();
        for class in 0..classes {
            let mut values = features::encode(&synthetic_hand(class, 0.0, 0.0))
                .unwrap()
                .into_inner();
            // Only three synthetic poses exist; offset one coordinate to keep classes apart.
            values[0] += class as f32;
            for _ in 0..per_class {
                corpus.push(features::FeatureVector::from_values(values.clone()).unwrap(), class);
            }
        }
        corpus
    }

    fn quick_training() -> TrainingConfig {
        TrainingConfig {
            tree_count: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_stratified_split_260() {
        let labels: Vec<usize> = (0..CLASS_COUNT)
            .flat_map(|c| std::iter::repeat(c).take(10))
            .collect();
        let split = stratified_split(&labels, 0.2, 42);

        assert_eq!(split.train.len(), 208);
        assert_eq!(split.test.len(), 52);
        for class in 0..CLASS_COUNT {
            assert!(split.train.iter().any(|&i| labels[i] == class));
            assert!(split.test.iter().any(|&i| labels[i] == class));
        }

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort();
        assert_eq!(all, (0..260).collect::<Vec<_>>());
    }

    fn test_counts(labels: &[usize], split: &Split) -> Vec<usize> {
        let n_classes = labels.iter().max().map_or(0, |&m| m + 1);
        let mut counts = vec![0; n_classes];
        for &i in &split.test {
            counts[labels[i]] += 1;
        }
        counts
    }

    #[test]
    fn test_split_total_follows_fraction() {
        for (per_class, expected) in [(7, 37), (12, 63), (10, 52)] {
            let labels: Vec<usize> = (0..CLASS_COUNT)
                .flat_map(|c| std::iter::repeat(c).take(per_class))
                .collect();
            let split = stratified_split(&labels, 0.2, 42);
            assert_eq!(split.test.len(), expected, "{} per class", per_class);
            assert_eq!(split.train.len() + split.test.len(), labels.len());
        }

        // 26 * 7 samples: 36.4 -> 37 test slots, one each plus 11 leftovers by class order.
        let labels: Vec<usize> = (0..CLASS_COUNT)
            .flat_map(|c| std::iter::repeat(c).take(7))
            .collect();
        let counts = test_counts(&labels, &stratified_split(&labels, 0.2, 42));
        assert!(counts[..11].iter().all(|&c| c == 2));
        assert!(counts[11..].iter().all(|&c| c == 1));
    }

    #[test]
    fn test_split_uneven_classes() {
        let sizes = [3, 7, 12, 1, 2];
        let labels: Vec<usize> = sizes
            .iter()
            .enumerate()
            .flat_map(|(c, &n)| std::iter::repeat(c).take(n))
            .collect();
        let split = stratified_split(&labels, 0.2, 3);

        assert_eq!(split.test.len(), 5);
        assert_eq!(test_counts(&labels, &split), vec![1, 1, 2, 0, 1]);
    }

    #[test]
    fn test_split_keeps_one_test_sample_per_class() {
        // Target is 16 of 78, but every class still needs a held-out sample.
        let labels: Vec<usize> = (0..CLASS_COUNT)
            .flat_map(|c| std::iter::repeat(c).take(3))
            .collect();
        let split = stratified_split(&labels, 0.2, 42);
        assert_eq!(test_counts(&labels, &split), vec![1; CLASS_COUNT]);
    }

    #[test]
    fn test_split_is_reproducible() {
        let labels: Vec<usize> = (0..50).map(|i| i % 5).collect();
        assert_eq!(stratified_split(&labels, 0.2, 7), stratified_split(&labels, 0.2, 7));
    }

    #[test]
    fn test_singleton_class_stays_in_training() {
        let split = stratified_split(&[0, 1, 1, 1, 1], 0.2, 1);
        assert!(split.train.contains(&0));
        assert_eq!(split.test.len(), 1);
    }

    #[test]
    fn test_train_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            corpus_path: dir.path().join("data.json"),
            model_path: dir.path().join("model.bin"),
            training: quick_training(),
            ..Default::default()
        };
        corpus(10, 4).save(&config.corpus_path).unwrap();

        let (tx, rx) = status::channel();
        let model = train(&config, &tx).unwrap();
        assert!(model.accuracy > 99.0);

        let events: Vec<StatusEvent> = rx.try_iter().collect();
        assert_eq!(events.first(), Some(&StatusEvent::Info("Training classifier...".into())));
        assert!(events.contains(&StatusEvent::Info("Model saved as 'model.bin'.".into())));
        let last = events.last().unwrap();
        assert!(last.is_terminal());
        match last {
            StatusEvent::Trained {
                accuracy,
                train_samples: 32,
                test_samples: 8,
            } => assert_eq!(*accuracy, model.accuracy),
            other => panic!("unexpected last event {:?}", other),
        }

        let loaded = TrainedModel::load(&config.model_path).unwrap();
        let sample = corpus(1, 4).data[3].clone();
        assert_eq!(loaded.predict(&sample).unwrap(), 'D');
        assert!(matches!(
            loaded.predict(&sample[..40]),
            Err(Error::InvalidFeatureLength { .. })
        ));
    }

    #[test]
    fn test_missing_corpus_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            corpus_path: dir.path().join("data.json"),
            ..Default::default()
        };
        let (tx, rx) = status::channel();
        run_training(&config, &tx);

        let events: Vec<StatusEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                StatusEvent::Info("Training classifier...".into()),
                StatusEvent::Error("Dataset not found. Please create the dataset first.".into()),
            ]
        );
    }

    #[test]
    fn test_model_load_checks_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        assert!(matches!(TrainedModel::load(&path), Err(Error::ModelNotFound(_))));

        let (mut model, _) = fit(&corpus(3, 2), &quick_training()).unwrap();
        model.tag.feature_len = 63;
        model.save(&path).unwrap();
        assert!(matches!(TrainedModel::load(&path), Err(Error::SchemaMismatch { .. })));

        let (mut model, _) = fit(&corpus(3, 2), &quick_training()).unwrap();
        let samples = vec![vec![0.0; FEATURE_LEN], vec![1.0; FEATURE_LEN]];
        model.forest = RandomForest::fit(&samples, &[0, 1], 2, &ForestParams::default()).unwrap();
        model.save(&path).unwrap();
        assert!(matches!(
            TrainedModel::load(&path),
            Err(Error::MalformedArtifact { artifact: "model", .. })
        ));
    }
}
