mod ort;

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};

pub use self::ort::OrtScoreModel;
use crate::{types::FeatureVector, vocabulary::LabelVocabulary};

/// A `(1, 63) -> (1, N)` scoring model.
pub trait ScoreModel: Send + Sync {
    /// `N`, the number of classes the model scores.
    fn output_len(&self) -> usize;

    fn scores(&self, features: &FeatureVector) -> Result<Vec<f32>>;
}

/// Index of the strictly greatest score; the lowest index wins ties and NaN
/// never wins.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// The winning label of one forward pass, with the raw scores kept around.
#[derive(Clone, Debug)]
pub struct Classification {
    pub index: usize,
    pub label: String,
    scores: Vec<f32>,
    vocabulary: Arc<LabelVocabulary>,
}

impl Classification {
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn confidence(&self) -> f32 {
        self.scores[self.index]
    }

    /// The `k` best labels, highest score first, ties in vocabulary order.
    pub fn top_k(&self, k: usize) -> Vec<(&str, f32)> {
        let mut ranked: Vec<usize> = (0..self.scores.len())
            .filter(|&i| !self.scores[i].is_nan())
            .collect();
        ranked.sort_by(|&a, &b| self.scores[b].total_cmp(&self.scores[a]));
        ranked
            .into_iter()
            .take(k)
            .filter_map(|i| Some((self.vocabulary.get(i)?, self.scores[i])))
            .collect()
    }
}

/// A score model paired with the vocabulary it was trained against.
pub struct SignClassifier {
    model: Box<dyn ScoreModel>,
    vocabulary: Arc<LabelVocabulary>,
}

impl SignClassifier {
    /// Fails when the model's output width and the vocabulary disagree.
    pub fn new(model: Box<dyn ScoreModel>, vocabulary: Arc<LabelVocabulary>) -> Result<Self> {
        if model.output_len() != vocabulary.len() {
            bail!(
                "label vocabulary has {} entries but the classifier scores {} classes",
                vocabulary.len(),
                model.output_len()
            );
        }
        Ok(Self { model, vocabulary })
    }

    pub fn classify(&self, features: &FeatureVector) -> Result<Classification> {
        let scores = self.model.scores(features)?;
        if scores.len() != self.vocabulary.len() {
            bail!(
                "classifier returned {} scores for {} labels",
                scores.len(),
                self.vocabulary.len()
            );
        }

        let index = argmax(&scores).ok_or_else(|| anyhow!("classifier returned no usable scores"))?;
        let label = self
            .vocabulary
            .get(index)
            .ok_or_else(|| anyhow!("no label for class {index}"))?
            .to_string();

        Ok(Classification {
            index,
            label,
            scores,
            vocabulary: Arc::clone(&self.vocabulary),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::FEATURE_LEN;

    /// Ignores its input and replays fixed scores.
    pub(crate) struct FixedScores(pub Vec<f32>);

    impl ScoreModel for FixedScores {
        fn output_len(&self) -> usize {
            self.0.len()
        }

        fn scores(&self, _features: &FeatureVector) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    fn vocab(labels: &str) -> Arc<LabelVocabulary> {
        Arc::new(LabelVocabulary::parse(labels).unwrap())
    }

    fn zeros() -> FeatureVector {
        FeatureVector::from_raw([0.0; FEATURE_LEN])
    }

    #[test]
    fn argmax_prefers_first_of_equal_scores() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2, 0.7]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[f32::NAN, 0.2, f32::NAN]), Some(1));
        assert_eq!(argmax(&[f32::NAN]), None);
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn tie_returns_lower_label() {
        let classifier = SignClassifier::new(
            Box::new(FixedScores(vec![0.1, 0.4, 0.1, 0.4])),
            vocab("A\nB\nC\nD"),
        )
        .unwrap();

        let result = classifier.classify(&zeros()).unwrap();
        assert_eq!(result.label, "B");
        assert_eq!(result.index, 1);
        assert_eq!(result.confidence(), 0.4);
        assert_eq!(result.scores(), [0.1, 0.4, 0.1, 0.4]);
    }

    #[test]
    fn top_k_ranks_by_score() {
        let classifier = SignClassifier::new(
            Box::new(FixedScores(vec![0.2, 0.5, 0.05, 0.25])),
            vocab("A\nB\nC\nD"),
        )
        .unwrap();

        let result = classifier.classify(&zeros()).unwrap();
        assert_eq!(result.top_k(3), vec![("B", 0.5), ("D", 0.25), ("A", 0.2)]);
        assert_eq!(result.top_k(10).len(), 4);
    }

    #[test]
    fn vocabulary_size_must_match_model() {
        let err = SignClassifier::new(Box::new(FixedScores(vec![0.0; 3])), vocab("A\nB"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("2 entries"));
    }

    #[test]
    fn all_nan_scores_are_an_error() {
        let classifier =
            SignClassifier::new(Box::new(FixedScores(vec![f32::NAN; 2])), vocab("A\nB")).unwrap();
        assert!(classifier.classify(&zeros()).is_err());
    }
}
