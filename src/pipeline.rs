use std::sync::Arc;

use anyhow::Result;

use crate::{
    cache::ResourceCache,
    classifier::Classification,
    error::PredictError,
    features, image_source,
    types::{PixelBuffer, Prediction},
};

pub type PredictionResult = Result<Prediction, PredictError>;

/// Image in, sign label out.
#[derive(Clone)]
pub struct SignPredictor {
    cache: Arc<ResourceCache>,
}

impl SignPredictor {
    pub fn new(cache: Arc<ResourceCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn predict(&self, locator: &str) -> PredictionResult {
        Ok(match self.classify_locator(locator)? {
            Some(classification) => Prediction::Sign(classification.label),
            None => Prediction::NoHand,
        })
    }

    /// Like [`Self::predict`] but keeps the scores of the winning pass.
    pub fn classify_locator(&self, locator: &str) -> Result<Option<Classification>, PredictError> {
        let image =
            image_source::load(locator).map_err(|err| PredictError::image(locator, err))?;
        self.classify_image(&image).map_err(PredictError::predict)
    }

    pub fn classify_image(&self, image: &PixelBuffer) -> Result<Option<Classification>> {
        let detector = self.cache.detector()?;
        let Some(hand) = detector.detect(image)? else {
            return Ok(None);
        };

        let features = features::normalize(&hand);
        let classifier = self.cache.classifier()?;
        let classification = classifier.classify(&features)?;
        log::debug!(
            "classified as {} ({:.3})",
            classification.label,
            classification.confidence()
        );
        Ok(Some(classification))
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use anyhow::anyhow;
    use image::RgbaImage;

    use super::*;
    use crate::{
        classifier::{ScoreModel, tests::FixedScores},
        detector::{
            LandmarkDetector,
            tests::{FixedEngine, open_hand},
        },
        types::Landmark,
        vocabulary::LabelVocabulary,
    };

    fn predictor_with(hands: Vec<Vec<Landmark>>, scores: Vec<f32>) -> SignPredictor {
        let cache = ResourceCache::new(
            move || Ok(LandmarkDetector::new(FixedEngine(hands.clone()))),
            move || Ok(Box::new(FixedScores(scores.clone())) as Box<dyn ScoreModel>),
            || LabelVocabulary::parse("hello\nthanks\nyes"),
        )
        .unwrap();
        SignPredictor::new(Arc::new(cache))
    }

    fn write_photo(dir: &Path) -> PathBuf {
        let path = dir.join("photo.png");
        RgbaImage::new(16, 12).save(&path).unwrap();
        path
    }

    #[test]
    fn detected_hand_yields_label() {
        let dir = tempfile::tempdir().unwrap();
        let photo = write_photo(dir.path());
        let predictor = predictor_with(vec![open_hand()], vec![0.1, 0.8, 0.1]);

        let prediction = predictor.predict(photo.to_str().unwrap()).unwrap();
        assert_eq!(prediction, Prediction::Sign("thanks".into()));
    }

    #[test]
    fn no_hand_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let photo = write_photo(dir.path());
        let predictor = predictor_with(Vec::new(), vec![0.1, 0.8, 0.1]);

        let prediction = predictor.predict(photo.to_str().unwrap()).unwrap();
        assert!(prediction.is_no_hand());
        assert_eq!(prediction.label(), "");
    }

    #[test]
    fn incomplete_hand_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let photo = write_photo(dir.path());
        let predictor = predictor_with(vec![open_hand()[..20].to_vec()], vec![0.1, 0.8, 0.1]);

        let prediction = predictor.predict(photo.to_str().unwrap()).unwrap();
        assert_eq!(prediction, Prediction::NoHand);
    }

    #[test]
    fn unreadable_image_is_image_error() {
        let predictor = predictor_with(vec![open_hand()], vec![0.1, 0.8, 0.1]);
        let err = predictor.predict("/no/such/photo.jpg").unwrap_err();
        assert_eq!(err.code(), "E_IMAGE");
    }

    #[test]
    fn broken_assets_are_predict_errors() {
        let dir = tempfile::tempdir().unwrap();
        let photo = write_photo(dir.path());
        let cache = ResourceCache::new(
            || Err(anyhow!("hand_landmarker asset missing")),
            || Ok(Box::new(FixedScores(vec![1.0])) as Box<dyn ScoreModel>),
            || LabelVocabulary::parse("A"),
        )
        .unwrap();
        let predictor = SignPredictor::new(Arc::new(cache));

        let err = predictor.predict(photo.to_str().unwrap()).unwrap_err();
        assert_eq!(err.code(), "E_PREDICT");
        let chain = format!("{:?}", anyhow::Error::from(err));
        assert!(chain.contains("hand_landmarker asset missing"));
    }

    #[test]
    fn label_mismatch_fails_before_any_prediction() {
        let built = ResourceCache::new(
            || Ok(LandmarkDetector::new(FixedEngine(vec![open_hand()]))),
            || Ok(Box::new(FixedScores(vec![0.5, 0.5])) as Box<dyn ScoreModel>),
            || LabelVocabulary::parse("hello\nthanks\nyes"),
        );
        let err = built.err().unwrap();
        assert!(format!("{err:#}").contains("label vocabulary has 3 entries"));
    }

    #[test]
    fn concurrent_predictions_share_resources() {
        let dir = tempfile::tempdir().unwrap();
        let photo = write_photo(dir.path());
        let locator = photo.to_str().unwrap();
        let predictor = predictor_with(vec![open_hand()], vec![0.9, 0.05, 0.05]);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let predictor = predictor.clone();
                scope.spawn(move || {
                    assert_eq!(predictor.predict(locator).unwrap().label(), "hello");
                });
            }
        });
        assert!(predictor.cache().is_loaded());
    }
}
