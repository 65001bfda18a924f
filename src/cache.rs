//! Lazily constructed, shared model handles.

use std::{sync::Arc, time::Instant};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;

use crate::{
    classifier::{OrtScoreModel, ScoreModel, SignClassifier},
    config::PipelineConfig,
    detector::{LandmarkDetector, OrtHandposeEngine},
    vocabulary::LabelVocabulary,
};

type Factory<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// A value built on first use and shared afterwards.
///
/// Concurrent first callers block until a single construction finishes and
/// all observe the same `Arc`. A failed construction is not remembered, so
/// the next call tries again.
pub struct CachedResource<T> {
    name: &'static str,
    cell: OnceCell<Arc<T>>,
}

impl<T> CachedResource<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cell: OnceCell::new(),
        }
    }

    pub fn get_or_try_init(&self, init: impl FnOnce() -> Result<T>) -> Result<Arc<T>> {
        let value = self.cell.get_or_try_init(|| {
            let started = Instant::now();
            let value = init().with_context(|| format!("failed to construct {}", self.name))?;
            log::info!("{} ready in {:?}", self.name, started.elapsed());
            Ok::<_, anyhow::Error>(Arc::new(value))
        })?;
        Ok(Arc::clone(value))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// Owns the detector, the classifier and the label vocabulary.
pub struct ResourceCache {
    detector: CachedResource<LandmarkDetector>,
    classifier: CachedResource<SignClassifier>,
    vocabulary: CachedResource<LabelVocabulary>,
    build_detector: Factory<LandmarkDetector>,
    build_model: Factory<Box<dyn ScoreModel>>,
    build_vocabulary: Factory<LabelVocabulary>,
}

impl ResourceCache {
    /// Builds the vocabulary and classifier right away so a label file that
    /// disagrees with the model fails here. The detector stays lazy.
    pub fn new<D, M, V>(build_detector: D, build_model: M, build_vocabulary: V) -> Result<Self>
    where
        D: Fn() -> Result<LandmarkDetector> + Send + Sync + 'static,
        M: Fn() -> Result<Box<dyn ScoreModel>> + Send + Sync + 'static,
        V: Fn() -> Result<LabelVocabulary> + Send + Sync + 'static,
    {
        let cache = Self {
            detector: CachedResource::new("hand landmark detector"),
            classifier: CachedResource::new("sign classifier"),
            vocabulary: CachedResource::new("label vocabulary"),
            build_detector: Box::new(build_detector),
            build_model: Box::new(build_model),
            build_vocabulary: Box::new(build_vocabulary),
        };
        cache.classifier()?;
        Ok(cache)
    }

    /// ORT-backed resources loaded from the paths in `config`.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let config = Arc::new(config);
        let detector_config = Arc::clone(&config);
        let model_config = Arc::clone(&config);

        Self::new(
            move || OrtHandposeEngine::from_config(&detector_config).map(LandmarkDetector::new),
            move || {
                OrtScoreModel::load(&model_config.classifier_model)
                    .map(|model| Box::new(model) as Box<dyn ScoreModel>)
            },
            move || LabelVocabulary::load(&config.labels),
        )
    }

    pub fn detector(&self) -> Result<Arc<LandmarkDetector>> {
        self.detector.get_or_try_init(|| (self.build_detector)())
    }

    pub fn vocabulary(&self) -> Result<Arc<LabelVocabulary>> {
        self.vocabulary.get_or_try_init(|| (self.build_vocabulary)())
    }

    /// The classifier, checked against the vocabulary when first built.
    pub fn classifier(&self) -> Result<Arc<SignClassifier>> {
        self.classifier.get_or_try_init(|| {
            let vocabulary = self.vocabulary()?;
            let model = (self.build_model)()?;
            SignClassifier::new(model, vocabulary)
        })
    }

    /// Also builds the detector so its asset problems surface before the
    /// first prediction.
    pub fn preload(&self) -> Result<()> {
        self.classifier()?;
        self.detector()?;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.detector.is_initialized()
            && self.classifier.is_initialized()
            && self.vocabulary.is_initialized()
    }
}
