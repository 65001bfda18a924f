use std::{env, path::PathBuf};

use crate::detector::palm::PalmDetectorConfig;

pub const PALM_DETECTOR_MODEL_FILENAME: &str = "palm_detection_mediapipe_2023feb.onnx";
pub const HANDPOSE_ESTIMATOR_MODEL_FILENAME: &str = "handpose_estimation_mediapipe_2023feb.onnx";
pub const CLASSIFIER_MODEL_FILENAME: &str = "asl_landmark_model.onnx";

const MODELS_DIR_ENV: &str = "HANDSIGN_MODELS_DIR";
const CLASSIFIER_ENV: &str = "HANDSIGN_CLASSIFIER";
const LABELS_ENV: &str = "HANDSIGN_LABELS";
const OFFLINE_ENV: &str = "HANDSIGN_OFFLINE";

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    pub palm: PalmDetectorConfig,
    /// Handpose presence score below which the crop is treated as empty.
    pub min_hand_confidence: f32,
    pub intra_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            palm: PalmDetectorConfig::default(),
            min_hand_confidence: 0.5,
            intra_threads: 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub palm_detector_model: PathBuf,
    pub handpose_estimator_model: PathBuf,
    pub classifier_model: PathBuf,
    pub labels: PathBuf,
    /// Fetch the public detector models when they are not on disk yet.
    pub download_missing: bool,
    pub detector: DetectorConfig,
}

impl PipelineConfig {
    pub fn with_models_dir(models_dir: impl Into<PathBuf>) -> Self {
        let models_dir = models_dir.into();
        let classifier_model = models_dir.join(CLASSIFIER_MODEL_FILENAME);
        Self {
            palm_detector_model: models_dir.join(PALM_DETECTOR_MODEL_FILENAME),
            handpose_estimator_model: models_dir.join(HANDPOSE_ESTIMATOR_MODEL_FILENAME),
            labels: labels_path_for(&classifier_model),
            classifier_model,
            download_missing: true,
            detector: DetectorConfig::default(),
        }
    }

    /// Defaults overridden by `HANDSIGN_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = match env::var_os(MODELS_DIR_ENV) {
            Some(dir) => Self::with_models_dir(dir),
            None => Self::default(),
        };

        if let Some(classifier) = env::var_os(CLASSIFIER_ENV) {
            config.classifier_model = PathBuf::from(classifier);
            config.labels = labels_path_for(&config.classifier_model);
        }
        if let Some(labels) = env::var_os(LABELS_ENV) {
            config.labels = PathBuf::from(labels);
        }
        if env::var_os(OFFLINE_ENV).is_some() {
            config.download_missing = false;
        }

        config
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_models_dir("models")
    }
}

/// The label file ships next to the classifier with a `.txt` extension.
pub fn labels_path_for(classifier_model: &std::path::Path) -> PathBuf {
    classifier_model.with_extension("txt")
}
