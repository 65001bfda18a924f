use std::{path::Path, sync::Mutex};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    HandposeEngine,
    common::{self, HANDPOSE_INPUT_SIZE},
    palm::{PalmDetector, crop_from_palm, pick_primary_region},
};
use crate::{
    config::PipelineConfig,
    model_download::{ModelKind, ensure_model_ready},
    types::{Landmark, PixelBuffer},
};

/// Palm detector followed by the MediaPipe handpose estimator, both on ORT.
pub struct OrtHandposeEngine {
    handpose: Mutex<Session>,
    palm_detector: PalmDetector,
    min_hand_confidence: f32,
}

impl OrtHandposeEngine {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        ensure_model_ready(
            ModelKind::PalmDetector,
            &config.palm_detector_model,
            config.download_missing,
        )?;
        ensure_model_ready(
            ModelKind::HandposeEstimator,
            &config.handpose_estimator_model,
            config.download_missing,
        )?;

        let engine = Self::new(
            &config.handpose_estimator_model,
            &config.palm_detector_model,
            config,
        )?;
        log::info!(
            "handpose ORT backend ready using {} and palm detector {}",
            config.handpose_estimator_model.display(),
            config.palm_detector_model.display()
        );
        Ok(engine)
    }

    fn new(
        model_path: &Path,
        palm_detector_model_path: &Path,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.detector.intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;

        let palm_detector = PalmDetector::new(
            palm_detector_model_path,
            config.detector.palm.clone(),
            config.detector.intra_threads,
        )?;

        Ok(Self {
            handpose: Mutex::new(handpose),
            palm_detector,
            min_hand_confidence: config.detector.min_hand_confidence,
        })
    }
}

impl HandposeEngine for OrtHandposeEngine {
    fn infer(&self, buffer: &PixelBuffer) -> Result<Vec<Vec<Landmark>>> {
        let palm_regions = self.palm_detector.detect(buffer)?;
        let Some(selected) = pick_primary_region(&palm_regions) else {
            return Ok(Vec::new());
        };
        let (center, side, angle) = crop_from_palm(selected);

        let (input, transform) =
            common::prepare_rotated_crop(buffer, center, side, angle, HANDPOSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let mut session = self
            .handpose
            .lock()
            .map_err(|_| anyhow!("handpose session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let points = common::decode_points(&flattened);

        let confidence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };

        log::debug!(
            "palm score {:.3}, hand presence {confidence:.3}",
            selected.score
        );
        if confidence < self.min_hand_confidence {
            return Ok(Vec::new());
        }

        let width = buffer.width() as f32;
        let height = buffer.height() as f32;
        let hand = points
            .into_iter()
            .map(|point| {
                let [x, y, z] = transform.project(point);
                Landmark::new(x / width, y / height, z / width)
            })
            .collect();

        Ok(vec![hand])
    }
}
