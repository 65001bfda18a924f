use std::{path::Path, sync::Mutex};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::ScoreModel;
use crate::types::{FEATURE_LEN, FeatureVector};

/// ONNX landmark classifier on ORT.
pub struct OrtScoreModel {
    session: Mutex<Session>,
    output_len: usize,
}

impl OrtScoreModel {
    /// Loads the model and measures its output width with a probe pass.
    pub fn load(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load sign classifier from {}", model_path.display())
            })?;

        let mut model = Self {
            session: Mutex::new(session),
            output_len: 0,
        };
        let probe = model
            .run(&FeatureVector::from_raw([0.0; FEATURE_LEN]))
            .context("sign classifier rejected a (1, 63) input")?;
        model.output_len = probe.len();

        log::info!(
            "loaded sign classifier from {} ({} classes)",
            model_path.display(),
            model.output_len
        );
        Ok(model)
    }

    fn run(&self, features: &FeatureVector) -> Result<Vec<f32>> {
        let tensor = Tensor::from_array(features.to_batch())?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("sign classifier session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .context("failed to run sign classifier")?;

        if outputs.len() < 1 {
            return Err(anyhow!("sign classifier returned no outputs"));
        }

        let scores = outputs[0].try_extract_array::<f32>()?;
        Ok(scores.iter().copied().collect())
    }
}

impl ScoreModel for OrtScoreModel {
    fn output_len(&self) -> usize {
        self.output_len
    }

    fn scores(&self, features: &FeatureVector) -> Result<Vec<f32>> {
        self.run(features)
    }
}
