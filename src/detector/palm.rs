//! Palm detection, the first stage of the landmark detector.
//!
//! The palm model is an SSD with fixed-size anchors; each detection carries a
//! box and 7 palm keypoints (0 is the wrist, 2 the middle finger base).

use std::{cmp::Ordering, path::Path, sync::Mutex};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::common::{LetterboxInfo, PALM_INPUT_SIZE, prepare_frame_with_size};
use crate::types::PixelBuffer;

const PALM_LANDMARKS: usize = 7;
/// `(feature map size, anchors per cell)` of the 192x192 palm model.
const ANCHOR_LAYERS: [(u32, u32); 2] = [(24, 2), (12, 6)];
/// How much larger than the palm box the handpose crop is.
const CROP_SCALE: f32 = 2.6;
/// Crop centre shift toward the fingers, in palm box sizes.
const CROP_SHIFT: f32 = 0.5;

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 1,
        }
    }
}

/// A detected palm in source pixel coordinates.
#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub landmarks: Vec<(f32, f32)>,
    pub score: f32,
}

/// Anchor centres in `[0, 1]`, row-major per layer.
pub fn generate_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::new();
    for (size, per_cell) in ANCHOR_LAYERS {
        for y in 0..size {
            for x in 0..size {
                let center = [
                    (x as f32 + 0.5) / size as f32,
                    (y as f32 + 0.5) / size as f32,
                ];
                for _ in 0..per_cell {
                    anchors.push(center);
                }
            }
        }
    }
    anchors
}

pub struct PalmDetector {
    session: Mutex<Session>,
    anchors: Vec<[f32; 2]>,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig, intra_threads: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session: Mutex::new(session),
            anchors: generate_anchors(),
            cfg,
        })
    }

    pub fn detect(&self, buffer: &PixelBuffer) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = prepare_frame_with_size(buffer, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("palm detector session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let box_data: Vec<f32> = boxes.iter().copied().collect();
        let score_data: Vec<f32> = scores.iter().copied().collect();

        decode_palm_outputs(
            &box_data,
            boxes.shape(),
            &score_data,
            scores.shape(),
            &letterbox,
            &self.anchors,
            &self.cfg,
        )
    }
}

fn decode_palm_outputs(
    box_landmark: &[f32],
    box_shape: &[usize],
    scores: &[f32],
    score_shape: &[usize],
    letterbox: &LetterboxInfo,
    anchors: &[[f32; 2]],
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    let [.., anchor_dim, feature_dim] = *box_shape else {
        return Err(anyhow!(
            "unexpected palm box shape {box_shape:?}, need [batch, anchors, features]"
        ));
    };
    let [.., score_anchor_dim, score_feature_dim] = *score_shape else {
        return Err(anyhow!(
            "unexpected palm score shape {score_shape:?}, need [batch, anchors, 1]"
        ));
    };

    if feature_dim < 4 + PALM_LANDMARKS * 2 {
        return Err(anyhow!(
            "palm box feature dimension too small: {feature_dim}"
        ));
    }
    if anchor_dim != score_anchor_dim {
        return Err(anyhow!(
            "anchor dimension mismatch between boxes ({anchor_dim}) and scores ({score_anchor_dim})"
        ));
    }
    if anchor_dim != anchors.len() {
        log::warn!(
            "palm model has {anchor_dim} anchors, expected {}; decoding the overlap",
            anchors.len()
        );
    }

    let count = anchors.len().min(anchor_dim);
    let pad_bias_x = letterbox.pad_x / letterbox.scale;
    let pad_bias_y = letterbox.pad_y / letterbox.scale;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let target_input = PALM_INPUT_SIZE as f32;

    let mut candidates = Vec::new();
    for (anchor_idx, anchor) in anchors.iter().enumerate().take(count) {
        let raw_score = *scores
            .get(anchor_idx * score_feature_dim)
            .ok_or_else(|| anyhow!("missing score for palm anchor {anchor_idx}"))?;
        let score = sigmoid(raw_score);
        if score < cfg.score_threshold {
            continue;
        }

        let offset = anchor_idx * feature_dim;
        let features = box_landmark
            .get(offset..offset + 4 + PALM_LANDMARKS * 2)
            .ok_or_else(|| anyhow!("missing box data for palm anchor {anchor_idx}"))?;

        let cx = features[0] / target_input + anchor[0];
        let cy = features[1] / target_input + anchor[1];
        let hw = features[2] / target_input / 2.0;
        let hh = features[3] / target_input / 2.0;

        let mut bbox = [
            (cx - hw) * scale - pad_bias_x,
            (cy - hh) * scale - pad_bias_y,
            (cx + hw) * scale - pad_bias_x,
            (cy + hh) * scale - pad_bias_y,
        ];
        if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
            continue;
        }
        clamp_box(&mut bbox, letterbox.orig_w, letterbox.orig_h);

        let landmarks = features[4..]
            .chunks_exact(2)
            .map(|p| {
                (
                    (p[0] / target_input + anchor[0]) * scale - pad_bias_x,
                    (p[1] / target_input + anchor[1]) * scale - pad_bias_y,
                )
            })
            .collect();

        candidates.push(PalmRegion {
            bbox,
            landmarks,
            score,
        });
    }

    let kept = nms(&candidates, cfg.nms_threshold, cfg.top_k);
    Ok(kept.into_iter().map(|idx| candidates[idx].clone()).collect())
}

pub fn pick_primary_region(regions: &[PalmRegion]) -> Option<&PalmRegion> {
    regions
        .iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
}

/// Centre, side and rotation of the square handpose crop for `region`.
///
/// The crop is rotated so the wrist to middle-finger-base direction points up.
pub fn crop_from_palm(region: &PalmRegion) -> ((f32, f32), f32, f32) {
    let base = (region.bbox[2] - region.bbox[0])
        .abs()
        .max((region.bbox[3] - region.bbox[1]).abs());
    let box_center = (
        (region.bbox[0] + region.bbox[2]) * 0.5,
        (region.bbox[1] + region.bbox[3]) * 0.5,
    );

    let up = palm_direction(region).unwrap_or((0.0, -1.0));
    let angle = up.0.atan2(-up.1);
    let center = (
        box_center.0 + up.0 * base * CROP_SHIFT,
        box_center.1 + up.1 * base * CROP_SHIFT,
    );

    (center, base * CROP_SCALE, angle)
}

fn palm_direction(region: &PalmRegion) -> Option<(f32, f32)> {
    let wrist = region.landmarks.first()?;
    let middle = region.landmarks.get(2)?;
    let (dx, dy) = (middle.0 - wrist.0, middle.1 - wrist.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-3 {
        return None;
    }
    Some((dx / len, dy / len))
}

fn nms(candidates: &[PalmRegion], threshold: f32, top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        candidates[*b]
            .score
            .partial_cmp(&candidates[*a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    'outer: for &idx in &order {
        if keep.len() >= top_k {
            break;
        }
        for &k in &keep {
            if iou(&candidates[idx].bbox, &candidates[k].bbox) >= threshold {
                continue 'outer;
            }
        }
        keep.push(idx);
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn clamp_box(bbox: &mut [f32; 4], w: u32, h: u32) {
    let max_w = (w.saturating_sub(1)) as f32;
    let max_h = (h.saturating_sub(1)) as f32;
    bbox[0] = bbox[0].clamp(0.0, max_w);
    bbox[1] = bbox[1].clamp(0.0, max_h);
    bbox[2] = bbox[2].clamp(0.0, max_w);
    bbox[3] = bbox[3].clamp(0.0, max_h);
}
