//! Single-hand landmark detection over still images.

mod common;
mod ort;
pub mod palm;

use anyhow::Result;

pub use self::ort::OrtHandposeEngine;
use crate::types::{Landmark, LandmarkSet, PixelBuffer};

/// The landmark model behind [`LandmarkDetector`].
///
/// Returns one landmark list per detected hand, in image-normalized
/// coordinates. An empty result means no hand.
pub trait HandposeEngine: Send + Sync {
    fn infer(&self, buffer: &PixelBuffer) -> Result<Vec<Vec<Landmark>>>;
}

pub struct LandmarkDetector {
    engine: Box<dyn HandposeEngine>,
}

impl LandmarkDetector {
    pub fn new(engine: impl HandposeEngine + 'static) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    /// Landmarks of the first detected hand, if any.
    ///
    /// A detection with fewer than 21 points counts as no hand.
    pub fn detect(&self, buffer: &PixelBuffer) -> Result<Option<LandmarkSet>> {
        let hands = self.engine.infer(buffer)?;
        let Some(first) = hands.first() else {
            return Ok(None);
        };

        match LandmarkSet::try_from(first.as_slice()) {
            Ok(hand) => Ok(Some(hand)),
            Err(incomplete) => {
                log::debug!(
                    "discarding hand with {} of 21 landmarks",
                    incomplete.found
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use anyhow::anyhow;
    use image::RgbaImage;

    use super::*;

    /// Returns the same hands for every image.
    pub(crate) struct FixedEngine(pub Vec<Vec<Landmark>>);

    impl HandposeEngine for FixedEngine {
        fn infer(&self, _buffer: &PixelBuffer) -> Result<Vec<Vec<Landmark>>> {
            Ok(self.0.clone())
        }
    }

    pub(crate) fn open_hand() -> Vec<Landmark> {
        (0..21)
            .map(|i| Landmark::new(0.5 + 0.01 * i as f32, 0.8 - 0.02 * i as f32, 0.0))
            .collect()
    }

    fn blank() -> PixelBuffer {
        PixelBuffer::new(RgbaImage::new(4, 4))
    }

    #[test]
    fn no_hand_is_none() {
        let detector = LandmarkDetector::new(FixedEngine(Vec::new()));
        assert_eq!(detector.detect(&blank()).unwrap(), None);
    }

    #[test]
    fn first_hand_wins() {
        let mut other = open_hand();
        other[0] = Landmark::new(0.9, 0.9, 0.9);
        let detector = LandmarkDetector::new(FixedEngine(vec![open_hand(), other]));

        let hand = detector.detect(&blank()).unwrap().unwrap();
        assert_eq!(hand.wrist(), open_hand()[0]);
    }

    #[test]
    fn incomplete_hand_is_treated_as_no_hand() {
        let mut short = open_hand();
        short.truncate(12);
        let detector = LandmarkDetector::new(FixedEngine(vec![short]));
        assert_eq!(detector.detect(&blank()).unwrap(), None);
    }

    #[test]
    fn engine_failures_propagate() {
        struct Broken;
        impl HandposeEngine for Broken {
            fn infer(&self, _buffer: &PixelBuffer) -> Result<Vec<Vec<Landmark>>> {
                Err(anyhow!("session crashed"))
            }
        }

        let detector = LandmarkDetector::new(Broken);
        assert!(detector.detect(&blank()).is_err());
    }
}
