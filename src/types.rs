use std::ops::Index;

use image::RgbaImage;
use ndarray::Array2;

pub const NUM_LANDMARKS: usize = 21;
pub const FEATURE_LEN: usize = NUM_LANDMARKS * 3;

/// Decoded RGBA8 image, orientation already applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Row-major RGBA bytes.
    pub fn rgba(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

/// A single hand keypoint. `x`/`y` are relative to the image extent, `z` is a
/// relative depth expressed in the same unit as `x`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Exactly 21 landmarks of one hand, wrist first.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkSet([Landmark; NUM_LANDMARKS]);

impl LandmarkSet {
    pub fn new(points: [Landmark; NUM_LANDMARKS]) -> Self {
        Self(points)
    }

    pub fn wrist(&self) -> Landmark {
        self.0[0]
    }

    pub fn points(&self) -> &[Landmark; NUM_LANDMARKS] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.0.iter()
    }
}

impl Index<usize> for LandmarkSet {
    type Output = Landmark;

    fn index(&self, index: usize) -> &Landmark {
        &self.0[index]
    }
}

/// Returned when a detection carries fewer than [`NUM_LANDMARKS`] points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IncompleteHand {
    pub found: usize,
}

impl TryFrom<&[Landmark]> for LandmarkSet {
    type Error = IncompleteHand;

    /// Keeps the first 21 points; anything shorter is rejected.
    fn try_from(points: &[Landmark]) -> Result<Self, Self::Error> {
        let Some(head) = points.get(..NUM_LANDMARKS) else {
            return Err(IncompleteHand {
                found: points.len(),
            });
        };
        let mut out = [Landmark::default(); NUM_LANDMARKS];
        out.copy_from_slice(head);
        Ok(Self(out))
    }
}

/// 21 consecutive `(x, y, z)` triples, wrist-relative and unit-scaled.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector([f32; FEATURE_LEN]);

impl FeatureVector {
    pub fn from_raw(values: [f32; FEATURE_LEN]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn point(&self, index: usize) -> [f32; 3] {
        let base = index * 3;
        [self.0[base], self.0[base + 1], self.0[base + 2]]
    }

    /// Shape `(1, 63)`, the classifier's input layout.
    pub fn to_batch(&self) -> Array2<f32> {
        Array2::from_shape_fn((1, FEATURE_LEN), |(_, i)| self.0[i])
    }
}

/// Outcome of a successful pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prediction {
    Sign(String),
    NoHand,
}

impl Prediction {
    /// The label, or the empty string when no hand was found.
    pub fn label(&self) -> &str {
        match self {
            Prediction::Sign(label) => label,
            Prediction::NoHand => "",
        }
    }

    pub fn is_no_hand(&self) -> bool {
        matches!(self, Prediction::NoHand)
    }
}
