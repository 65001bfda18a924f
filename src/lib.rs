//! Hand sign recognition from still images.
//!
//! An image is decoded and upright-rotated, a single hand is located and its
//! 21 landmarks extracted, the landmarks are normalized into a 63-value
//! feature vector, and a classifier maps that vector onto a label from a
//! fixed vocabulary. [`SignPredictor::predict`] is the entry point.

pub mod cache;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod error;
pub mod features;
pub mod image_source;
pub mod model_download;
pub mod pipeline;
pub mod types;
pub mod vocabulary;

pub use cache::ResourceCache;
pub use config::PipelineConfig;
pub use error::PredictError;
pub use pipeline::{PredictionResult, SignPredictor};
pub use types::{FeatureVector, Landmark, LandmarkSet, PixelBuffer, Prediction};
