use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by [`crate::SignPredictor::predict`].
///
/// Finding no hand is not an error; see [`crate::Prediction::NoHand`].
#[derive(Debug, Error)]
pub enum PredictError {
    /// The locator did not resolve to a decodable image.
    #[error("could not load image {locator}")]
    Image {
        locator: String,
        #[source]
        source: BoxError,
    },
    /// Anything that went wrong after the image was decoded: missing or corrupt
    /// assets, or a runtime failure inside detection or classification.
    #[error("sign prediction failed")]
    Predict {
        #[source]
        source: BoxError,
    },
}

impl PredictError {
    pub fn image(locator: impl Into<String>, source: anyhow::Error) -> Self {
        PredictError::Image {
            locator: locator.into(),
            source: source.into(),
        }
    }

    pub fn predict(source: anyhow::Error) -> Self {
        PredictError::Predict {
            source: source.into(),
        }
    }

    /// Stable code for callers that branch on the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            PredictError::Image { .. } => "E_IMAGE",
            PredictError::Predict { .. } => "E_PREDICT",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn codes_and_sources() {
        let err = PredictError::image("missing.jpg", anyhow::anyhow!("no such file"));
        assert_eq!(err.code(), "E_IMAGE");
        assert_eq!(err.to_string(), "could not load image missing.jpg");
        assert_eq!(err.source().unwrap().to_string(), "no such file");

        let err = PredictError::predict(anyhow::anyhow!("model missing"));
        assert_eq!(err.code(), "E_PREDICT");
        assert_eq!(err.source().unwrap().to_string(), "model missing");
    }
}
