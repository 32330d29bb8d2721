use thiserror::Error;

/// Errors from fetching weights or initializing the pipeline.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load pipeline: {0}")]
    Pipeline(anyhow::Error),
}

/// Errors from a single generation call.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("image dimensions must be nonzero")]
    InvalidDimensions,

    #[error("pipeline returned no image")]
    NoImage,

    #[error("inference failed: {0}")]
    Pipeline(anyhow::Error),

    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            GenerateError::EmptyPrompt.to_string(),
            "prompt must not be empty"
        );
        assert_eq!(
            GenerateError::NoImage.to_string(),
            "pipeline returned no image"
        );
        let err = LoadError::Pipeline(anyhow::anyhow!("weights not found"));
        assert_eq!(err.to_string(), "failed to load pipeline: weights not found");
    }
}
