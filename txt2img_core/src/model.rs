use std::time::Instant;

use diffusion_rs_core::{
    DiffusionGenerationParams, ModelSource, Offloading, Pipeline, TokenSource,
};
use image::DynamicImage;

use crate::{GenerateError, GenerationOptions, LoadError};

/// Where to find the pretrained model and how to load it.
pub struct ModelConfig {
    /// Model ID (local path or Hugging Face model ID).
    pub model_id: String,
    /// Model ID to source the transformer from, e.g. a quantized variant.
    pub transformer_model_id: Option<String>,
    /// Hugging Face token used for gated repositories.
    pub token: TokenSource,
    /// Model revision to use.
    pub revision: Option<String>,
    /// Offloading setting to use for this model.
    pub offloading: Option<Offloading>,
    /// Suppress download progress reporting.
    pub silent: bool,
}

impl ModelConfig {
    pub fn new<S: ToString>(model_id: S) -> Self {
        Self {
            model_id: model_id.to_string(),
            transformer_model_id: None,
            token: TokenSource::CacheToken,
            revision: None,
            offloading: None,
            silent: false,
        }
    }

    /// Fetch the weights and build the pipeline.
    ///
    /// The pipeline binds the GPU when the crate is compiled with an
    /// accelerator feature and runs on CPU otherwise. Weights are allocated
    /// here and held until the handle is dropped.
    pub fn load(self) -> Result<TextToImageModel, LoadError> {
        let source = match &self.transformer_model_id {
            Some(transformer_id) => ModelSource::from_model_id(&self.model_id)
                .override_transformer_model_id(transformer_id)
                .map_err(LoadError::Pipeline)?,
            None => ModelSource::from_model_id(&self.model_id),
        };

        tracing::info!("Loading pipeline for {}", self.model_id);
        let start = Instant::now();

        let pipeline = Pipeline::load(
            source,
            self.silent,
            self.token,
            self.revision,
            self.offloading,
        )
        .map_err(LoadError::Pipeline)?;

        tracing::info!("Pipeline ready in {:.2}s", start.elapsed().as_secs_f32());

        Ok(TextToImageModel {
            model_id: self.model_id,
            pipeline,
        })
    }
}

/// Loaded pipeline handle.
///
/// Created once per process and read-only afterwards; generation does not
/// mutate the weights.
pub struct TextToImageModel {
    model_id: String,
    pipeline: Pipeline,
}

impl TextToImageModel {
    /// Run one inference call, producing exactly one image.
    ///
    /// Output is stochastic: two calls with the same prompt are not expected
    /// to return identical images.
    pub fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<DynamicImage, GenerateError> {
        let prompt = validated_prompt(prompt)?;
        options.validate()?;

        let start = Instant::now();

        let mut images = self
            .pipeline
            .forward(
                vec![prompt.to_string()],
                DiffusionGenerationParams {
                    height: options.height,
                    width: options.width,
                    num_steps: options.num_steps,
                    guidance_scale: options.guidance_scale,
                },
            )
            .map_err(GenerateError::Pipeline)?;

        tracing::info!("Generation took {:.2}s", start.elapsed().as_secs_f32());

        if images.is_empty() {
            return Err(GenerateError::NoImage);
        }
        Ok(images.remove(0))
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn validated_prompt(prompt: &str) -> Result<&str, GenerateError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(GenerateError::EmptyPrompt);
    }
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prompt_is_rejected() {
        assert!(matches!(
            validated_prompt(""),
            Err(GenerateError::EmptyPrompt)
        ));
        assert!(matches!(
            validated_prompt("   \n"),
            Err(GenerateError::EmptyPrompt)
        ));
    }

    #[test]
    fn prompt_is_trimmed() {
        assert_eq!(validated_prompt("  a sunrise  ").unwrap(), "a sunrise");
    }

    #[test]
    fn config_defaults() {
        let config = ModelConfig::new("black-forest-labs/FLUX.1-schnell");
        assert_eq!(config.model_id, "black-forest-labs/FLUX.1-schnell");
        assert!(config.transformer_model_id.is_none());
        assert!(config.revision.is_none());
        assert!(!config.silent);
    }
}
