use crate::GenerateError;

/// Parameters for one generation call.
///
/// The defaults are the FLUX.1-schnell settings: 4 denoising steps and no
/// guidance.
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    pub height: usize,
    pub width: usize,
    pub num_steps: usize,
    pub guidance_scale: f64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            height: 720,
            width: 1280,
            num_steps: 4,
            guidance_scale: 0.0,
        }
    }
}

impl GenerationOptions {
    pub fn validate(&self) -> Result<(), GenerateError> {
        if self.height == 0 || self.width == 0 {
            return Err(GenerateError::InvalidDimensions);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_schnell() {
        let options = GenerationOptions::default();
        assert_eq!(options.height, 720);
        assert_eq!(options.width, 1280);
        assert_eq!(options.num_steps, 4);
        assert_eq!(options.guidance_scale, 0.0);
    }

    #[test]
    fn default_options_validate() {
        assert!(GenerationOptions::default().validate().is_ok());
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let options = GenerationOptions {
            height: 0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(GenerateError::InvalidDimensions)
        ));

        let options = GenerationOptions {
            width: 0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(GenerateError::InvalidDimensions)
        ));
    }
}
