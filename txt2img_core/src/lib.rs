//! Shared glue between the txt2img front-ends and the `diffusion_rs_core`
//! pipeline: model loading, the single generation call, and PNG encoding for
//! inline display.
//!
//! The pipeline itself (text encoder, denoising network, image decoder,
//! sampling) is entirely the library's concern; this crate only configures
//! it, invokes it and hands the result to a UI shell.
//!
//! ```rust,no_run
//! use txt2img_core::{GenerationOptions, ModelConfig};
//!
//! let model = ModelConfig::new("black-forest-labs/FLUX.1-schnell").load()?;
//!
//! let image = model.generate(
//!     "Draw a picture of a sunrise.",
//!     &GenerationOptions::default(),
//! )?;
//!
//! image.save("image.png")?;
//!
//! # Ok::<(), anyhow::Error>(())
//! ```

mod encode;
mod error;
mod model;
mod options;

pub use diffusion_rs_core::{Offloading, TokenSource};
pub use encode::encode_png;
pub use error::{GenerateError, LoadError};
pub use model::{ModelConfig, TextToImageModel};
pub use options::GenerationOptions;
