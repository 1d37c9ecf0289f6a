use image::DynamicImage;
use rand::Rng;

use crate::{InfuError, ModelVersion, PipelineConfig};

pub const DEFAULT_PROMPT: &str = "Portrait, 4K, high quality, cinematic";
pub const DEFAULT_SEED: u32 = 0;
pub const DEFAULT_WIDTH: u32 = 864;
pub const DEFAULT_HEIGHT: u32 = 1152;
pub const DEFAULT_GUIDANCE_SCALE: f32 = 3.5;
pub const DEFAULT_NUM_STEPS: u32 = 30;
pub const DEFAULT_CONDITIONING_SCALE: f32 = 1.0;
pub const DEFAULT_GUIDANCE_START: f32 = 0.0;
pub const DEFAULT_GUIDANCE_END: f32 = 1.0;

/// Everything the form collects for one generation.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub id_image: DynamicImage,
    pub control_image: Option<DynamicImage>,
    pub prompt: String,
    /// `0` asks for a random seed.
    pub seed: u32,
    pub width: u32,
    pub height: u32,
    pub guidance_scale: f32,
    pub num_steps: u32,
    pub infusenet_conditioning_scale: f32,
    pub infusenet_guidance_start: f32,
    pub infusenet_guidance_end: f32,
    pub enable_realism: bool,
    pub enable_anti_blur: bool,
    pub model_version: ModelVersion,
}

/// The fields an example gallery entry carries. Everything else comes from the stock preset.
#[derive(Clone, Debug)]
pub struct ExampleInput {
    pub id_image: DynamicImage,
    pub control_image: Option<DynamicImage>,
    pub prompt: String,
    pub seed: u32,
    pub enable_realism: bool,
    pub enable_anti_blur: bool,
    pub model_version: ModelVersion,
}

/// Arguments of a single pipeline call, with the seed already resolved.
#[derive(Clone, Copy, Debug)]
pub struct PipelineInputs<'a> {
    pub id_image: &'a DynamicImage,
    pub control_image: Option<&'a DynamicImage>,
    pub prompt: &'a str,
    pub seed: u32,
    pub width: u32,
    pub height: u32,
    pub guidance_scale: f32,
    pub num_steps: u32,
    pub infusenet_conditioning_scale: f32,
    pub infusenet_guidance_start: f32,
    pub infusenet_guidance_end: f32,
}

impl GenerationRequest {
    /// A request with the form defaults for the given identity image.
    pub fn new(id_image: DynamicImage) -> Self {
        Self {
            id_image,
            control_image: None,
            prompt: DEFAULT_PROMPT.to_string(),
            seed: DEFAULT_SEED,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            num_steps: DEFAULT_NUM_STEPS,
            infusenet_conditioning_scale: DEFAULT_CONDITIONING_SCALE,
            infusenet_guidance_start: DEFAULT_GUIDANCE_START,
            infusenet_guidance_end: DEFAULT_GUIDANCE_END,
            enable_realism: false,
            enable_anti_blur: false,
            model_version: ModelVersion::default(),
        }
    }

    pub fn from_example(example: ExampleInput) -> Self {
        Self {
            control_image: example.control_image,
            prompt: example.prompt,
            seed: example.seed,
            enable_realism: example.enable_realism,
            enable_anti_blur: example.enable_anti_blur,
            model_version: example.model_version,
            ..Self::new(example.id_image)
        }
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig::new(self.model_version, self.enable_realism, self.enable_anti_blur)
    }

    pub fn validate(&self) -> Result<(), InfuError> {
        if self.width == 0 || self.height == 0 {
            return Err(InfuError::InvalidRequest(format!(
                "width and height must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.num_steps == 0 {
            return Err(InfuError::InvalidRequest(
                "num steps must be positive".to_string(),
            ));
        }
        if !self.guidance_scale.is_finite() {
            return Err(InfuError::InvalidRequest(
                "guidance scale must be a finite number".to_string(),
            ));
        }
        for (name, value) in [
            ("infusenet conditioning scale", self.infusenet_conditioning_scale),
            ("infusenet guidance start", self.infusenet_guidance_start),
            ("infusenet guidance end", self.infusenet_guidance_end),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(InfuError::InvalidRequest(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn inputs(&self, seed: u32) -> PipelineInputs<'_> {
        PipelineInputs {
            id_image: &self.id_image,
            control_image: self.control_image.as_ref(),
            prompt: &self.prompt,
            seed,
            width: self.width,
            height: self.height,
            guidance_scale: self.guidance_scale,
            num_steps: self.num_steps,
            infusenet_conditioning_scale: self.infusenet_conditioning_scale,
            infusenet_guidance_start: self.infusenet_guidance_start,
            infusenet_guidance_end: self.infusenet_guidance_end,
        }
    }
}

/// Replaces the `0` placeholder with a random non-zero seed; other seeds pass through.
pub fn resolve_seed<R: Rng + ?Sized>(seed: u32, rng: &mut R) -> u32 {
    if seed == 0 {
        rng.gen_range(1..=u32::MAX)
    } else {
        seed
    }
}
