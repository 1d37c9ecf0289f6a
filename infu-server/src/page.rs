use anyhow::Result;
use infu_core::{
    ModelVersion, DEFAULT_CONDITIONING_SCALE, DEFAULT_GUIDANCE_END, DEFAULT_GUIDANCE_SCALE,
    DEFAULT_GUIDANCE_START, DEFAULT_HEIGHT, DEFAULT_NUM_STEPS, DEFAULT_PROMPT, DEFAULT_SEED,
    DEFAULT_WIDTH, OUTPUT_LABEL,
};
use minijinja::{context, Environment};
use serde::Serialize;

use crate::examples::Gallery;

const INDEX: &str = include_str!("../templates/index.html");

#[derive(Serialize)]
struct FormDefaults {
    prompt: &'static str,
    model_version: ModelVersion,
    num_steps: u32,
    seed: u32,
    width: u32,
    height: u32,
    guidance_scale: f32,
    infusenet_conditioning_scale: f32,
    infusenet_guidance_start: f32,
    infusenet_guidance_end: f32,
    enable_realism: bool,
    enable_anti_blur: bool,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT,
            model_version: ModelVersion::default(),
            num_steps: DEFAULT_NUM_STEPS,
            seed: DEFAULT_SEED,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            infusenet_conditioning_scale: DEFAULT_CONDITIONING_SCALE,
            infusenet_guidance_start: DEFAULT_GUIDANCE_START,
            infusenet_guidance_end: DEFAULT_GUIDANCE_END,
            enable_realism: false,
            enable_anti_blur: false,
        }
    }
}

/// Renders the single page once; it only depends on startup state.
pub fn render(gallery: &Gallery) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("index.html", INDEX)?;
    let html = env.get_template("index.html")?.render(context! {
        defaults => FormDefaults::default(),
        versions => ModelVersion::ALL.map(|v| v.as_str()),
        output_label => OUTPUT_LABEL,
        examples => gallery.entries(),
    })?;
    Ok(html)
}
