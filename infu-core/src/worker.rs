//! Identity pipeline hosted by a separate worker process.
//!
//! The worker owns the accelerator and the model weights; this side sends it
//! construction, adapter and generation commands as JSON over HTTP and gets
//! PNG bytes back.

use std::io::Read;

use anyhow::{Context, Result};
use base64::{prelude::BASE64_STANDARD, Engine};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    check_safetensors, decode_image, image_to_png, IdentityPipeline, InfuError, LoraSpec,
    ModelVersion, PipelineInputs, PipelineLoader, PipelineSpec,
};

pub const DEFAULT_WORKER_URL: &str = "http://127.0.0.1:8188";

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Serialize)]
struct DeleteAdapters<'a> {
    names: &'a [&'a str],
}

#[derive(Serialize)]
struct LoadLoras<'a> {
    loras: &'a [LoraSpec],
}

#[derive(Serialize)]
struct Generate<'a> {
    id_image: String,
    control_image: Option<String>,
    prompt: &'a str,
    seed: u32,
    width: u32,
    height: u32,
    guidance_scale: f32,
    num_steps: u32,
    infusenet_conditioning_scale: f32,
    infusenet_guidance_start: f32,
    infusenet_guidance_end: f32,
}

impl<'a> Generate<'a> {
    fn new(inputs: &PipelineInputs<'a>) -> Result<Self> {
        let encode = |img: &DynamicImage| -> Result<String> {
            Ok(BASE64_STANDARD.encode(image_to_png(img)?))
        };
        Ok(Self {
            id_image: encode(inputs.id_image)?,
            control_image: inputs.control_image.map(encode).transpose()?,
            prompt: inputs.prompt,
            seed: inputs.seed,
            width: inputs.width,
            height: inputs.height,
            guidance_scale: inputs.guidance_scale,
            num_steps: inputs.num_steps,
            infusenet_conditioning_scale: inputs.infusenet_conditioning_scale,
            infusenet_guidance_start: inputs.infusenet_guidance_start,
            infusenet_guidance_end: inputs.infusenet_guidance_end,
        })
    }
}

/// Turns non-2xx replies into [`InfuError::Worker`] carrying the worker's message.
fn check(result: std::result::Result<ureq::Response, ureq::Error>) -> Result<ureq::Response> {
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, response)) => {
            let message = response
                .into_string()
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            Err(InfuError::Worker { status, message }.into())
        }
        Err(e) => Err(anyhow::Error::new(e).context("pipeline worker is unreachable")),
    }
}

pub struct WorkerLoader {
    agent: ureq::Agent,
    base_url: String,
}

impl WorkerLoader {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl PipelineLoader for WorkerLoader {
    type Pipeline = WorkerPipeline;

    fn load(&self, spec: &PipelineSpec) -> Result<WorkerPipeline> {
        spec.check_assets()?;

        let url = format!("{}/pipelines", self.base_url);
        let response = check(self.agent.post(&url).send_json(spec))?;
        let created: Created = response
            .into_json()
            .context("malformed reply to pipeline construction")?;
        info!(id = %created.id, version = %spec.model_version, "worker built pipeline");

        Ok(WorkerPipeline {
            agent: self.agent.clone(),
            url: format!("{}/pipelines/{}", self.base_url, created.id),
            model_version: spec.model_version,
        })
    }
}

/// Handle to one pipeline living in the worker. Dropping it releases the
/// worker-side pipeline.
pub struct WorkerPipeline {
    agent: ureq::Agent,
    url: String,
    model_version: ModelVersion,
}

impl IdentityPipeline for WorkerPipeline {
    fn model_version(&self) -> ModelVersion {
        self.model_version
    }

    fn generate(&mut self, inputs: PipelineInputs<'_>) -> Result<DynamicImage> {
        let body = Generate::new(&inputs)?;
        let response = check(
            self.agent
                .post(&format!("{}/generate", self.url))
                .send_json(&body),
        )?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .context("failed to read generated image")?;
        Ok(decode_image(&bytes)?)
    }

    fn delete_adapters(&mut self, names: &[&str]) -> Result<()> {
        debug!(?names, "deleting adapters");
        check(
            self.agent
                .post(&format!("{}/adapters/delete", self.url))
                .send_json(DeleteAdapters { names }),
        )
        .context("failed to delete adapters")?;
        Ok(())
    }

    fn load_loras(&mut self, loras: &[LoraSpec]) -> Result<()> {
        for lora in loras {
            check_safetensors(&lora.path)?;
            info!(name = %lora.name, weight = lora.weight, path = %lora.path.display(), "loading LoRA");
        }
        check(
            self.agent
                .post(&format!("{}/loras", self.url))
                .send_json(LoadLoras { loras }),
        )
        .context("failed to load LoRAs")?;
        Ok(())
    }
}

impl Drop for WorkerPipeline {
    fn drop(&mut self) {
        if let Err(e) = check(self.agent.delete(&self.url).call()) {
            warn!(url = %self.url, "failed to release pipeline: {e:#}");
        }
    }
}
