use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    plan_transition, AssetLayout, IdentityPipeline, OptionalLora, PipelineConfig, PipelineLoader,
    Transition,
};

/// Owns the pipeline and the configuration it was last brought to.
///
/// `loaded` is only `Some` while `pipeline` is `Some` and fully matches it.
pub struct PipelineManager<L: PipelineLoader> {
    loader: L,
    layout: AssetLayout,
    base_model_path: String,
    image_encoder_path: Option<PathBuf>,
    pipeline: Option<L::Pipeline>,
    loaded: Option<PipelineConfig>,
}

impl<L: PipelineLoader> PipelineManager<L> {
    pub fn new(loader: L, layout: AssetLayout, base_model_path: impl Into<String>) -> Self {
        Self {
            loader,
            layout,
            base_model_path: base_model_path.into(),
            image_encoder_path: None,
            pipeline: None,
            loaded: None,
        }
    }

    pub fn with_image_encoder(mut self, image_encoder_path: Option<PathBuf>) -> Self {
        self.image_encoder_path = image_encoder_path;
        self
    }

    pub fn loaded(&self) -> Option<&PipelineConfig> {
        self.loaded.as_ref()
    }

    pub fn pipeline_mut(&mut self) -> Option<&mut L::Pipeline> {
        self.pipeline.as_mut()
    }

    /// Brings the pipeline to `requested`, doing the least work that gets there.
    pub fn prepare(&mut self, requested: PipelineConfig) -> Result<Transition> {
        let transition = plan_transition(self.loaded.as_ref(), &requested);
        if transition == Transition::Unchanged {
            return Ok(transition);
        }

        self.loaded = None;
        if transition == Transition::Rebuild {
            // Free the old weights before the new ones are allocated.
            self.pipeline = None;

            let spec = self.layout.pipeline_spec(
                &self.base_model_path,
                self.image_encoder_path.as_deref(),
                requested.model_version,
            );
            info!(path = %spec.infu_model_path.display(), "loading identity adapter");
            info!(base_model = %spec.base_model_path, "loading base model");
            let pipeline = self.loader.load(&spec).with_context(|| {
                format!("failed to load {} pipeline", requested.model_version)
            })?;
            self.pipeline = Some(pipeline);
        }

        let pipeline = self
            .pipeline
            .as_mut()
            .context("identity pipeline is not loaded")?;
        let names = OptionalLora::ALL.map(|lora| lora.adapter_name());
        pipeline.delete_adapters(&names)?;
        let loras: Vec<_> = requested
            .loras()
            .into_iter()
            .map(|lora| self.layout.lora_spec(lora))
            .collect();
        pipeline.load_loras(&loras)?;

        info!(
            version = %requested.model_version,
            realism = requested.enable_realism,
            anti_blur = requested.enable_anti_blur,
            ?transition,
            "pipeline ready"
        );
        self.loaded = Some(requested);
        Ok(transition)
    }
}
