use anyhow::Result;
use image::DynamicImage;

use crate::{LoraSpec, ModelVersion, PipelineInputs, PipelineSpec};

/// A constructed identity pipeline: one base model plus one identity adapter,
/// with a set of optional named LoRA adapters on top.
pub trait IdentityPipeline: Send {
    fn model_version(&self) -> ModelVersion;

    /// Runs one full generation and returns the produced image.
    fn generate(&mut self, inputs: PipelineInputs<'_>) -> Result<DynamicImage>;

    /// Removes the named adapters. Names that are not loaded are ignored.
    fn delete_adapters(&mut self, names: &[&str]) -> Result<()>;

    fn load_loras(&mut self, loras: &[LoraSpec]) -> Result<()>;
}

/// Builds pipelines from on-disk assets. Construction is expensive.
pub trait PipelineLoader: Send {
    type Pipeline: IdentityPipeline;

    fn load(&self, spec: &PipelineSpec) -> Result<Self::Pipeline>;
}
