use serde::{Deserialize, Serialize};

use crate::ModelVersion;

/// Blend strength every optional LoRA is loaded with.
pub const LORA_WEIGHT: f32 = 1.0;

/// Optional LoRA weight sets that can be stacked on top of the identity pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptionalLora {
    Realism,
    AntiBlur,
}

impl OptionalLora {
    pub const ALL: [OptionalLora; 2] = [OptionalLora::Realism, OptionalLora::AntiBlur];

    /// Adapter name registered with the pipeline.
    pub fn adapter_name(&self) -> &'static str {
        match self {
            OptionalLora::Realism => "realism",
            OptionalLora::AntiBlur => "anti_blur",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            OptionalLora::Realism => "flux_realism_lora.safetensors",
            OptionalLora::AntiBlur => "flux_anti_blur_lora.safetensors",
        }
    }
}

/// What is currently loaded into the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub model_version: ModelVersion,
    pub enable_realism: bool,
    pub enable_anti_blur: bool,
}

impl PipelineConfig {
    pub fn new(model_version: ModelVersion, enable_realism: bool, enable_anti_blur: bool) -> Self {
        Self {
            model_version,
            enable_realism,
            enable_anti_blur,
        }
    }

    /// Enabled LoRAs in load order.
    pub fn loras(&self) -> Vec<OptionalLora> {
        OptionalLora::ALL
            .into_iter()
            .filter(|lora| match lora {
                OptionalLora::Realism => self.enable_realism,
                OptionalLora::AntiBlur => self.enable_anti_blur,
            })
            .collect()
    }
}

/// Work needed to move the pipeline from its loaded configuration to a requested one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    ReloadAdapters,
    Rebuild,
}

pub fn plan_transition(loaded: Option<&PipelineConfig>, requested: &PipelineConfig) -> Transition {
    match loaded {
        None => Transition::Rebuild,
        Some(loaded) if loaded.model_version != requested.model_version => Transition::Rebuild,
        Some(loaded) if loaded == requested => Transition::Unchanged,
        Some(_) => Transition::ReloadAdapters,
    }
}
