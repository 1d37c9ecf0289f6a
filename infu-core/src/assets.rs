//! On-disk layout of the identity adapter checkpoints and their support assets.
//!
//! ```text
//! <root>/
//!   infu_flux_v1.0/<model_version>/        identity adapter checkpoint
//!   supports/insightface/                  face analysis models
//!   supports/optional_loras/*.safetensors  realism / anti-blur LoRAs
//! ```

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use memmap2::Mmap;
use safetensors::SafeTensors;
use serde::Serialize;
use tracing::debug;

use crate::{InfuError, ModelVersion, OptionalLora, LORA_WEIGHT};

pub const DEFAULT_MODELS_DIR: &str = "./models/InfiniteYou";
pub const DEFAULT_BASE_MODEL: &str = "black-forest-labs/FLUX.1-dev";

/// Adapter family every checkpoint under the layout belongs to.
pub const INFU_FLUX_VERSION: &str = "v1.0";

/// Number of tokens the identity projection feeds into cross-attention.
pub const IMAGE_PROJ_NUM_TOKENS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetLayout {
    root: PathBuf,
}

impl Default for AssetLayout {
    fn default() -> Self {
        Self::new(DEFAULT_MODELS_DIR)
    }
}

impl AssetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn infu_model_dir(&self, version: ModelVersion) -> PathBuf {
        self.root
            .join(format!("infu_flux_{INFU_FLUX_VERSION}"))
            .join(version.as_str())
    }

    pub fn insightface_dir(&self) -> PathBuf {
        self.root.join("supports").join("insightface")
    }

    pub fn lora_path(&self, lora: OptionalLora) -> PathBuf {
        self.root
            .join("supports")
            .join("optional_loras")
            .join(lora.file_name())
    }

    pub fn lora_spec(&self, lora: OptionalLora) -> LoraSpec {
        LoraSpec {
            path: self.lora_path(lora),
            name: lora.adapter_name().to_string(),
            weight: LORA_WEIGHT,
        }
    }

    pub fn pipeline_spec(
        &self,
        base_model_path: &str,
        image_encoder_path: Option<&Path>,
        version: ModelVersion,
    ) -> PipelineSpec {
        PipelineSpec {
            base_model_path: base_model_path.to_string(),
            infu_model_path: self.infu_model_dir(version),
            insightface_root_path: self.insightface_dir(),
            image_encoder_path: image_encoder_path.map(Path::to_path_buf),
            image_proj_num_tokens: IMAGE_PROJ_NUM_TOKENS,
            infu_flux_version: INFU_FLUX_VERSION.to_string(),
            model_version: version,
        }
    }
}

/// Everything needed to construct an identity pipeline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineSpec {
    /// Local directory or hub repo id of the base diffusion model.
    pub base_model_path: String,
    pub infu_model_path: PathBuf,
    pub insightface_root_path: PathBuf,
    pub image_encoder_path: Option<PathBuf>,
    pub image_proj_num_tokens: usize,
    pub infu_flux_version: String,
    pub model_version: ModelVersion,
}

impl PipelineSpec {
    /// Checks the on-disk assets this spec points at before any expensive load.
    pub fn check_assets(&self) -> Result<()> {
        require_dir(&self.infu_model_path)?;
        require_dir(&self.insightface_root_path)?;
        if let Some(encoder) = &self.image_encoder_path {
            if !encoder.exists() {
                return Err(InfuError::MissingAsset {
                    path: encoder.clone(),
                }
                .into());
            }
        }

        let entries = std::fs::read_dir(&self.infu_model_path).with_context(|| {
            format!("failed to list {}", self.infu_model_path.display())
        })?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "safetensors") {
                check_safetensors(&path)?;
            }
        }
        Ok(())
    }
}

/// One optional weight set: file, adapter name, blend strength.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoraSpec {
    pub path: PathBuf,
    pub name: String,
    pub weight: f32,
}

fn require_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(InfuError::MissingAsset {
            path: path.to_path_buf(),
        }
        .into())
    }
}

/// Validates a safetensors file without reading its weights: the header must
/// parse, every tensor's byte range must match its shape and dtype, and the
/// ranges must be contiguous and fill the file. Returns the number of tensors.
pub fn check_safetensors(path: &Path) -> Result<usize> {
    let invalid = |reason: String| InfuError::InvalidSafetensors {
        path: path.to_path_buf(),
        reason,
    };

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(InfuError::MissingAsset {
                path: path.to_path_buf(),
            }
            .into())
        }
        Err(e) => return Err(e).with_context(|| format!("failed to open {}", path.display())),
    };
    if file.metadata()?.len() < 8 {
        return Err(invalid("file is shorter than the header length prefix".to_string()).into());
    }

    // SAFETY: the map is read-only and dropped before this function returns.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("failed to map {}", path.display()))?;
    let (_, metadata) =
        SafeTensors::read_metadata(&mmap).map_err(|e| invalid(format!("{e:?}")))?;

    let tensors = metadata.tensors().len();
    debug!(path = %path.display(), tensors, "checked safetensors file");
    Ok(tensors)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A fresh scratch directory under the system temp dir.
    pub(crate) fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("infu-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Writes a safetensors file from a raw header, padding the header to the
    /// format's 8-byte alignment.
    pub(crate) fn write_raw_safetensors(path: &Path, header: &str, data_len: usize) {
        let mut header = header.to_string();
        while header.len() % 8 != 0 {
            header.push(' ');
        }
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend(std::iter::repeat(0u8).take(data_len));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    /// Writes a minimal valid safetensors file with one f32 tensor of `len` elements.
    pub(crate) fn write_safetensors(path: &Path, len: usize) {
        let header = format!(
            r#"{{"lora.weight":{{"dtype":"F32","shape":[{len}],"data_offsets":[0,{}]}}}}"#,
            len * 4
        );
        write_raw_safetensors(path, &header, len * 4);
    }

    /// Lays out a complete models directory for both versions.
    pub(crate) fn populated_layout(name: &str) -> AssetLayout {
        let layout = AssetLayout::new(scratch_dir(name));
        for version in ModelVersion::ALL {
            write_safetensors(
                &layout.infu_model_dir(version).join("infusenet.safetensors"),
                4,
            );
        }
        std::fs::create_dir_all(layout.insightface_dir()).unwrap();
        for lora in OptionalLora::ALL {
            write_safetensors(&layout.lora_path(lora), 2);
        }
        layout
    }

    #[test]
    fn test_layout_paths() {
        let layout = AssetLayout::new("/models");
        assert_eq!(
            layout.infu_model_dir(ModelVersion::SimStage1),
            PathBuf::from("/models/infu_flux_v1.0/sim_stage1")
        );
        assert_eq!(
            layout.insightface_dir(),
            PathBuf::from("/models/supports/insightface")
        );
        assert_eq!(
            layout.lora_path(OptionalLora::AntiBlur),
            PathBuf::from("/models/supports/optional_loras/flux_anti_blur_lora.safetensors")
        );
    }

    #[test]
    fn test_pipeline_spec_constants() {
        let layout = AssetLayout::new("/models");
        let spec = layout.pipeline_spec(DEFAULT_BASE_MODEL, None, ModelVersion::AesStage2);
        assert_eq!(spec.base_model_path, "black-forest-labs/FLUX.1-dev");
        assert_eq!(spec.image_proj_num_tokens, 8);
        assert_eq!(spec.infu_flux_version, "v1.0");
        assert_eq!(
            spec.infu_model_path,
            PathBuf::from("/models/infu_flux_v1.0/aes_stage2")
        );
    }

    #[test]
    fn test_lora_spec_weight() {
        let spec = AssetLayout::new("/models").lora_spec(OptionalLora::Realism);
        assert_eq!(spec.name, "realism");
        assert_eq!(spec.weight, 1.0);
    }

    #[test]
    fn test_check_safetensors_valid() {
        let dir = scratch_dir("valid");
        let path = dir.join("ok.safetensors");
        write_safetensors(&path, 3);
        assert_eq!(check_safetensors(&path).unwrap(), 1);
    }

    #[test]
    fn test_check_safetensors_truncated() {
        let dir = scratch_dir("truncated");
        let path = dir.join("cut.safetensors");
        write_safetensors(&path, 3);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        let err = check_safetensors(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InfuError>(),
            Some(InfuError::InvalidSafetensors { .. })
        ));
    }

    #[test]
    fn test_check_safetensors_shape_disagrees_with_offsets() {
        let dir = scratch_dir("shape");
        let path = dir.join("bad.safetensors");
        // Four f32 elements need 16 bytes, the header only reserves 4.
        write_raw_safetensors(
            &path,
            r#"{"w":{"dtype":"F32","shape":[4],"data_offsets":[0,4]}}"#,
            4,
        );

        let err = check_safetensors(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InfuError>(),
            Some(InfuError::InvalidSafetensors { .. })
        ));
    }

    #[test]
    fn test_check_safetensors_overlapping_ranges() {
        let dir = scratch_dir("overlap");
        let path = dir.join("overlap.safetensors");
        let header = concat!(
            r#"{"a":{"dtype":"F32","shape":[2],"data_offsets":[0,8]},"#,
            r#""b":{"dtype":"F32","shape":[2],"data_offsets":[4,12]}}"#
        );
        write_raw_safetensors(&path, header, 12);

        assert!(check_safetensors(&path).is_err());
    }

    #[test]
    fn test_check_safetensors_missing() {
        let dir = scratch_dir("missing");
        let err = check_safetensors(&dir.join("absent.safetensors")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InfuError>(),
            Some(InfuError::MissingAsset { .. })
        ));
    }

    #[test]
    fn test_check_assets() {
        let layout = populated_layout("assets");
        let spec = layout.pipeline_spec(DEFAULT_BASE_MODEL, None, ModelVersion::SimStage1);
        spec.check_assets().unwrap();

        std::fs::remove_dir_all(layout.insightface_dir()).unwrap();
        let err = spec.check_assets().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InfuError>(),
            Some(InfuError::MissingAsset { .. })
        ));
    }
}
