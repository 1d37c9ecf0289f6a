//! Example gallery read from `<examples-dir>/examples.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use infu_core::{decode_image, ExampleInput, ModelVersion};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MANIFEST: &str = "examples.json";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExampleEntry {
    /// Relative to the examples directory.
    pub id_image: PathBuf,
    #[serde(default)]
    pub control_image: Option<PathBuf>,
    pub prompt: String,
    #[serde(default)]
    pub seed: u32,
    #[serde(default)]
    pub model_version: ModelVersion,
    #[serde(default)]
    pub enable_realism: bool,
    #[serde(default)]
    pub enable_anti_blur: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Gallery {
    dir: PathBuf,
    entries: Vec<ExampleEntry>,
}

impl Gallery {
    /// Loads the manifest. A directory without one yields an empty gallery.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest = dir.join(MANIFEST);
        if !manifest.is_file() {
            info!(path = %manifest.display(), "no example manifest, gallery is empty");
            return Ok(Self {
                dir: dir.to_path_buf(),
                entries: Vec::new(),
            });
        }
        let json = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let gallery = Self::from_json(dir, &json)
            .with_context(|| format!("failed to parse {}", manifest.display()))?;
        info!(examples = gallery.entries.len(), "loaded example gallery");
        Ok(gallery)
    }

    pub fn from_json(dir: &Path, json: &str) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            entries: serde_json::from_str(json)?,
        })
    }

    pub fn entries(&self) -> &[ExampleEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&ExampleEntry> {
        self.entries.get(index)
    }

    /// Reads and decodes the images of an entry.
    pub fn input(&self, entry: &ExampleEntry) -> Result<ExampleInput> {
        let read = |relative: &Path| -> Result<_> {
            let path = self.dir.join(relative);
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read example image {}", path.display()))?;
            Ok(decode_image(&bytes)?)
        };
        Ok(ExampleInput {
            id_image: read(&entry.id_image)?,
            control_image: entry.control_image.as_deref().map(read).transpose()?,
            prompt: entry.prompt.clone(),
            seed: entry.seed,
            enable_realism: entry.enable_realism,
            enable_anti_blur: entry.enable_anti_blur,
            model_version: entry.model_version,
        })
    }
}
