use std::sync::{
    atomic::{AtomicBool, Ordering},
    RwLock,
};

use anyhow::{Context, Result};
use image::DynamicImage;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    resolve_seed, ExampleInput, GenerationRequest, IdentityPipeline, PipelineConfig,
    PipelineLoader, PipelineManager, Transition,
};

#[derive(Clone, Debug)]
pub struct GeneratedImage {
    pub image: DynamicImage,
    /// The seed actually used, never the `0` placeholder.
    pub seed: u32,
}

impl GeneratedImage {
    pub fn label(&self) -> String {
        format!("Generated image, seed = {}", self.seed)
    }
}

#[derive(Clone, Debug)]
pub enum GenerationOutcome {
    Generated(GeneratedImage),
    /// The pipeline (or request validation) failed; `message` is meant for the user.
    Failed { message: String },
}

/// The single execution lane in front of the pipeline.
///
/// Every configuration change and generation goes through one FIFO mutex, so
/// at most one of them touches the pipeline at a time. All methods block and
/// must be called off the async runtime (e.g. from `spawn_blocking`).
pub struct Studio<L: PipelineLoader> {
    lane: Mutex<PipelineManager<L>>,
    generating: AtomicBool,
    /// Copy of the manager's loaded configuration, readable while the lane is held.
    loaded: RwLock<Option<PipelineConfig>>,
}

struct Busy<'a>(&'a AtomicBool);

impl<'a> Busy<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<L: PipelineLoader> Studio<L> {
    pub fn new(manager: PipelineManager<L>) -> Self {
        Self {
            loaded: RwLock::new(manager.loaded().copied()),
            lane: Mutex::new(manager),
            generating: AtomicBool::new(false),
        }
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    /// Configuration the pipeline was last brought to, also while a
    /// generation is running. `None` when nothing is loaded.
    pub fn loaded(&self) -> Option<PipelineConfig> {
        self.loaded.read().ok().and_then(|loaded| *loaded)
    }

    pub fn prepare(&self, config: PipelineConfig) -> Result<Transition> {
        let mut manager = self.lane.blocking_lock();
        self.prepare_locked(&mut manager, config)
    }

    fn prepare_locked(
        &self,
        manager: &mut PipelineManager<L>,
        config: PipelineConfig,
    ) -> Result<Transition> {
        let transition = manager.prepare(config);
        if let Ok(mut loaded) = self.loaded.write() {
            *loaded = manager.loaded().copied();
        }
        transition
    }

    /// Runs one generation.
    ///
    /// `Err` means the pipeline could not be brought to the requested
    /// configuration. Failures of the generation itself come back as
    /// [`GenerationOutcome::Failed`].
    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        if let Err(e) = request.validate() {
            warn!("rejected request: {e}");
            return Ok(GenerationOutcome::Failed {
                message: e.to_string(),
            });
        }

        let mut manager = self.lane.blocking_lock();
        let _busy = Busy::enter(&self.generating);

        self.prepare_locked(&mut manager, request.config())?;
        let pipeline = manager
            .pipeline_mut()
            .context("identity pipeline is not loaded")?;

        let seed = resolve_seed(request.seed, &mut rand::thread_rng());
        info!(
            seed,
            version = %pipeline.model_version(),
            width = request.width,
            height = request.height,
            steps = request.num_steps,
            "generating image"
        );

        match pipeline.generate(request.inputs(seed)) {
            Ok(image) => Ok(GenerationOutcome::Generated(GeneratedImage { image, seed })),
            Err(e) => {
                error!(seed, "generation failed: {e:#}");
                Ok(GenerationOutcome::Failed {
                    message: format!("An error occurred: {e:#}"),
                })
            }
        }
    }

    /// Runs an example gallery entry with the stock hyperparameters.
    pub fn generate_example(&self, example: ExampleInput) -> Result<GenerationOutcome> {
        self.generate(&GenerationRequest::from_example(example))
    }
}
