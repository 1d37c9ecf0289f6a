pub mod assets;
pub mod config;
pub mod error;
pub mod loader;
pub mod manager;
pub mod presentation;
pub mod request;
pub mod studio;
mod util;
pub mod version;
pub mod worker;

pub use assets::*;
pub use config::*;
pub use error::InfuError;
pub use loader::*;
pub use manager::PipelineManager;
pub use presentation::*;
pub use request::*;
pub use studio::*;
pub use util::*;
pub use version::ModelVersion;
pub use worker::{WorkerLoader, WorkerPipeline};
