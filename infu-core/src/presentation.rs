//! Maps generation outcomes onto what the page shows.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{image_to_base64_png, GenerationOutcome};

pub const OUTPUT_LABEL: &str = "Generated Image";

/// What to do with the output image widget.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayUpdate {
    /// Replace the image (base64 PNG) and its label.
    Show { image: String, label: String },
    /// Keep whatever is currently displayed.
    Unchanged,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Presentation {
    pub update: DisplayUpdate,
    /// User-visible error notification.
    pub notification: Option<String>,
}

impl Presentation {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            update: DisplayUpdate::Unchanged,
            notification: Some(message.into()),
        }
    }
}

impl From<GenerationOutcome> for Presentation {
    fn from(outcome: GenerationOutcome) -> Self {
        match outcome {
            GenerationOutcome::Generated(generated) => {
                match image_to_base64_png(&generated.image) {
                    Ok(image) => Self {
                        update: DisplayUpdate::Show {
                            image,
                            label: generated.label(),
                        },
                        notification: None,
                    },
                    Err(e) => {
                        error!("failed to encode generated image: {e:#}");
                        Self::error(format!("An error occurred: {e:#}"))
                    }
                }
            }
            GenerationOutcome::Failed { message } => Self::error(message),
        }
    }
}

/// State of the read-only output image widget.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputPanel {
    pub image: Option<String>,
    pub label: String,
}

impl Default for OutputPanel {
    fn default() -> Self {
        Self {
            image: None,
            label: OUTPUT_LABEL.to_string(),
        }
    }
}

impl OutputPanel {
    /// Applies an update, returning the notification to raise if there is one.
    pub fn apply<'a>(&mut self, presentation: &'a Presentation) -> Option<&'a str> {
        if let DisplayUpdate::Show { image, label } = &presentation.update {
            self.image = Some(image.clone());
            self.label = label.clone();
        }
        presentation.notification.as_deref()
    }
}
