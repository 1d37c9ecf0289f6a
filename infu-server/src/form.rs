use std::{collections::HashMap, str::FromStr};

use axum::extract::Multipart;
use infu_core::{decode_image, GenerationRequest, ModelVersion};

use crate::error::ApiError;

/// Raw multipart fields of the generation form.
#[derive(Debug, Default)]
pub struct FormFields {
    text: HashMap<String, String>,
    id_image: Option<Vec<u8>>,
    control_image: Option<Vec<u8>>,
}

impl FormFields {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut fields = FormFields::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match name.as_str() {
                "id_image" | "control_image" => {
                    let bytes = field.bytes().await?;
                    // Browsers send an empty part for an untouched file input.
                    if !bytes.is_empty() {
                        fields.set_image(&name, bytes.to_vec());
                    }
                }
                _ => {
                    let value = field.text().await?;
                    fields.text.insert(name, value);
                }
            }
        }
        Ok(fields)
    }

    pub fn set_text(&mut self, name: &str, value: &str) {
        self.text.insert(name.to_string(), value.to_string());
    }

    pub fn set_image(&mut self, name: &str, bytes: Vec<u8>) {
        match name {
            "id_image" => self.id_image = Some(bytes),
            _ => self.control_image = Some(bytes),
        }
    }

    /// Parses a field, falling back to `default` when it was not sent.
    fn parse<T: FromStr>(&self, name: &str, default: T) -> Result<T, ApiError> {
        match self.text.get(name).map(|v| v.trim()) {
            None | Some("") => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("Invalid value for {name}: {value:?}"))),
        }
    }

    /// Checkboxes are only submitted when ticked.
    fn flag(&self, name: &str) -> bool {
        matches!(
            self.text.get(name).map(|v| v.trim()),
            Some("on" | "true" | "1")
        )
    }

    /// Decodes the images and maps every field onto a request.
    pub fn into_request(self) -> Result<GenerationRequest, ApiError> {
        let id_bytes = self
            .id_image
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("Please upload an identity image".to_string()))?;
        let mut request = GenerationRequest::new(decode_image(id_bytes)?);
        request.control_image = self.control_image.as_deref().map(decode_image).transpose()?;

        if let Some(prompt) = self.text.get("prompt") {
            request.prompt = prompt.clone();
        }
        request.seed = self.parse("seed", request.seed)?;
        request.width = self.parse("width", request.width)?;
        request.height = self.parse("height", request.height)?;
        request.guidance_scale = self.parse("guidance_scale", request.guidance_scale)?;
        request.num_steps = self.parse("num_steps", request.num_steps)?;
        request.infusenet_conditioning_scale = self.parse(
            "infusenet_conditioning_scale",
            request.infusenet_conditioning_scale,
        )?;
        request.infusenet_guidance_start =
            self.parse("infusenet_guidance_start", request.infusenet_guidance_start)?;
        request.infusenet_guidance_end =
            self.parse("infusenet_guidance_end", request.infusenet_guidance_end)?;
        request.enable_realism = self.flag("enable_realism");
        request.enable_anti_blur = self.flag("enable_anti_blur");
        request.model_version = self.parse("model_version", ModelVersion::default())?;
        Ok(request)
    }
}
