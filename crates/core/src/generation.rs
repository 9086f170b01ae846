//! Generation request adapter.
//!
//! Turns (source image, mask, style) into one call against the image model
//! and extracts the resulting picture. The model has no separate channel for
//! negative prompts, so the forbidden changes are appended to the prompt.

use crate::error::{AppError, Result};
use crate::gemini::{ImageModel, ModelRequest};
use crate::image_processing::{ImagePayload, SourceImage};
use crate::mask::EditMask;
use crate::styles::{StyleCatalog, StyleDescriptor};
use std::sync::Arc;

/// Changes the model must never make.
pub const NEGATIVE_PROMPT: &str = "face morph, identity change, age change, different person, different ethnicity, pose change, body shape change, body morph, distortion, extra limbs, extra fingers, deformed face, warped head, different head size";

/// Fixed system-level instruction sent with every request.
pub const SYSTEM_INSTRUCTION: &str = "You are an expert image editing AI. You will be given a source image, a mask image, and a text prompt.
- The source image is the original photo to be edited.
- The mask image defines editable regions: strictly edit ONLY the white areas and leave the black areas completely untouched.
- The person's face identity, facial geometry, skin tone, and body proportions in the black-masked areas must remain exactly the same.
- Keep the original pose, camera angle, and framing unchanged.";

/// Builds the per-call prompt for `style`.
pub fn build_prompt(style: &StyleDescriptor) -> String {
    format!(
        "Using the provided source image and mask, transform only the HAIR, CLOTHING, and BACKGROUND (the white areas of the mask) to match this style: \"{}\". Do not make these changes: {}",
        style.prompt, NEGATIVE_PROMPT
    )
}

/// Encoded image and mask captured at dispatch time.
///
/// Later edits to the mask cannot reach requests holding this snapshot.
#[derive(Clone, Debug)]
pub struct GenerationInput {
    source: Arc<ImagePayload>,
    mask: Arc<ImagePayload>,
}

impl GenerationInput {
    /// Encodes both inputs, checking that the mask covers the image exactly.
    ///
    /// # Errors
    ///
    /// - [`AppError::MaskNotReady`] for an empty mask
    /// - [`AppError::MaskDimensionMismatch`] if the sizes differ
    pub fn capture(source: &SourceImage, mask: &EditMask) -> Result<Self> {
        if !mask.is_ready() {
            return Err(AppError::MaskNotReady);
        }
        if mask.dimensions() != source.dimensions() {
            return Err(AppError::MaskDimensionMismatch {
                mask_width: mask.width(),
                mask_height: mask.height(),
                image_width: source.width(),
                image_height: source.height(),
            });
        }
        Ok(Self {
            source: Arc::new(source.to_payload()),
            mask: Arc::new(mask.to_payload()?),
        })
    }

    pub fn source(&self) -> &ImagePayload {
        &self.source
    }

    pub fn mask(&self) -> &ImagePayload {
        &self.mask
    }
}

/// Sends one style request at a time to an [`ImageModel`].
pub struct GenerationAdapter {
    model: Arc<dyn ImageModel>,
    catalog: StyleCatalog,
}

impl GenerationAdapter {
    pub fn new(model: Arc<dyn ImageModel>, catalog: StyleCatalog) -> Self {
        Self { model, catalog }
    }

    /// Styles this adapter knows how to prompt for.
    pub fn catalog(&self) -> &StyleCatalog {
        &self.catalog
    }

    /// Renders `style_id` and returns the first image of the answer.
    ///
    /// # Errors
    ///
    /// - [`AppError::UnknownStyle`] before anything is sent
    /// - any remote failure from the model
    /// - [`AppError::NoImageInResponse`] if the answer holds no image
    pub async fn request_variant(
        &self,
        input: &GenerationInput,
        style_id: &str,
        seed: Option<i64>,
    ) -> Result<ImagePayload> {
        let style = self.catalog.resolve(style_id)?;

        let request = ModelRequest {
            style_id: style.id.clone(),
            source: input.source.clone(),
            mask: input.mask.clone(),
            prompt: build_prompt(style),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            seed,
        };

        let response = self.model.generate(request).await?;
        response
            .first_image()
            .cloned()
            .ok_or(AppError::NoImageInResponse)
    }
}
