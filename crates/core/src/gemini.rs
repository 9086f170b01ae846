//! Remote image model seam and its Gemini implementation.
//!
//! [`ImageModel`] is the contract of the external generation service: it
//! takes a source image, a PNG mask, a prompt and a system instruction, and
//! returns the parts of the model's answer. [`GeminiImageModel`] fulfils it
//! over the Gemini API; tests substitute a scripted model.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::image_processing::{ImagePayload, MIME_PNG};
use futures::future::BoxFuture;
use gemini_rust::{Blob, Content, Gemini, GenerationConfig, Message, Part, Role};
use std::sync::Arc;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// One generation call, fully resolved.
#[derive(Clone, Debug)]
pub struct ModelRequest {
    /// Style this request renders; used for logging and test scripting.
    pub style_id: String,
    pub source: Arc<ImagePayload>,
    /// PNG mask: white is editable, black is locked.
    pub mask: Arc<ImagePayload>,
    pub prompt: String,
    pub system_instruction: String,
    /// Best-effort determinism hint.
    pub seed: Option<i64>,
}

/// A single part of a model answer.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePart {
    Text(String),
    InlineImage(ImagePayload),
}

/// The parts of the first candidate, in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelResponse {
    pub parts: Vec<ResponsePart>,
}

impl ModelResponse {
    /// First inline image, if the model returned any.
    pub fn first_image(&self) -> Option<&ImagePayload> {
        self.parts.iter().find_map(|part| match part {
            ResponsePart::InlineImage(payload) => Some(payload),
            ResponsePart::Text(_) => None,
        })
    }
}

/// An opaque remote image model.
pub trait ImageModel: Send + Sync {
    fn generate(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>>;
}

/// Gemini-backed [`ImageModel`] requesting image-only output.
pub struct GeminiImageModel {
    /// `None` when no API key is configured; every call then fails.
    client: Option<Gemini>,
    model_name: String,
}

impl GeminiImageModel {
    pub fn new(config: &Config) -> Result<Self> {
        let model_name = if config.model_name.starts_with("models/") {
            config.model_name.clone()
        } else {
            format!("models/{}", config.model_name)
        };

        let client = match &config.gemini_api_key {
            Some(api_key) => {
                // Explicit base URL avoids the BadScheme error from the default.
                let base_url = url::Url::parse(GEMINI_BASE_URL)
                    .map_err(|e| AppError::config(format!("Invalid base URL: {}", e)))?;
                let model_url = format!("{}{}", GEMINI_BASE_URL, model_name);

                let client = Gemini::with_model_and_base_url(api_key, model_url, base_url)
                    .map_err(|e| AppError::config(format!("Failed to create Gemini client: {}", e)))?;
                Some(client)
            }
            None => None,
        };

        Ok(Self { client, model_name })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate_content(&self, request: ModelRequest) -> Result<ModelResponse> {
        let client = self.client.as_ref().ok_or(AppError::MissingCredential)?;

        let source_part = Part::InlineData {
            inline_data: Blob {
                mime_type: request.source.mime_type.clone(),
                data: request.source.data.clone(),
            },
        };
        let mask_part = Part::InlineData {
            inline_data: Blob {
                mime_type: MIME_PNG.to_string(),
                data: request.mask.data.clone(),
            },
        };
        let text_part = Part::Text {
            text: request.prompt,
            thought: None,
            thought_signature: None,
        };

        let message = Message {
            role: Role::User,
            content: Content {
                role: Some(Role::User),
                parts: Some(vec![source_part, mask_part, text_part]),
            },
        };

        // The client exposes no seed field; the hint stops here.
        if let Some(seed) = request.seed {
            log::debug!("[{}] seed {} is not forwarded by the Gemini client", request.style_id, seed);
        }

        let response = client
            .generate_content()
            .with_messages(vec![message])
            .with_system_prompt(&request.system_instruction)
            .with_generation_config(GenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                ..Default::default()
            })
            .execute()
            .await
            .map_err(|e| classify_api_error(format!("{:?}", e)))?;

        let mut parts = Vec::new();
        if let Some(candidate) = response.candidates.first() {
            if let Some(candidate_parts) = &candidate.content.parts {
                for part in candidate_parts {
                    match part {
                        Part::InlineData { inline_data, .. } => {
                            parts.push(ResponsePart::InlineImage(ImagePayload::from_base64(
                                MIME_PNG,
                                inline_data.data.clone(),
                            )));
                        }
                        Part::Text { text, .. } => parts.push(ResponsePart::Text(text.clone())),
                        _ => {}
                    }
                }
            }
        }

        Ok(ModelResponse { parts })
    }
}

impl ImageModel for GeminiImageModel {
    fn generate(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        Box::pin(self.generate_content(request))
    }
}

fn classify_api_error(detail: String) -> AppError {
    if detail.contains("429") || detail.contains("RESOURCE_EXHAUSTED") {
        AppError::RateLimited
    } else {
        AppError::gemini(format!("API request failed: {}", detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            style_id: "1960s".into(),
            source: Arc::new(ImagePayload::from_bytes("image/jpeg", b"jpeg")),
            mask: Arc::new(ImagePayload::from_bytes(MIME_PNG, b"png")),
            prompt: "prompt".into(),
            system_instruction: "system".into(),
            seed: Some(7),
        }
    }

    #[tokio::test]
    async fn missing_credential_fails_at_call_time() {
        let config = Config::builder().build().expect("config");
        let model = GeminiImageModel::new(&config).expect("model without key");
        assert_eq!(model.model_name(), "models/gemini-2.5-flash-image");

        let result = model.generate(request()).await;
        assert!(matches!(result, Err(AppError::MissingCredential)));
    }

    #[test]
    fn first_image_skips_text_parts() {
        let image = ImagePayload::from_base64(MIME_PNG, "AAAA");
        let response = ModelResponse {
            parts: vec![
                ResponsePart::Text("here you go".into()),
                ResponsePart::InlineImage(image.clone()),
                ResponsePart::InlineImage(ImagePayload::from_base64(MIME_PNG, "BBBB")),
            ],
        };
        assert_eq!(response.first_image(), Some(&image));
        assert_eq!(ModelResponse::default().first_image(), None);
    }

    #[test]
    fn quota_errors_map_to_rate_limited() {
        assert!(matches!(
            classify_api_error("status 429 RESOURCE_EXHAUSTED".into()),
            AppError::RateLimited
        ));
        assert!(matches!(
            classify_api_error("connection reset".into()),
            AppError::GeminiApi(_)
        ));
    }
}
