//! Test doubles shared by the unit tests.

use crate::error::{AppError, Result};
use crate::gemini::{ImageModel, ModelRequest, ModelResponse, ResponsePart};
use crate::image_processing::{ImagePayload, MIME_PNG, SourceImage};
use futures::future::BoxFuture;
use image::DynamicImage;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

/// Scripted behaviour for one call of one style.
pub enum Step {
    /// Answer with an image after the delay.
    Delay(Duration),
    /// Fail after the delay.
    Fail(Duration, String),
    /// Answer with text only.
    TextOnly,
    /// Wait for the gate, then answer with [`ScriptedModel::late_image_for`].
    Gate(oneshot::Receiver<()>),
}

/// In-memory [`ImageModel`]. Styles without a queued step answer at once.
#[derive(Default)]
pub struct ScriptedModel {
    steps: Mutex<HashMap<String, VecDeque<Step>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(self, style_id: &str, step: Step) -> Self {
        self.steps
            .lock()
            .expect("steps lock")
            .entry(style_id.to_string())
            .or_default()
            .push_back(step);
        self
    }

    pub fn with_delay_ms(self, style_id: &str, millis: u64) -> Self {
        self.with_step(style_id, Step::Delay(Duration::from_millis(millis)))
    }

    pub fn with_failure(self, style_id: &str, millis: u64, message: &str) -> Self {
        self.with_step(
            style_id,
            Step::Fail(Duration::from_millis(millis), message.to_string()),
        )
    }

    pub fn image_for(style_id: &str) -> ImagePayload {
        ImagePayload::from_bytes(MIME_PNG, format!("png:{}", style_id).as_bytes())
    }

    pub fn late_image_for(style_id: &str) -> ImagePayload {
        ImagePayload::from_bytes(MIME_PNG, format!("late:{}", style_id).as_bytes())
    }

    /// Requests in the order they were dispatched.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn next_step(&self, style_id: &str) -> Option<Step> {
        self.steps
            .lock()
            .expect("steps lock")
            .get_mut(style_id)
            .and_then(VecDeque::pop_front)
    }
}

impl ImageModel for ScriptedModel {
    fn generate(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        let step = self.next_step(&request.style_id);
        let style_id = request.style_id.clone();
        self.requests.lock().expect("requests lock").push(request);

        Box::pin(async move {
            let image = |payload| ModelResponse {
                parts: vec![ResponsePart::InlineImage(payload)],
            };
            match step {
                None => Ok(image(Self::image_for(&style_id))),
                Some(Step::Delay(delay)) => {
                    tokio::time::sleep(delay).await;
                    Ok(image(Self::image_for(&style_id)))
                }
                Some(Step::Fail(delay, message)) => {
                    tokio::time::sleep(delay).await;
                    Err(AppError::gemini(message))
                }
                Some(Step::TextOnly) => Ok(ModelResponse {
                    parts: vec![ResponsePart::Text("I can't edit this image.".into())],
                }),
                Some(Step::Gate(gate)) => {
                    let _ = gate.await;
                    Ok(image(Self::late_image_for(&style_id)))
                }
            }
        })
    }
}

/// A plain PNG upload of the given size.
pub fn sample_source(width: u32, height: u32) -> SourceImage {
    SourceImage::from_image(&DynamicImage::new_rgb8(width, height)).expect("sample source")
}
