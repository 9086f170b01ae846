//! Editing session: the uploaded image, its mask, and the generation runs.
//!
//! A new upload replaces the source image wholesale, rebuilds the auto mask
//! for the new size, and invalidates any results or in-flight run.

use crate::batch::{BatchOrchestrator, BatchResult, GallerySnapshot};
use crate::error::{AppError, Result};
use crate::export::{self, Archive, ExportedFile};
use crate::image_processing::SourceImage;
use crate::mask::{EditMask, MaskEditor};
use crate::styles::StyleCatalog;
use std::sync::Arc;

pub struct Workspace {
    source: Option<SourceImage>,
    editor: MaskEditor,
    orchestrator: Arc<BatchOrchestrator>,
}

impl Workspace {
    pub fn new(orchestrator: BatchOrchestrator) -> Self {
        Self {
            source: None,
            editor: MaskEditor::new(),
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Accepts a JPEG or PNG upload.
    ///
    /// On error the previous session state is left untouched.
    pub fn upload(&mut self, bytes: impl Into<Arc<[u8]>>) -> Result<&SourceImage> {
        let image = SourceImage::from_bytes(bytes)?;
        Ok(self.replace_source(image))
    }

    pub fn upload_path(&mut self, path: impl AsRef<std::path::Path>) -> Result<&SourceImage> {
        let image = SourceImage::from_path(path)?;
        Ok(self.replace_source(image))
    }

    fn replace_source(&mut self, image: SourceImage) -> &SourceImage {
        log::info!(
            "Loaded {} image {}x{}",
            image.mime_type(),
            image.width(),
            image.height()
        );
        self.orchestrator.invalidate();
        self.editor.reset(Some(image.dimensions()));
        self.source.insert(image)
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn mask_editor(&self) -> &MaskEditor {
        &self.editor
    }

    pub fn mask_editor_mut(&mut self) -> &mut MaskEditor {
        &mut self.editor
    }

    /// Loads a mask image from disk in place of the current one.
    pub fn load_mask(&mut self, bytes: &[u8]) -> Result<()> {
        let mask = EditMask::from_png_bytes(bytes)?;
        self.editor.replace(mask)
    }

    /// Whether "generate" may be offered: an image and a ready mask.
    pub fn can_generate(&self) -> bool {
        self.source.is_some() && self.editor.snapshot().is_ready()
    }

    pub fn catalog(&self) -> &StyleCatalog {
        self.orchestrator.adapter().catalog()
    }

    pub fn orchestrator(&self) -> Arc<BatchOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn gallery(&self) -> GallerySnapshot {
        self.orchestrator.snapshot()
    }

    /// Starts a run over the full catalog using the last committed mask.
    pub async fn generate(&self, seed: Option<i64>) -> Result<BatchResult> {
        let mask = self.editor.snapshot();
        self.orchestrator
            .run_batch(self.source.as_ref(), Some(&mask), self.catalog(), seed)
            .await
    }

    /// Packages every successful image of the current gallery.
    pub fn export_all(&self) -> Result<Archive> {
        export::export_successful(&self.gallery().outcomes)
    }

    /// Exports one style from the current gallery.
    pub fn export_style(&self, style_id: &str) -> Result<ExportedFile> {
        let gallery = self.gallery();
        let outcome = gallery
            .outcome(style_id)
            .ok_or_else(|| AppError::OutcomeNotExportable(style_id.to_string()))?;
        export::export_single(outcome)
    }
}

/// Parses the optional seed field. Blank text means no seed.
pub fn parse_seed(text: &str) -> Result<Option<i64>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<i64>()
        .map(Some)
        .map_err(|_| AppError::config(format!("Seed must be a whole number, got {:?}", text)))
}
