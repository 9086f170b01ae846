//! TimeWarp Core Library
//!
//! This library re-renders a single portrait in several decade styles using
//! Google's Gemini image model, while a mask keeps the subject's face and
//! body untouched.
//!
//! # Overview
//!
//! - **Masks**: auto-generated or hand-painted editable regions via [`mask`]
//! - **Styles**: the fixed, ordered decade catalog in [`styles`]
//! - **Requests**: prompt construction and result extraction via [`generation`]
//! - **Runs**: concurrent per-style requests and the gallery via [`batch`]
//! - **Export**: zip packaging of successful results via [`export`]
//!
//! # Quick Start
//!
//! ```ignore
//! use timewarp_core::TimeWarp;
//!
//! let mut app = TimeWarp::new()?;
//! app.workspace_mut().upload_path("portrait.jpg")?;
//!
//! let result = app.workspace().generate(None).await?;
//! for outcome in &result.outcomes {
//!     println!("{}: {:?}", outcome.style_id, outcome.status);
//! }
//!
//! let archive = app.workspace().export_all()?;
//! archive.file.save_to(".")?;
//! ```
//!
//! # Module Structure
//!
//! - [`batch`]: Run orchestration, progress and gallery snapshots
//! - [`config`]: Configuration loading and management
//! - [`error`]: Error types and result aliases
//! - [`export`]: Archive and single-image export
//! - [`gemini`]: Image model seam and the Gemini client
//! - [`generation`]: Per-style request adapter
//! - [`image_processing`]: Uploaded images and encoded payloads
//! - [`mask`]: Editable-region masks and the manual editor
//! - [`styles`]: Decade style catalog
//! - [`workspace`]: Session state tying the pieces together

pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod gemini;
pub mod generation;
pub mod image_processing;
pub mod mask;
pub mod styles;
pub mod workspace;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use batch::{BatchOrchestrator, BatchResult, GallerySnapshot, GenerationOutcome, OutcomeStatus, RunProgress};
pub use config::Config;
pub use error::{AppError, ErrorKind, Result};
pub use gemini::{GeminiImageModel, ImageModel};
pub use generation::GenerationAdapter;
pub use image_processing::{ImagePayload, SourceImage};
pub use mask::{EditMask, MaskEditor, build_auto_mask};
pub use styles::{StyleCatalog, StyleDescriptor};
pub use workspace::Workspace;

use std::sync::Arc;

/// Main entry point for the TimeWarp application.
///
/// Wires configuration, the Gemini model, the decade catalog and a fresh
/// [`Workspace`] together.
pub struct TimeWarp {
    config: Config,
    workspace: Workspace,
}

impl TimeWarp {
    /// Creates an instance configured from the environment.
    ///
    /// A missing API key does not fail here; it is logged and every
    /// generation request will fail instead.
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::with_config(config)
    }

    /// Creates an instance with custom configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        let model = GeminiImageModel::new(&config)?;
        Ok(Self::with_model(config, Arc::new(model)))
    }

    /// Creates an instance around any [`ImageModel`].
    pub fn with_model(config: Config, model: Arc<dyn ImageModel>) -> Self {
        let adapter = GenerationAdapter::new(model, StyleCatalog::decades());
        let workspace = Workspace::new(BatchOrchestrator::new(adapter));
        Self { config, workspace }
    }

    /// Returns a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }
}

/// Loads `.env` files if present. Call once at startup.
pub fn init() {
    let _ = dotenvy::dotenv();
}
