//! Error types for the timewarp-core library.
//!
//! This module provides granular error variants for different failure modes,
//! enabling precise error handling and user-friendly error messages.
//!
//! Variants are grouped by [`ErrorKind`]. Only validation and export errors
//! stop a caller; remote call errors are recorded as failed outcomes by the
//! batch orchestrator and never abort sibling requests.

use thiserror::Error;

/// Errors that can occur within the timewarp-core library.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (missing keys, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The uploaded file is neither JPEG nor PNG.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Image decoding or encoding failed.
    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    /// The image has zero width or height.
    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// A style identifier outside the catalog was requested.
    #[error("Invalid decade: {0}")]
    UnknownStyle(String),

    /// Generation was requested before any image was uploaded.
    #[error("No source image uploaded")]
    MissingSourceImage,

    /// Generation was requested while the mask is absent or empty.
    #[error("Mask is not ready yet")]
    MaskNotReady,

    /// The mask does not cover the source image pixel for pixel.
    #[error("Mask is {mask_width}x{mask_height} but the image is {image_width}x{image_height}")]
    MaskDimensionMismatch {
        mask_width: u32,
        mask_height: u32,
        image_width: u32,
        image_height: u32,
    },

    /// General Gemini API error.
    #[error("Gemini API error: {0}")]
    GeminiApi(String),

    /// Rate limited by the Gemini API.
    #[error("Rate limited by Gemini API, please retry later")]
    RateLimited,

    /// No API key was configured, so the remote call cannot be made.
    #[error("GEMINI_API_KEY is not set; Gemini API calls will fail")]
    MissingCredential,

    /// The model answered without any inline image part.
    #[error("No image data found in the API response")]
    NoImageInResponse,

    /// Bulk export was requested but nothing succeeded.
    #[error("No successful images to download")]
    NoSuccessfulOutcomes,

    /// Single export was requested for an outcome without an image.
    #[error("Outcome for {0} has no image to export")]
    OutcomeNotExportable(String),

    /// Writing the zip archive failed.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`AppError`] used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid configuration. Non-fatal at startup.
    Configuration,
    /// Bad input detected before any remote call is issued.
    Validation,
    /// A single remote generation request failed.
    RemoteCall,
    /// Packaging results for download failed.
    Export,
    /// Local filesystem or serialization failure.
    Io,
}

impl AppError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an image processing error with the given message.
    pub fn image(msg: impl Into<String>) -> Self {
        Self::ImageProcessing(msg.into())
    }

    /// Creates a Gemini API error with the given message.
    pub fn gemini(msg: impl Into<String>) -> Self {
        Self::GeminiApi(msg.into())
    }

    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::MissingCredential => ErrorKind::Configuration,
            Self::UnsupportedFormat(_)
            | Self::ImageProcessing(_)
            | Self::EmptyImage { .. }
            | Self::UnknownStyle(_)
            | Self::MissingSourceImage
            | Self::MaskNotReady
            | Self::MaskDimensionMismatch { .. } => ErrorKind::Validation,
            Self::GeminiApi(_) | Self::RateLimited | Self::NoImageInResponse => {
                ErrorKind::RemoteCall
            }
            Self::NoSuccessfulOutcomes | Self::OutcomeNotExportable(_) | Self::Archive(_) => {
                ErrorKind::Export
            }
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
