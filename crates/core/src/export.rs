//! Result export.
//!
//! Bulk export packages every successful outcome into one zip archive named
//! `time-travel-photos.zip`, one `{style}.png` entry per success. Failed
//! outcomes are skipped. Single export hands back one file, no packaging.

use crate::batch::GenerationOutcome;
use crate::error::{AppError, Result};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const ARCHIVE_FILE_NAME: &str = "time-travel-photos.zip";

/// A named blob ready to be saved or offered for download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ExportedFile {
    /// Writes the file into `dir` and returns the full path.
    pub fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Packaged results of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Archive {
    /// Entry names in the order they were written.
    pub entries: Vec<String>,
    pub file: ExportedFile,
}

/// Entry name of a style inside the archive.
pub fn entry_name(style_id: &str) -> String {
    format!("{}.png", style_id)
}

/// Packages every successful outcome into a zip archive.
///
/// All images are decoded before the archive is started, so a bad payload
/// never leaves a half-written archive behind.
///
/// # Errors
///
/// - [`AppError::NoSuccessfulOutcomes`] if nothing succeeded
/// - [`AppError::ImageProcessing`] if a stored payload cannot be decoded
/// - [`AppError::Archive`] if writing the zip fails
pub fn export_successful(outcomes: &[GenerationOutcome]) -> Result<Archive> {
    let files = outcomes
        .iter()
        .filter_map(|outcome| {
            let image = outcome.image.as_ref().filter(|_| outcome.is_success())?;
            Some(image.decode().map(|bytes| (entry_name(&outcome.style_id), bytes)))
        })
        .collect::<Result<Vec<_>>>()?;

    if files.is_empty() {
        return Err(AppError::NoSuccessfulOutcomes);
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = Vec::with_capacity(files.len());
    for (name, bytes) in files {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&bytes)?;
        entries.push(name);
    }

    let bytes = zip.finish()?.into_inner();
    log::info!("Packaged {} images into {}", entries.len(), ARCHIVE_FILE_NAME);

    Ok(Archive {
        entries,
        file: ExportedFile {
            file_name: ARCHIVE_FILE_NAME.to_string(),
            bytes,
        },
    })
}

/// Exports one successful outcome as `{style}-look.png`.
///
/// # Errors
///
/// Returns [`AppError::OutcomeNotExportable`] for a failed outcome.
pub fn export_single(outcome: &GenerationOutcome) -> Result<ExportedFile> {
    let image = outcome
        .image
        .as_ref()
        .filter(|_| outcome.is_success())
        .ok_or_else(|| AppError::OutcomeNotExportable(outcome.style_id.clone()))?;

    Ok(ExportedFile {
        file_name: format!("{}-look.png", outcome.style_id),
        bytes: image.decode()?,
    })
}
