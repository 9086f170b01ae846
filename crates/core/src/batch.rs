//! Batch orchestration of per-style generation requests.
//!
//! A run issues one request per catalog style without waiting for earlier
//! ones, and handles settle events as they arrive. All requests are polled
//! from the caller's task through a [`FuturesUnordered`], so settle handling
//! is never concurrent with itself.
//!
//! # Run identity
//!
//! Every run gets a fresh [`RunId`]. The shared gallery only accepts settle
//! events tagged with the id of the active run; starting a new run or
//! uploading a new image bumps the id, so late answers from an older run are
//! dropped instead of leaking into the newer one.
//!
//! # Ordering
//!
//! Settle order is whatever the network produces. The gallery is re-sorted by
//! catalog position after every settle event, so slots never move around.

use crate::error::{AppError, Result};
use crate::generation::{GenerationAdapter, GenerationInput};
use crate::image_processing::{ImagePayload, SourceImage};
use crate::mask::EditMask;
use crate::styles::{StyleCatalog, StyleDescriptor};
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Identifier of one generation run. `0` means no run has started.
pub type RunId = u64;

pub const LABEL_INITIALIZING: &str = "Initializing...";
pub const LABEL_COMPLETE: &str = "Generation complete!";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Settled result of one style request. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationOutcome {
    pub style_id: String,
    #[serde(skip)]
    pub image: Option<ImagePayload>,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationOutcome {
    pub fn success(style_id: impl Into<String>, image: ImagePayload) -> Self {
        Self {
            style_id: style_id.into(),
            image: Some(image),
            status: OutcomeStatus::Success,
            error: None,
        }
    }

    pub fn failure(style_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            style_id: style_id.into(),
            image: None,
            status: OutcomeStatus::Failure,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success && self.image.is_some()
    }
}

/// Progress of the active run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    pub running: bool,
    pub completed: usize,
    pub total: usize,
    pub label: String,
}

/// What a display surface shows: progress plus outcomes in catalog order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GallerySnapshot {
    pub run_id: RunId,
    pub progress: RunProgress,
    pub outcomes: Vec<GenerationOutcome>,
}

/// Display state of one catalog position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Pending,
    Ready,
    Failed,
}

/// One gallery position, bound to its style whether or not it has settled.
#[derive(Clone, Copy, Debug)]
pub struct GallerySlot<'a> {
    pub style: &'a StyleDescriptor,
    pub outcome: Option<&'a GenerationOutcome>,
}

impl GallerySlot<'_> {
    pub fn state(&self) -> SlotState {
        match self.outcome {
            None => SlotState::Pending,
            Some(outcome) if outcome.is_success() => SlotState::Ready,
            Some(_) => SlotState::Failed,
        }
    }
}

impl GallerySnapshot {
    pub fn outcome(&self, style_id: &str) -> Option<&GenerationOutcome> {
        self.outcomes.iter().find(|o| o.style_id == style_id)
    }

    /// One slot per catalog entry, in catalog order.
    pub fn slots<'a>(&'a self, catalog: &'a StyleCatalog) -> Vec<GallerySlot<'a>> {
        catalog
            .iter()
            .map(|style| GallerySlot {
                style,
                outcome: self.outcome(&style.id),
            })
            .collect()
    }

    /// Whether "download all" has anything to package.
    pub fn has_successful(&self) -> bool {
        self.outcomes.iter().any(GenerationOutcome::is_success)
    }
}

/// A settle event as observed by the run that issued the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SettleEvent {
    pub style_id: String,
    pub status: OutcomeStatus,
    /// Completed count of the run after this event.
    pub completed: usize,
}

/// Everything a finished run produced.
#[derive(Clone, Debug, Serialize)]
pub struct BatchResult {
    pub run_id: RunId,
    /// One outcome per style, in catalog order.
    pub outcomes: Vec<GenerationOutcome>,
    /// Settle events in arrival order.
    pub settle_order: Vec<SettleEvent>,
    /// True if a newer run or upload replaced this one before it finished.
    pub superseded: bool,
}

impl BatchResult {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }
}

/// Drives generation runs and owns the shared gallery state.
pub struct BatchOrchestrator {
    adapter: GenerationAdapter,
    next_run: AtomicU64,
    gallery: watch::Sender<GallerySnapshot>,
}

impl BatchOrchestrator {
    pub fn new(adapter: GenerationAdapter) -> Self {
        let (gallery, _) = watch::channel(GallerySnapshot::default());
        Self {
            adapter,
            next_run: AtomicU64::new(0),
            gallery,
        }
    }

    pub fn adapter(&self) -> &GenerationAdapter {
        &self.adapter
    }

    /// Receiver of gallery snapshots; only the latest value is kept.
    pub fn subscribe(&self) -> watch::Receiver<GallerySnapshot> {
        self.gallery.subscribe()
    }

    pub fn snapshot(&self) -> GallerySnapshot {
        self.gallery.borrow().clone()
    }

    /// Gallery changes as a stream. Ends when the orchestrator is dropped.
    pub fn progress_stream(&self) -> impl Stream<Item = GallerySnapshot> + Send + use<> {
        futures::stream::unfold(self.gallery.subscribe(), |mut rx| async move {
            rx.changed().await.ok()?;
            let snapshot = rx.borrow_and_update().clone();
            Some((snapshot, rx))
        })
    }

    /// Supersedes any in-flight run and clears the gallery.
    pub fn invalidate(&self) {
        let run_id = self.next_run.fetch_add(1, Ordering::SeqCst) + 1;
        self.gallery.send_replace(GallerySnapshot {
            run_id,
            ..GallerySnapshot::default()
        });
    }

    /// Runs one request per style in `catalog` and waits until all settle.
    ///
    /// # Errors
    ///
    /// Fails before any request is issued if the source image or mask is
    /// missing, the mask is empty or mis-sized, or a style is unknown to the
    /// adapter. Remote failures never surface here; they become
    /// [`OutcomeStatus::Failure`] outcomes.
    pub async fn run_batch(
        &self,
        source: Option<&SourceImage>,
        mask: Option<&EditMask>,
        catalog: &StyleCatalog,
        seed: Option<i64>,
    ) -> Result<BatchResult> {
        let source = source.ok_or(AppError::MissingSourceImage)?;
        let mask = mask.ok_or(AppError::MaskNotReady)?;
        for style in catalog.iter() {
            self.adapter.catalog().resolve(&style.id)?;
        }
        let input = GenerationInput::capture(source, mask)?;

        let run_id = self.begin_run(catalog.len());
        log::info!(
            "Run {}: generating {} styles (seed: {:?})",
            run_id,
            catalog.len(),
            seed
        );

        let input = &input;
        let mut pending: FuturesUnordered<_> = catalog
            .iter()
            .map(move |style| async move {
                log::debug!("Run {}: dispatching {}", run_id, style.id);
                self.dispatched(run_id, &style.id);
                let result = self.adapter.request_variant(input, &style.id, seed).await;
                (style, result)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(catalog.len());
        let mut settle_order = Vec::with_capacity(catalog.len());

        while let Some((style, result)) = pending.next().await {
            let outcome = match result {
                Ok(image) => GenerationOutcome::success(&style.id, image),
                Err(e) => {
                    log::warn!("Run {}: failed to generate {}: {}", run_id, style.id, e);
                    GenerationOutcome::failure(&style.id, e.to_string())
                }
            };

            self.settle(run_id, catalog, &outcome);
            settle_order.push(SettleEvent {
                style_id: style.id.clone(),
                status: outcome.status,
                completed: outcomes.len() + 1,
            });
            outcomes.push(outcome);
        }

        catalog.sort_by_style(&mut outcomes, |o| o.style_id.as_str());
        let superseded = !self.finish(run_id);

        let result = BatchResult {
            run_id,
            outcomes,
            settle_order,
            superseded,
        };
        log::info!(
            "Run {}: {} of {} styles succeeded{}",
            run_id,
            result.success_count(),
            catalog.len(),
            if superseded { " (superseded)" } else { "" }
        );
        Ok(result)
    }

    fn begin_run(&self, total: usize) -> RunId {
        let run_id = self.next_run.fetch_add(1, Ordering::SeqCst) + 1;
        self.gallery.send_replace(GallerySnapshot {
            run_id,
            progress: RunProgress {
                running: true,
                completed: 0,
                total,
                label: LABEL_INITIALIZING.to_string(),
            },
            outcomes: Vec::with_capacity(total),
        });
        run_id
    }

    /// Shows `Generating <id>...` until the first request of the run settles.
    fn dispatched(&self, run_id: RunId, style_id: &str) {
        self.gallery.send_if_modified(|gallery| {
            if gallery.run_id != run_id || gallery.progress.completed > 0 {
                return false;
            }
            gallery.progress.label = format!("Generating {}...", style_id);
            true
        });
    }

    /// Applies one settle event to the gallery if `run_id` is still active.
    fn settle(&self, run_id: RunId, catalog: &StyleCatalog, outcome: &GenerationOutcome) -> bool {
        let applied = self.gallery.send_if_modified(|gallery| {
            if gallery.run_id != run_id {
                return false;
            }
            gallery.progress.completed += 1;
            gallery.progress.label = match outcome.status {
                OutcomeStatus::Success => format!("Generated {}!", outcome.style_id),
                OutcomeStatus::Failure => format!("Error on {}", outcome.style_id),
            };
            gallery.outcomes.push(outcome.clone());
            catalog.sort_by_style(&mut gallery.outcomes, |o| o.style_id.as_str());
            true
        });

        if !applied {
            log::debug!(
                "Run {}: discarding late result for {}",
                run_id,
                outcome.style_id
            );
        }
        applied
    }

    /// Marks the run finished. Returns false if it had been superseded.
    fn finish(&self, run_id: RunId) -> bool {
        self.gallery.send_if_modified(|gallery| {
            if gallery.run_id != run_id {
                return false;
            }
            gallery.progress.running = false;
            gallery.progress.label = LABEL_COMPLETE.to_string();
            true
        })
    }
}
