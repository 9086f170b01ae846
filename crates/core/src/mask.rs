//! Editable-region masks.
//!
//! A mask has the same size as the source image and classifies each pixel
//! as [`Brush::Editable`] (white) or [`Brush::Locked`] (black). The model is
//! told to change only white pixels.
//!
//! # Coverage rule
//!
//! Shapes cover a pixel when the pixel's centre lies inside the shape, the
//! same rule a canvas fill uses without antialiasing. The auto mask always
//! locks at least one pixel per shape, so tiny images still get protection.
//!
//! # Editing
//!
//! Manual edits run through [`StrokeState::apply`], a pure transition over
//! pointer events. [`MaskEditor`] wraps it and publishes a fresh snapshot to
//! observers on stroke end and after every one-shot operation.

use crate::error::{AppError, Result};
use crate::image_processing::{ImagePayload, ImageProcessor, MIME_PNG};
use image::{DynamicImage, GrayImage, Luma};
use std::f64::consts::FRAC_1_SQRT_2;
use std::sync::Arc;
use tokio::sync::watch;

/// Default manual brush diameter in pixels.
pub const DEFAULT_BRUSH_SIZE: f32 = 30.0;

const EDITABLE_LUMA: u8 = 255;
const LOCKED_LUMA: u8 = 0;

/// Classification painted into the mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Brush {
    /// White: the model may repaint these pixels.
    Editable,
    /// Black: identity pixels that must stay untouched.
    Locked,
}

impl Brush {
    fn luma(self) -> Luma<u8> {
        match self {
            Brush::Editable => Luma([EDITABLE_LUMA]),
            Brush::Locked => Luma([LOCKED_LUMA]),
        }
    }

    fn from_luma(value: u8) -> Self {
        if value >= 128 {
            Brush::Editable
        } else {
            Brush::Locked
        }
    }
}

/// A point in mask pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Maps a pointer position on a scaled display surface into mask pixels.
    ///
    /// `display_origin` and `display_size` describe where the mask is drawn
    /// on screen; the mask itself keeps the image's natural size.
    pub fn from_display(
        pointer: (f32, f32),
        display_origin: (f32, f32),
        display_size: (f32, f32),
        mask_size: (u32, u32),
    ) -> Option<Self> {
        if display_size.0 <= 0.0 || display_size.1 <= 0.0 {
            return None;
        }
        Some(Self {
            x: (pointer.0 - display_origin.0) / display_size.0 * mask_size.0 as f32,
            y: (pointer.1 - display_origin.1) / display_size.1 * mask_size.1 as f32,
        })
    }
}

/// Same-size binary classification of an image's pixels.
///
/// A 0x0 mask is "not ready": generation refuses to start with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditMask {
    pixels: GrayImage,
}

impl EditMask {
    /// The not-ready mask.
    pub fn empty() -> Self {
        Self {
            pixels: GrayImage::new(0, 0),
        }
    }

    /// A mask with every pixel set to `brush`.
    pub fn filled(width: u32, height: u32, brush: Brush) -> Self {
        Self {
            pixels: GrayImage::from_pixel(width, height, brush.luma()),
        }
    }

    /// Reads a mask image, thresholding any grey levels at mid-grey.
    pub fn from_png_bytes(bytes: &[u8]) -> Result<Self> {
        let mut pixels = ImageProcessor::decode(bytes)?.to_luma8();
        for pixel in pixels.pixels_mut() {
            *pixel = Brush::from_luma(pixel[0]).luma();
        }
        Ok(Self { pixels })
    }

    pub fn is_ready(&self) -> bool {
        self.pixels.width() > 0 && self.pixels.height() > 0
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Classification at `(x, y)`, or `None` outside the mask.
    pub fn get(&self, x: u32, y: u32) -> Option<Brush> {
        self.pixels
            .get_pixel_checked(x, y)
            .map(|pixel| Brush::from_luma(pixel[0]))
    }

    pub fn count(&self, brush: Brush) -> usize {
        let target = brush.luma();
        self.pixels.pixels().filter(|p| **p == target).count()
    }

    pub fn fill_all(&mut self, brush: Brush) {
        let value = brush.luma();
        for pixel in self.pixels.pixels_mut() {
            *pixel = value;
        }
    }

    /// Paints a round-capped line of diameter `brush_size` from `from` to `to`.
    ///
    /// `from == to` paints a single dot.
    pub fn paint_stroke(&mut self, from: Point, to: Point, brush: Brush, brush_size: f32) {
        if !self.is_ready() {
            return;
        }
        // Never thinner than the pixel containing the pointer.
        let radius = (f64::from(brush_size) / 2.0).max(FRAC_1_SQRT_2);
        let (ax, ay) = (f64::from(from.x), f64::from(from.y));
        let (bx, by) = (f64::from(to.x), f64::from(to.y));

        let (w, h) = self.dimensions();
        let x0 = clamp_index(ax.min(bx) - radius, w);
        let x1 = clamp_index(ax.max(bx) + radius, w);
        let y0 = clamp_index(ay.min(by) - radius, h);
        let y1 = clamp_index(ay.max(by) + radius, h);

        let value = brush.luma();
        for y in y0..=y1 {
            for x in x0..=x1 {
                let px = f64::from(x) + 0.5;
                let py = f64::from(y) + 0.5;
                if distance_to_segment(px, py, ax, ay, bx, by) <= radius {
                    self.pixels.put_pixel(x, y, value);
                }
            }
        }
    }

    /// Encodes as an 8-bit greyscale PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        if !self.is_ready() {
            return Err(AppError::MaskNotReady);
        }
        ImageProcessor::encode_png(&DynamicImage::ImageLuma8(self.pixels.clone()))
    }

    /// PNG payload for the API. Encoding here is what freezes the snapshot.
    pub fn to_payload(&self) -> Result<ImagePayload> {
        let bytes = self.encode_png()?;
        Ok(ImagePayload::from_bytes(MIME_PNG, &bytes))
    }

    fn fill_ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, brush: Brush) {
        let (w, h) = self.dimensions();
        let value = brush.luma();
        for y in 0..h {
            let dy = (f64::from(y) + 0.5 - cy) / ry;
            if dy.abs() > 1.0 {
                continue;
            }
            let half = rx * (1.0 - dy * dy).sqrt();
            let start = (cx - half - 0.5).ceil().max(0.0);
            let end = (cx + half - 0.5).floor().min(f64::from(w) - 1.0);
            if start > end {
                continue;
            }
            for x in start as u32..=end as u32 {
                self.pixels.put_pixel(x, y, value);
            }
        }
        let centre_x = clamp_index(cx, w);
        let centre_y = clamp_index(cy, h);
        self.pixels.put_pixel(centre_x, centre_y, value);
    }

    fn fill_rect(&mut self, left: f64, top: f64, width: f64, height: f64, brush: Brush) {
        let (w, h) = self.dimensions();
        let (x0, x1) = covered_span(left, left + width, w);
        let (y0, y1) = covered_span(top, top + height, h);
        let value = brush.luma();
        for y in y0..y1 {
            for x in x0..x1 {
                self.pixels.put_pixel(x, y, value);
            }
        }
    }
}

impl Default for EditMask {
    fn default() -> Self {
        Self::empty()
    }
}

/// Builds the default mask for an upright, centred, medium-shot portrait.
///
/// Everything is editable except a face ellipse centred at
/// `(w/2, h/2.8)` with radii `(w/5, h/4)` and a torso rectangle at
/// `(0.25w, 0.45h)` sized `(0.5w, 0.55h)`. Zero-sized input yields the
/// empty mask.
pub fn build_auto_mask(width: u32, height: u32) -> EditMask {
    if width == 0 || height == 0 {
        return EditMask::empty();
    }
    let mut mask = EditMask::filled(width, height, Brush::Editable);
    let w = f64::from(width);
    let h = f64::from(height);

    mask.fill_ellipse(w / 2.0, h / 2.8, w / 5.0, h / 4.0, Brush::Locked);
    mask.fill_rect(w * 0.25, h * 0.45, w * 0.5, h * 0.55, Brush::Locked);
    mask
}

fn clamp_index(value: f64, len: u32) -> u32 {
    let max = f64::from(len.saturating_sub(1));
    value.floor().clamp(0.0, max) as u32
}

/// Pixel indices whose centres fall in `[start, end)`, never empty.
fn covered_span(start: f64, end: f64, len: u32) -> (u32, u32) {
    let first = (start - 0.5).ceil().clamp(0.0, f64::from(len - 1)) as u32;
    let last = ((end - 0.5).ceil().clamp(0.0, f64::from(len)) as u32).max(first + 1);
    (first, last)
}

fn distance_to_segment(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let (dx, dy) = (bx - ax, by - ay);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq == 0.0 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / length_sq).clamp(0.0, 1.0)
    };
    let (nx, ny) = (ax + t * dx, ay + t * dy);
    ((px - nx).powi(2) + (py - ny).powi(2)).sqrt()
}

/// Brush colour and diameter used for manual strokes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushSettings {
    pub brush: Brush,
    pub size: f32,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            brush: Brush::Editable,
            size: DEFAULT_BRUSH_SIZE,
        }
    }
}

/// Pointer input from the painting surface, already in mask coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StrokeEvent {
    Start(Point),
    Move(Point),
    End,
}

/// Whether a stroke is in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum StrokeState {
    #[default]
    Idle,
    Drawing { last: Point },
}

impl StrokeState {
    /// Applies one pointer event to `mask` and returns the next state.
    ///
    /// The boolean is true when a stroke just finished and observers should
    /// receive a new snapshot.
    pub fn apply(self, mask: &mut EditMask, event: StrokeEvent, settings: BrushSettings) -> (Self, bool) {
        match (self, event) {
            (_, StrokeEvent::Start(point)) => {
                mask.paint_stroke(point, point, settings.brush, settings.size);
                (StrokeState::Drawing { last: point }, false)
            }
            (StrokeState::Drawing { last }, StrokeEvent::Move(point)) => {
                mask.paint_stroke(last, point, settings.brush, settings.size);
                (StrokeState::Drawing { last: point }, false)
            }
            (StrokeState::Idle, StrokeEvent::Move(_)) => (StrokeState::Idle, false),
            (StrokeState::Drawing { .. }, StrokeEvent::End) => (StrokeState::Idle, true),
            (StrokeState::Idle, StrokeEvent::End) => (StrokeState::Idle, false),
        }
    }
}

/// Mask editing session for the current upload.
///
/// Observers subscribe to committed snapshots; a stroke in progress is not
/// visible to them until it ends.
pub struct MaskEditor {
    mask: EditMask,
    stroke: StrokeState,
    settings: BrushSettings,
    published: watch::Sender<Arc<EditMask>>,
}

impl MaskEditor {
    /// Creates an editor with the empty (not ready) mask.
    pub fn new() -> Self {
        let (published, _) = watch::channel(Arc::new(EditMask::empty()));
        Self {
            mask: EditMask::empty(),
            stroke: StrokeState::Idle,
            settings: BrushSettings::default(),
            published,
        }
    }

    /// Resizes for a new upload and applies the auto mask, or clears the
    /// mask when `dimensions` is `None`.
    pub fn reset(&mut self, dimensions: Option<(u32, u32)>) {
        self.stroke = StrokeState::Idle;
        self.mask = match dimensions {
            Some((width, height)) => build_auto_mask(width, height),
            None => EditMask::empty(),
        };
        self.publish();
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<EditMask>> {
        self.published.subscribe()
    }

    /// Last committed mask.
    pub fn snapshot(&self) -> Arc<EditMask> {
        self.published.borrow().clone()
    }

    /// Working mask, including any stroke in progress.
    pub fn mask(&self) -> &EditMask {
        &self.mask
    }

    pub fn stroke_state(&self) -> StrokeState {
        self.stroke
    }

    pub fn brush(&self) -> BrushSettings {
        self.settings
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.settings.brush = brush;
    }

    pub fn set_brush_size(&mut self, size: f32) {
        self.settings.size = size.max(1.0);
    }

    pub fn handle(&mut self, event: StrokeEvent) {
        let (next, committed) = self.stroke.apply(&mut self.mask, event, self.settings);
        self.stroke = next;
        if committed {
            self.publish();
        }
    }

    /// Makes every pixel editable.
    pub fn fill_all(&mut self) {
        self.stroke = StrokeState::Idle;
        self.mask.fill_all(Brush::Editable);
        self.publish();
    }

    /// Discards manual edits and rebuilds the auto mask.
    pub fn reapply_auto(&mut self) {
        self.stroke = StrokeState::Idle;
        let (width, height) = self.mask.dimensions();
        self.mask = build_auto_mask(width, height);
        self.publish();
    }

    /// Replaces the mask wholesale, e.g. with one loaded from disk.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MaskDimensionMismatch`] if the size differs from
    /// the current mask.
    pub fn replace(&mut self, mask: EditMask) -> Result<()> {
        let (width, height) = self.mask.dimensions();
        if mask.dimensions() != (width, height) {
            return Err(AppError::MaskDimensionMismatch {
                mask_width: mask.width(),
                mask_height: mask.height(),
                image_width: width,
                image_height: height,
            });
        }
        self.stroke = StrokeState::Idle;
        self.mask = mask;
        self.publish();
        Ok(())
    }

    fn publish(&self) {
        self.published.send_replace(Arc::new(self.mask.clone()));
    }
}

impl Default for MaskEditor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZES: &[(u32, u32)] = &[
        (1, 1),
        (2, 2),
        (1, 500),
        (500, 1),
        (3, 7),
        (64, 64),
        (640, 480),
        (480, 640),
        (1023, 769),
    ];

    #[test]
    fn auto_mask_matches_requested_size_and_locks_both_regions() {
        for &(w, h) in SIZES {
            let mask = build_auto_mask(w, h);
            assert_eq!(mask.dimensions(), (w, h), "size for {}x{}", w, h);
            assert!(mask.count(Brush::Locked) > 0, "locked pixels for {}x{}", w, h);

            // Pixel containing the face centre.
            let fx = ((w as f64) / 2.0).floor().min((w - 1) as f64) as u32;
            let fy = ((h as f64) / 2.8).floor().min((h - 1) as f64) as u32;
            assert_eq!(mask.get(fx, fy), Some(Brush::Locked), "face for {}x{}", w, h);

            // The face never reaches the bottom row, so this is the torso.
            let torso_in_bottom_row = (0..w).any(|x| mask.get(x, h - 1) == Some(Brush::Locked));
            assert!(torso_in_bottom_row, "torso for {}x{}", w, h);
        }
    }

    #[test]
    fn auto_mask_keeps_hair_and_background_editable() {
        let mask = build_auto_mask(400, 600);
        assert_eq!(mask.get(0, 0), Some(Brush::Editable));
        assert_eq!(mask.get(399, 0), Some(Brush::Editable));
        assert_eq!(mask.get(10, 599), Some(Brush::Editable));
        assert_eq!(mask.get(389, 599), Some(Brush::Editable));
        // Top of the head sits above the face ellipse.
        assert_eq!(mask.get(200, 10), Some(Brush::Editable));
        // Face: centre (200, 214.3), radii (80, 150).
        assert_eq!(mask.get(200, 214), Some(Brush::Locked));
        assert_eq!(mask.get(275, 214), Some(Brush::Locked));
        assert_eq!(mask.get(285, 214), Some(Brush::Editable));
        // Torso: x in [100, 300), y from 270.
        assert_eq!(mask.get(100, 400), Some(Brush::Locked));
        assert_eq!(mask.get(299, 400), Some(Brush::Locked));
        assert_eq!(mask.get(99, 400), Some(Brush::Editable));
        assert_eq!(mask.get(300, 400), Some(Brush::Editable));
    }

    #[test]
    fn auto_mask_is_idempotent() {
        let first = build_auto_mask(317, 211);
        let second = build_auto_mask(317, 211);
        assert_eq!(first, second);
    }

    #[test]
    fn zero_sized_input_yields_empty_mask() {
        assert!(!build_auto_mask(0, 100).is_ready());
        assert!(!build_auto_mask(100, 0).is_ready());
        assert!(matches!(EditMask::empty().encode_png(), Err(AppError::MaskNotReady)));
    }

    #[test]
    fn dot_stroke_paints_a_disc() {
        let mut mask = EditMask::filled(50, 50, Brush::Editable);
        let centre = Point::new(25.0, 25.0);
        mask.paint_stroke(centre, centre, Brush::Locked, 10.0);
        assert_eq!(mask.get(25, 25), Some(Brush::Locked));
        assert_eq!(mask.get(21, 25), Some(Brush::Locked));
        assert_eq!(mask.get(25, 32), Some(Brush::Editable));
        assert_eq!(mask.get(29, 29), Some(Brush::Editable));
    }

    #[test]
    fn line_stroke_has_round_caps() {
        let mut mask = EditMask::filled(100, 40, Brush::Locked);
        mask.paint_stroke(Point::new(20.0, 20.0), Point::new(80.0, 20.0), Brush::Editable, 8.0);
        assert_eq!(mask.get(50, 20), Some(Brush::Editable));
        assert_eq!(mask.get(50, 23), Some(Brush::Editable));
        assert_eq!(mask.get(50, 26), Some(Brush::Locked));
        // Cap extends past the endpoint by the radius.
        assert_eq!(mask.get(83, 20), Some(Brush::Editable));
        assert_eq!(mask.get(86, 20), Some(Brush::Locked));
    }

    #[test]
    fn strokes_outside_the_canvas_are_clipped() {
        let mut mask = EditMask::filled(10, 10, Brush::Editable);
        mask.paint_stroke(Point::new(-50.0, -50.0), Point::new(-40.0, -40.0), Brush::Locked, 4.0);
        assert_eq!(mask.count(Brush::Locked), 0);
        mask.paint_stroke(Point::new(-5.0, 5.0), Point::new(15.0, 5.0), Brush::Locked, 2.0);
        assert_eq!(mask.get(0, 5), Some(Brush::Locked));
        assert_eq!(mask.get(9, 5), Some(Brush::Locked));
    }

    #[test]
    fn stroke_transitions_commit_only_on_end() {
        let mut mask = EditMask::filled(20, 20, Brush::Locked);
        let settings = BrushSettings { brush: Brush::Editable, size: 2.0 };

        let (state, commit) = StrokeState::Idle.apply(&mut mask, StrokeEvent::Move(Point::new(5.0, 5.0)), settings);
        assert_eq!(state, StrokeState::Idle);
        assert!(!commit);
        assert_eq!(mask.count(Brush::Editable), 0);

        let (state, commit) = state.apply(&mut mask, StrokeEvent::Start(Point::new(2.5, 2.5)), settings);
        assert!(!commit);
        assert_eq!(mask.get(2, 2), Some(Brush::Editable));

        let (state, commit) = state.apply(&mut mask, StrokeEvent::Move(Point::new(12.5, 2.5)), settings);
        assert!(!commit);
        assert_eq!(state, StrokeState::Drawing { last: Point::new(12.5, 2.5) });
        assert_eq!(mask.get(7, 2), Some(Brush::Editable));

        let (state, commit) = state.apply(&mut mask, StrokeEvent::End, settings);
        assert_eq!(state, StrokeState::Idle);
        assert!(commit);
    }

    #[test]
    fn editor_publishes_on_stroke_end_and_one_shot_operations() {
        let mut editor = MaskEditor::new();
        let mut rx = editor.subscribe();
        assert!(!rx.borrow_and_update().is_ready());

        editor.reset(Some((40, 40)));
        assert!(rx.has_changed().expect("sender alive"));
        let auto = rx.borrow_and_update().clone();
        assert_eq!(*auto, build_auto_mask(40, 40));

        editor.set_brush(Brush::Editable);
        editor.set_brush_size(6.0);
        editor.handle(StrokeEvent::Start(Point::new(20.0, 15.0)));
        editor.handle(StrokeEvent::Move(Point::new(20.0, 30.0)));
        assert!(!rx.has_changed().expect("sender alive"));
        assert_eq!(*editor.snapshot(), build_auto_mask(40, 40));

        editor.handle(StrokeEvent::End);
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(rx.borrow_and_update().get(20, 20), Some(Brush::Editable));

        editor.fill_all();
        assert_eq!(rx.borrow_and_update().count(Brush::Locked), 0);

        editor.reapply_auto();
        assert_eq!(*rx.borrow_and_update().clone(), build_auto_mask(40, 40));
    }

    #[test]
    fn replacing_with_a_different_size_is_rejected() {
        let mut editor = MaskEditor::new();
        editor.reset(Some((10, 10)));
        let result = editor.replace(EditMask::filled(10, 11, Brush::Editable));
        assert!(matches!(result, Err(AppError::MaskDimensionMismatch { .. })));
        editor
            .replace(EditMask::filled(10, 10, Brush::Editable))
            .expect("same size");
        assert_eq!(editor.snapshot().count(Brush::Locked), 0);
    }

    #[test]
    fn png_round_trip_preserves_classification() {
        let mask = build_auto_mask(32, 48);
        let bytes = mask.encode_png().expect("encode");
        assert_eq!(EditMask::from_png_bytes(&bytes).expect("decode"), mask);
    }

    #[test]
    fn display_points_scale_to_mask_pixels() {
        let point = Point::from_display((150.0, 75.0), (50.0, 25.0), (200.0, 100.0), (800, 400))
            .expect("point");
        assert_eq!(point, Point::new(400.0, 200.0));
        assert!(Point::from_display((0.0, 0.0), (0.0, 0.0), (0.0, 10.0), (10, 10)).is_none());
    }
}
