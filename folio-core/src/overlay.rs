//! Pointer-driven overlay: mask strokes, box selection, text-drag capture and
//! pinned annotations.
//!
//! Resize policy: a change of the observed display size cancels the gesture in
//! progress (a half-drawn stroke or a live selection rectangle) and keeps every
//! committed stroke and annotation. Committed strokes are stored in content-native
//! pixels and annotations in normalized page fractions, so neither depends on
//! the display size. Installing a new raster drops committed strokes and the
//! committed selection.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::ViewerConfig;
use crate::geometry::{Point, Rect, Size, ViewportTransform};

pub type AnnotationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionMode {
    #[default]
    TextSelect,
    BoxSelect,
    MaskPaint,
}

impl InteractionMode {
    pub fn label(self) -> &'static str {
        match self {
            InteractionMode::TextSelect => "text",
            InteractionMode::BoxSelect => "box",
            InteractionMode::MaskPaint => "mask",
        }
    }
}

/// Freehand stroke in content-native pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStroke {
    pub points: Vec<Point>,
    pub width: f32,
}

impl MaskStroke {
    fn push(&mut self, point: Point) {
        if self.points.last() != Some(&point) {
            self.points.push(point);
        }
    }
}

/// Committed box selection in content-native pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SelectionRegion {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

impl From<Rect> for SelectionRegion {
    fn from(rect: Rect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    /// Fraction of the content width, 0..=1.
    pub normalized_x: f32,
    /// Fraction of the content height, 0..=1.
    pub normalized_y: f32,
    pub text: String,
}

impl Annotation {
    pub fn content_position(&self, native: Size) -> Point {
        Point::new(
            self.normalized_x * native.width,
            self.normalized_y * native.height,
        )
    }
}

#[derive(Debug, Default)]
pub struct AnnotationSet {
    items: Vec<Annotation>,
}

impl AnnotationSet {
    /// Pins `text` at `content` (content-native pixels). Points outside the page are
    /// rejected.
    pub fn add(&mut self, content: Point, native: Size, text: impl Into<String>) -> Option<AnnotationId> {
        if native.is_empty() {
            return None;
        }
        let normalized_x = content.x / native.width;
        let normalized_y = content.y / native.height;
        if !(0.0..=1.0).contains(&normalized_x) || !(0.0..=1.0).contains(&normalized_y) {
            return None;
        }
        let id = Uuid::new_v4();
        self.items.push(Annotation {
            id,
            normalized_x,
            normalized_y,
            text: text.into(),
        });
        Some(id)
    }

    pub fn remove(&mut self, id: AnnotationId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn as_slice(&self) -> &[Annotation] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Gesture {
    Idle,
    Stroke {
        stroke: MaskStroke,
        transform: ViewportTransform,
    },
    Box {
        start: Point,
        current: Point,
        transform: ViewportTransform,
    },
    Text {
        start: Point,
        current: Point,
    },
}

/// Result of releasing the pointer.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerRelease {
    Nothing,
    MaskUpdated,
    RegionSelected(SelectionRegion),
    /// A text-select drag; `area` is in container space. `click` is set when the
    /// pointer barely moved.
    TextDrag { area: Rect, end: Point, click: bool },
}

#[derive(Debug)]
pub struct OverlaySurface {
    mode: InteractionMode,
    gesture: Gesture,
    display_size: Size,
    backing_size: (u32, u32),
    strokes: Vec<MaskStroke>,
    selection: Option<SelectionRegion>,
    mask_updated: bool,
    min_selection_px: f32,
    brush_width_px: f32,
    click_tolerance_px: f32,
}

impl OverlaySurface {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            mode: InteractionMode::default(),
            gesture: Gesture::Idle,
            display_size: Size::default(),
            backing_size: (0, 0),
            strokes: Vec::new(),
            selection: None,
            mask_updated: false,
            min_selection_px: config.min_selection_px,
            brush_width_px: config.brush_width_px,
            click_tolerance_px: config.click_tolerance_px,
        }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Switches mode, discarding the gesture in progress. Returns `false` when the
    /// mode was already active.
    pub fn set_mode(&mut self, mode: InteractionMode) -> bool {
        if self.mode == mode {
            return false;
        }
        if self.mode == InteractionMode::BoxSelect {
            self.selection = None;
        }
        self.cancel_gesture();
        self.mode = mode;
        true
    }

    pub fn cancel_gesture(&mut self) {
        if !matches!(self.gesture, Gesture::Idle) {
            debug!(mode = self.mode.label(), "discarding pending overlay gesture");
        }
        self.gesture = Gesture::Idle;
    }

    pub fn pointer_down(&mut self, point: Point, transform: ViewportTransform) {
        self.cancel_gesture();
        self.gesture = match self.mode {
            InteractionMode::MaskPaint => {
                let mut stroke = MaskStroke {
                    points: Vec::new(),
                    width: self.brush_width_px / transform.scale,
                };
                stroke.push(transform.to_content(point));
                Gesture::Stroke { stroke, transform }
            }
            InteractionMode::BoxSelect => Gesture::Box {
                start: point,
                current: point,
                transform,
            },
            InteractionMode::TextSelect => Gesture::Text {
                start: point,
                current: point,
            },
        };
    }

    pub fn pointer_move(&mut self, point: Point) {
        match &mut self.gesture {
            Gesture::Idle => {}
            Gesture::Stroke { stroke, transform } => stroke.push(transform.to_content(point)),
            Gesture::Box { current, .. } | Gesture::Text { current, .. } => *current = point,
        }
    }

    pub fn pointer_up(&mut self, point: Point) -> PointerRelease {
        self.pointer_move(point);
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Idle => PointerRelease::Nothing,
            Gesture::Stroke { stroke, .. } => {
                self.strokes.push(stroke);
                self.mask_updated = true;
                PointerRelease::MaskUpdated
            }
            Gesture::Box {
                start,
                current,
                transform,
            } => {
                let rect = Rect::from_corners(start, current);
                if rect.width >= self.min_selection_px && rect.height >= self.min_selection_px {
                    let region = SelectionRegion::from(transform.rect_to_content(&rect));
                    self.selection = Some(region);
                    PointerRelease::RegionSelected(region)
                } else {
                    debug!(width = rect.width, height = rect.height, "ignoring sub-threshold selection");
                    PointerRelease::Nothing
                }
            }
            Gesture::Text { start, current } => PointerRelease::TextDrag {
                area: Rect::from_corners(start, current),
                end: current,
                click: start.distance(current) <= self.click_tolerance_px,
            },
        }
    }

    /// Live selection rectangle in container space.
    pub fn preview_rect(&self) -> Option<Rect> {
        match &self.gesture {
            Gesture::Box { start, current, .. } => Some(Rect::from_corners(*start, *current)),
            _ => None,
        }
    }

    /// Stroke being drawn, in content-native pixels.
    pub fn pending_stroke(&self) -> Option<&MaskStroke> {
        match &self.gesture {
            Gesture::Stroke { stroke, .. } => Some(stroke),
            _ => None,
        }
    }

    pub fn strokes(&self) -> &[MaskStroke] {
        &self.strokes
    }

    pub fn selection(&self) -> Option<SelectionRegion> {
        self.selection
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn clear_mask(&mut self) -> bool {
        if self.strokes.is_empty() {
            return false;
        }
        self.strokes.clear();
        self.mask_updated = true;
        true
    }

    /// Returns and resets the "mask updated" flag.
    pub fn take_mask_updated(&mut self) -> bool {
        std::mem::take(&mut self.mask_updated)
    }

    pub fn display_size(&self) -> Size {
        self.display_size
    }

    pub fn backing_size(&self) -> (u32, u32) {
        self.backing_size
    }

    /// Follows the observed on-screen size of the raster. Returns whether it changed.
    pub fn resize(&mut self, observed: Size) -> bool {
        if self.display_size.approx_eq(observed) {
            return false;
        }
        debug!(
            from_width = self.display_size.width,
            to_width = observed.width,
            "resizing overlay surface"
        );
        self.display_size = observed;
        self.cancel_gesture();
        true
    }

    /// Adopts a freshly installed raster. A drag survives a same-page re-render and
    /// keeps mapping with the transform captured at pointer-down.
    pub fn install_raster(&mut self, backing: (u32, u32), display: Size, page_changed: bool) {
        self.backing_size = backing;
        self.display_size = display;
        self.strokes.clear();
        self.selection = None;
        if page_changed {
            self.cancel_gesture();
        }
    }
}
