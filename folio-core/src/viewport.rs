//! The viewport controller owns page, scale, theme and interaction mode, and keeps
//! the render pipeline, the text layer and the overlay surface consistent with the
//! raster that is actually on screen.
//!
//! Pointer input only ever reads the last installed frame. Renders replace that
//! frame in one step when their completion is drained (`pump`, `wait`,
//! `settle_current`, `settle`), so the two never interleave.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::assist::{quoted_passages, CompletionRequest};
use crate::config::ViewerConfig;
use crate::error::ProviderError;
use crate::geometry::{ContainerGeometry, Point, Rect, Size, ViewportTransform};
use crate::highlight::{self, LocateResult};
use crate::overlay::{
    Annotation, AnnotationId, AnnotationSet, InteractionMode, MaskStroke, OverlaySurface,
    PointerRelease, SelectionRegion,
};
use crate::scheduler::{Accepted, RenderCompletion, RenderScheduler};
use crate::text_layer::{TextLayer, TextToken};
use crate::theme::{self as theming, StyleDescriptor, Theme};
use crate::{
    DocumentBackend, DocumentInfo, EventQueue, Page, RenderImage, RenderRequest, RenderToken,
    RenderedPage, ViewerEvent,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    ScaleBy { factor: f32 },
    SetScale { scale: f32 },
    ResetScale,
    SetTheme { theme: Theme },
    CycleTheme,
    SetMode { mode: InteractionMode },
    ClearMask,
    ClearSelection,
    Retry,
    ScrollBy { dx: f32, dy: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
}

/// Pointer input in client space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    pub position: Point,
}

impl PointerEvent {
    pub fn down(position: Point) -> Self {
        Self {
            phase: PointerPhase::Down,
            position,
        }
    }

    pub fn moved(position: Point) -> Self {
        Self {
            phase: PointerPhase::Move,
            position,
        }
    }

    pub fn up(position: Point) -> Self {
        Self {
            phase: PointerPhase::Up,
            position,
        }
    }
}

/// Everything the export compositor needs from the live view.
#[derive(Debug, Clone)]
pub struct ExportSnapshot {
    pub page: Page,
    pub image: Arc<RenderImage>,
    pub annotations: Vec<Annotation>,
    pub strokes: Vec<MaskStroke>,
}

struct InstalledFrame {
    page: Page,
    image: Arc<RenderImage>,
    tokens: Vec<TextToken>,
}

pub struct ViewportController {
    backend: Arc<dyn DocumentBackend>,
    config: ViewerConfig,
    scheduler: RenderScheduler,
    page_index: usize,
    scale: f32,
    theme: Theme,
    style: StyleDescriptor,
    frame: Option<InstalledFrame>,
    error: Option<ProviderError>,
    container: ContainerGeometry,
    raster_origin: Point,
    text_layer: TextLayer,
    surface: OverlaySurface,
    annotations: AnnotationSet,
    events: EventQueue,
}

impl ViewportController {
    pub fn new(backend: Arc<dyn DocumentBackend>, config: ViewerConfig) -> Self {
        let scheduler = RenderScheduler::new(Arc::clone(&backend));
        let surface = OverlaySurface::new(&config);
        let theme = Theme::default();
        let style = theming::apply(theme, &config);
        let scale = config.clamp_scale(1.0);
        Self {
            backend,
            config,
            scheduler,
            page_index: 0,
            scale,
            theme,
            style,
            frame: None,
            error: None,
            container: ContainerGeometry::default(),
            raster_origin: Point::ORIGIN,
            text_layer: TextLayer::new(),
            surface,
            annotations: AnnotationSet::default(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn info(&self) -> &DocumentInfo {
        self.backend.info()
    }

    pub fn page_count(&self) -> usize {
        self.backend.info().page_count
    }

    /// Jumps to `page_index` (clamped) and requests its render.
    pub fn open_at(&mut self, page_index: usize) -> RenderToken {
        self.page_index = page_index.min(self.page_count().saturating_sub(1));
        self.refresh()
    }

    /// Requests a render of the current page, scale and theme.
    pub fn refresh(&mut self) -> RenderToken {
        let request = RenderRequest {
            page_index: self.page_index,
            scale: self.scale,
            theme: self.theme,
        };
        self.scheduler.submit(request)
    }

    /// Applies a viewer command. Returns whether anything visible changed.
    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::NextPage { count } => self.go_to(self.page_index.saturating_add(count)),
            Command::PrevPage { count } => self.go_to(self.page_index.saturating_sub(count)),
            Command::GotoPage { page } => self.go_to(page),
            Command::ScaleBy { factor } => self.rescale(self.scale * factor),
            Command::SetScale { scale } => self.rescale(scale),
            Command::ResetScale => self.rescale(1.0),
            Command::SetTheme { theme } => self.set_theme(theme),
            Command::CycleTheme => self.set_theme(self.theme.next()),
            Command::SetMode { mode } => self.surface.set_mode(mode),
            Command::ClearMask => {
                let cleared = self.surface.clear_mask();
                self.flush_mask_update();
                cleared
            }
            Command::ClearSelection => {
                let had_selection = self.surface.selection().is_some();
                self.surface.clear_selection();
                had_selection
            }
            Command::Retry => {
                self.refresh();
                true
            }
            Command::ScrollBy { dx, dy } => {
                let before = self.container.scroll;
                self.container.scroll = Point::new(before.x + dx, before.y + dy);
                self.container.clamp_scroll(self.content_extent());
                self.container.scroll != before
            }
        }
    }

    fn go_to(&mut self, page: usize) -> bool {
        let page_count = self.page_count();
        if page_count == 0 {
            return false;
        }
        let target = page.min(page_count - 1);
        if target == self.page_index {
            return false;
        }
        debug!(from = self.page_index, to = target, "changing page");
        self.page_index = target;
        self.refresh();
        true
    }

    fn rescale(&mut self, scale: f32) -> bool {
        let scale = self.config.clamp_scale(scale);
        if (scale - self.scale).abs() <= f32::EPSILON {
            return false;
        }
        debug!(from = self.scale, to = scale, "changing scale");
        self.scale = scale;
        self.refresh();
        true
    }

    fn set_theme(&mut self, theme: Theme) -> bool {
        if theme == self.theme {
            return false;
        }
        self.theme = theme;
        self.style = theming::apply(theme, &self.config);
        true
    }

    /// Installs every render that has already finished. Never blocks.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        while let Some(completion) = self.scheduler.try_next() {
            changed |= self.handle(completion);
        }
        changed
    }

    /// Waits for one completion and handles it. `None` when nothing is in flight.
    pub async fn wait(&mut self) -> Option<bool> {
        let completion = self.scheduler.next().await?;
        Some(self.handle(completion))
    }

    /// Waits until the most recent request has been installed or has failed.
    pub async fn settle_current(&mut self) {
        while self.scheduler.is_current_pending() {
            if self.wait().await.is_none() {
                break;
            }
        }
    }

    /// Drains every outstanding render, stale ones included.
    pub async fn settle(&mut self) {
        while self.wait().await.is_some() {}
    }

    fn handle(&mut self, completion: RenderCompletion) -> bool {
        match self.scheduler.accept(completion) {
            Accepted::Install {
                token,
                request,
                page,
            } => {
                self.install(token, request, page);
                true
            }
            Accepted::Failed { error, .. } => {
                self.events
                    .lock()
                    .push(ViewerEvent::RenderError(error.to_string()));
                self.error = Some(error);
                true
            }
            Accepted::Discarded => false,
        }
    }

    #[instrument(level = "debug", skip(self, rendered))]
    fn install(&mut self, token: RenderToken, request: RenderRequest, rendered: RenderedPage) {
        let RenderedPage {
            image,
            native_width,
            native_height,
            tokens,
        } = rendered;
        let page = Page {
            index: request.page_index,
            native_width,
            native_height,
            scale: request.scale,
            render_token: token,
        };
        let page_changed = self
            .frame
            .as_ref()
            .map_or(true, |frame| frame.page.index != page.index);

        let display = Size::new(image.width as f32, image.height as f32);
        self.surface
            .install_raster((image.width, image.height), display, page_changed);
        self.frame = Some(InstalledFrame {
            page,
            image: Arc::new(image),
            tokens,
        });
        self.error = None;
        self.sync_text_layer(false);
        if page_changed {
            self.container.scroll = Point::ORIGIN;
        }
        self.container.clamp_scroll(self.content_extent());
        info!(
            page = page.index,
            scale = page.scale,
            spans = self.text_layer.spans().len(),
            "installed render"
        );
    }

    fn sync_text_layer(&mut self, keep_highlight: bool) {
        let transform = self.transform();
        match &self.frame {
            Some(frame) => self
                .text_layer
                .rebuild(&frame.tokens, &transform, keep_highlight),
            None => self.text_layer.clear(),
        }
    }

    /// On-screen pixels per content-native pixel, following the observed raster size.
    pub fn display_scale(&self) -> f32 {
        let display = self.surface.display_size();
        match &self.frame {
            Some(frame) if frame.page.native_width > 0.0 && !display.is_empty() => {
                display.width / frame.page.native_width
            }
            Some(frame) => frame.page.scale,
            None => self.scale,
        }
    }

    pub fn transform(&self) -> ViewportTransform {
        ViewportTransform::new(self.raster_origin, self.display_scale())
    }

    /// Scrollable extent in container space.
    pub fn content_extent(&self) -> Size {
        let display = self.surface.display_size();
        Size::new(
            self.raster_origin.x + display.width,
            self.raster_origin.y + display.height,
        )
    }

    /// Feeds one pointer event. Ignored until a frame is installed.
    pub fn pointer(&mut self, event: PointerEvent) {
        if self.frame.is_none() {
            return;
        }
        let point = self.container.client_to_container(event.position);
        match event.phase {
            PointerPhase::Down => {
                let transform = self.transform();
                self.surface.pointer_down(point, transform);
            }
            PointerPhase::Move => self.surface.pointer_move(point),
            PointerPhase::Up => {
                let release = self.surface.pointer_up(point);
                self.on_release(release);
            }
        }
    }

    fn on_release(&mut self, release: PointerRelease) {
        match release {
            PointerRelease::Nothing => {}
            PointerRelease::MaskUpdated => self.flush_mask_update(),
            PointerRelease::RegionSelected(region) => {
                self.events.lock().push(ViewerEvent::RegionSelected(region));
            }
            PointerRelease::TextDrag { area, end, click } => {
                if click {
                    let reference = self
                        .text_layer
                        .span_at(end)
                        .and_then(|span| span.reference_text())
                        .map(str::to_owned);
                    if let Some(text) = reference {
                        debug!(%text, "reference clicked");
                        self.events
                            .lock()
                            .push(ViewerEvent::ReferenceRequested(text));
                    }
                    return;
                }

                let mut text = String::new();
                let mut anchor: Option<Rect> = None;
                for span in self.text_layer.spans_within(&area) {
                    let piece = span.text.trim();
                    if piece.is_empty() {
                        continue;
                    }
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(piece);
                    anchor = Some(anchor.map_or(span.rect, |rect| rect.union(&span.rect)));
                }
                if let Some(anchor) = anchor {
                    self.finish_native_selection(&text, anchor);
                }
            }
        }
    }

    fn flush_mask_update(&mut self) {
        if self.surface.take_mask_updated() {
            self.events.lock().push(ViewerEvent::MaskUpdated);
        }
    }

    /// Reports a finished text selection. `anchor` is in container space. Returns
    /// whether the selection was long enough to be announced.
    pub fn finish_native_selection(&mut self, text: &str, anchor: Rect) -> bool {
        let trimmed = text.trim();
        if trimmed.chars().count() <= self.config.min_text_selection_chars {
            return false;
        }
        self.events.lock().push(ViewerEvent::TextSelected {
            text: trimmed.to_string(),
            anchor,
        });
        true
    }

    /// Follows the raster's observed on-screen size.
    pub fn observe_raster_size(&mut self, size: Size) -> bool {
        if !self.surface.resize(size) {
            return false;
        }
        self.sync_text_layer(true);
        self.container.clamp_scroll(self.content_extent());
        true
    }

    pub fn observe_container(&mut self, bounds: Rect) {
        self.container.bounds = bounds;
        self.container.clamp_scroll(self.content_extent());
    }

    /// Places the raster's top-left corner inside the container.
    pub fn set_raster_origin(&mut self, origin: Point) {
        if origin == self.raster_origin {
            return;
        }
        self.raster_origin = origin;
        self.sync_text_layer(true);
        self.container.clamp_scroll(self.content_extent());
    }

    /// Highlights the first span containing `quote` and centres it.
    pub fn locate(&mut self, quote: &str) -> LocateResult {
        let extent = self.content_extent();
        let result = highlight::locate(&mut self.text_layer, &mut self.container, extent, quote);
        if !result.found {
            debug!(quote, "passage not found in text layer");
            self.events.lock().push(ViewerEvent::HighlightNotFound);
        }
        result
    }

    /// Focuses the first quoted passage of a completion answer that occurs on the page.
    pub fn focus_answer(&mut self, answer: &str) -> LocateResult {
        let passage = quoted_passages(answer, self.config.min_quote_chars)
            .into_iter()
            .find(|passage| highlight::find(self.text_layer.spans(), passage).is_some());
        match passage {
            Some(passage) => self.locate(&passage),
            None => {
                self.events.lock().push(ViewerEvent::HighlightNotFound);
                LocateResult::miss()
            }
        }
    }

    /// Pins a note at a client-space point. Ignored off the page or before the first frame.
    pub fn add_annotation(&mut self, client: Point, text: impl Into<String>) -> Option<AnnotationId> {
        let native = self.frame.as_ref()?.page.native_size();
        let content = self.container.client_to_content(client, &self.transform());
        self.annotations.add(content, native, text)
    }

    pub fn remove_annotation(&mut self, id: AnnotationId) -> bool {
        self.annotations.remove(id)
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.annotations.as_slice()
    }

    /// Client-space positions of every annotation pin on the current frame.
    pub fn annotation_pins(&self) -> Vec<(AnnotationId, Point)> {
        let Some(frame) = &self.frame else {
            return Vec::new();
        };
        let native = frame.page.native_size();
        let transform = self.transform();
        self.annotations
            .as_slice()
            .iter()
            .map(|annotation| {
                let content = annotation.content_position(native);
                (
                    annotation.id,
                    self.container.content_to_client(content, &transform),
                )
            })
            .collect()
    }

    /// Drops annotations, strokes, selection, highlight and the error state.
    pub fn reset_session(&mut self) {
        self.annotations.clear();
        self.surface.cancel_gesture();
        self.surface.clear_selection();
        self.surface.clear_mask();
        self.flush_mask_update();
        self.text_layer.set_highlight(None);
        self.error = None;
    }

    /// Installed raster pixels under `region` (content-native).
    pub fn region_image(&self, region: &SelectionRegion) -> Option<RenderImage> {
        let frame = self.frame.as_ref()?;
        let cropped = frame.image.crop(&region.rect().scaled(frame.page.scale));
        (!cropped.is_empty()).then_some(cropped)
    }

    /// Completion request for the committed box selection, if any.
    pub fn region_request(&self) -> Option<CompletionRequest> {
        let region = self.surface.selection()?;
        let image = self.region_image(&region)?;
        Some(CompletionRequest::Region {
            page_index: self.frame.as_ref()?.page.index,
            region,
            image,
        })
    }

    pub fn snapshot(&self) -> Option<ExportSnapshot> {
        let frame = self.frame.as_ref()?;
        Some(ExportSnapshot {
            page: frame.page,
            image: Arc::clone(&frame.image),
            annotations: self.annotations.as_slice().to_vec(),
            strokes: self.surface.strokes().to_vec(),
        })
    }

    /// Installed raster with the theme filter applied.
    pub fn presented_image(&self) -> Option<RenderImage> {
        let frame = self.frame.as_ref()?;
        Some(self.style.present(&frame.image))
    }

    pub fn page(&self) -> Option<&Page> {
        self.frame.as_ref().map(|frame| &frame.page)
    }

    pub fn image(&self) -> Option<Arc<RenderImage>> {
        self.frame.as_ref().map(|frame| Arc::clone(&frame.image))
    }

    /// Requested page; may be ahead of the installed one while a render is in flight.
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn style(&self) -> &StyleDescriptor {
        &self.style
    }

    pub fn mode(&self) -> InteractionMode {
        self.surface.mode()
    }

    pub fn error(&self) -> Option<&ProviderError> {
        self.error.as_ref()
    }

    pub fn is_rendering(&self) -> bool {
        self.scheduler.is_current_pending()
    }

    pub fn text_layer(&self) -> &TextLayer {
        &self.text_layer
    }

    pub fn surface(&self) -> &OverlaySurface {
        &self.surface
    }

    pub fn container(&self) -> &ContainerGeometry {
        &self.container
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn events(&self) -> EventQueue {
        Arc::clone(&self.events)
    }

    pub fn drain_events(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}
