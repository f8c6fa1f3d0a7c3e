use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod assist;
pub mod config;
pub mod error;
pub mod geometry;
pub mod highlight;
pub mod overlay;
pub mod scheduler;
pub mod text_layer;
pub mod theme;
pub mod viewport;

#[cfg(test)]
pub(crate) mod testing;

pub use assist::{CompletionRequest, CompletionService};
pub use config::ViewerConfig;
pub use error::{ConfigError, ProviderError, RenderFailure};
pub use geometry::{ContainerGeometry, Point, Rect, Size, ViewportTransform};
pub use highlight::LocateResult;
pub use overlay::{Annotation, AnnotationId, InteractionMode, MaskStroke, SelectionRegion};
pub use scheduler::{Accepted, RenderCompletion, RenderScheduler};
pub use text_layer::{PositionedSpan, ReferenceKind, TextLayer, TextToken};
pub use theme::{StyleDescriptor, Theme};
pub use viewport::{Command, ExportSnapshot, PointerEvent, PointerPhase, ViewportController};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0c6c2e-5b8a-5d1e-9a47-2c71e0d4b6a9").expect("valid namespace UUID")
});

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&*DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

/// Identifies one submitted render. Tokens only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RenderToken(pub u64);

impl RenderToken {
    pub fn next(self) -> Self {
        RenderToken(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
    pub theme: Theme,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page_index: 0,
            scale: 1.0,
            theme: Theme::Light,
        }
    }
}

/// RGBA8 raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Copies the pixels under `rect` (raster pixels), clamped to the image.
    pub fn crop(&self, rect: &Rect) -> RenderImage {
        if self.is_empty() {
            return RenderImage {
                width: 0,
                height: 0,
                pixels: Vec::new(),
            };
        }

        let origin_x = (rect.x.max(0.0).floor() as u32).min(self.width - 1);
        let origin_y = (rect.y.max(0.0).floor() as u32).min(self.height - 1);
        let width = (rect.width.ceil().max(1.0) as u32).min(self.width - origin_x);
        let height = (rect.height.ceil().max(1.0) as u32).min(self.height - origin_y);

        let stride = self.width as usize * 4;
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for row in 0..height {
            let start = (origin_y + row) as usize * stride + origin_x as usize * 4;
            let end = start + width as usize * 4;
            pixels.extend_from_slice(&self.pixels[start..end]);
        }

        RenderImage {
            width,
            height,
            pixels,
        }
    }
}

/// What a backend hands back for one page: raster plus positioned text.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: RenderImage,
    /// Page size at scale 1.0, in content-native pixels.
    pub native_width: f32,
    pub native_height: f32,
    pub tokens: Vec<TextToken>,
}

/// An installed page. Replaced, never mutated, when page or scale changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page {
    pub index: usize,
    pub native_width: f32,
    pub native_height: f32,
    pub scale: f32,
    pub render_token: RenderToken,
}

impl Page {
    pub fn native_size(&self) -> Size {
        Size::new(self.native_width, self.native_height)
    }
}

/// Cooperative cancellation shared between the scheduler and a running render.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Viewer notifications for the host UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    ReferenceRequested(String),
    TextSelected { text: String, anchor: Rect },
    RegionSelected(SelectionRegion),
    MaskUpdated,
    RenderError(String),
    HighlightNotFound,
}

pub type EventQueue = Arc<Mutex<Vec<ViewerEvent>>>;

pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    /// Rasterizes one page. Implementations may poll `cancel` and bail out with
    /// [`RenderFailure::Cancelled`].
    fn render_page(
        &self,
        request: &RenderRequest,
        cancel: &CancelFlag,
    ) -> Result<RenderedPage, RenderFailure>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn document_id_is_stable_for_same_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.png");
        std::fs::write(&file_path, b"dummy").unwrap();

        let first = document_id_for_path(&file_path);
        let second = document_id_for_path(&file_path);

        assert_eq!(first, second);
    }

    #[test]
    fn crop_is_clamped_to_image_bounds() {
        let image = RenderImage {
            width: 4,
            height: 2,
            pixels: (0..32).collect(),
        };

        let cropped = image.crop(&Rect::new(2.0, 1.0, 10.0, 10.0));

        assert_eq!(cropped.width, 2);
        assert_eq!(cropped.height, 1);
        assert_eq!(cropped.pixels, (24..32).collect::<Vec<u8>>());
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
    }
}
