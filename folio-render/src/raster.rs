//! Single-page documents backed by a raster image file (PNG, JPEG).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use folio_core::{
    document_id_for_path, CancelFlag, DocumentBackend, DocumentInfo, DocumentMetadata,
    DocumentProvider, ProviderError, RenderFailure, RenderImage, RenderRequest, RenderedPage,
};
use image::imageops::FilterType;
use image::{ImageError, RgbaImage};
use parking_lot::Mutex;
use tracing::{debug, instrument};

#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDocumentProvider;

impl ImageDocumentProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentProvider for ImageDocumentProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>, ProviderError> {
        let absolute = path
            .canonicalize()
            .map_err(|err| ProviderError::Unreadable(format!("{}: {err}", path.display())))?;
        let source = image::open(&absolute)
            .map_err(|err| match err {
                ImageError::Unsupported(inner) => ProviderError::Unsupported(inner.to_string()),
                other => ProviderError::Unreadable(other.to_string()),
            })?
            .to_rgba8();
        debug!(
            path = %absolute.display(),
            width = source.width(),
            height = source.height(),
            "opened raster document"
        );
        Ok(Arc::new(ImageDocument::new(absolute, source)))
    }
}

struct ImageDocument {
    info: DocumentInfo,
    source: RgbaImage,
    cache: Mutex<Option<RenderCacheEntry>>,
}

struct RenderCacheEntry {
    scale: f32,
    image: RenderImage,
}

impl ImageDocument {
    fn new(path: PathBuf, source: RgbaImage) -> Self {
        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
        Self {
            info: DocumentInfo {
                id: document_id_for_path(&path),
                path,
                page_count: 1,
                metadata: DocumentMetadata {
                    title,
                    author: None,
                },
            },
            source,
            cache: Mutex::new(None),
        }
    }

    fn rasterize(&self, scale: f32) -> RenderImage {
        let width = ((self.source.width() as f32 * scale).round() as u32).max(1);
        let height = ((self.source.height() as f32 * scale).round() as u32).max(1);
        let resized = if (width, height) == self.source.dimensions() {
            self.source.clone()
        } else {
            image::imageops::resize(&self.source, width, height, FilterType::Triangle)
        };
        RenderImage {
            width,
            height,
            pixels: resized.into_raw(),
        }
    }
}

impl DocumentBackend for ImageDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    #[instrument(skip(self, cancel))]
    fn render_page(
        &self,
        request: &RenderRequest,
        cancel: &CancelFlag,
    ) -> Result<RenderedPage, RenderFailure> {
        if request.page_index != 0 {
            return Err(ProviderError::PageOutOfRange {
                index: request.page_index,
                page_count: 1,
            }
            .into());
        }

        let cached = self
            .cache
            .lock()
            .as_ref()
            .filter(|entry| (entry.scale - request.scale).abs() < f32::EPSILON)
            .map(|entry| entry.image.clone());
        let image = match cached {
            Some(image) => image,
            None => {
                if cancel.is_cancelled() {
                    return Err(RenderFailure::Cancelled);
                }
                let image = self.rasterize(request.scale.max(0.01));
                *self.cache.lock() = Some(RenderCacheEntry {
                    scale: request.scale,
                    image: image.clone(),
                });
                image
            }
        };

        Ok(RenderedPage {
            image,
            native_width: self.source.width() as f32,
            native_height: self.source.height() as f32,
            tokens: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::tempdir;

    fn sample_png(dir: &Path) -> PathBuf {
        let path = dir.join("figure.png");
        RgbaImage::from_pixel(40, 20, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn opens_png_as_single_page_document() {
        let dir = tempdir().unwrap();
        let backend = ImageDocumentProvider::new()
            .open(&sample_png(dir.path()))
            .await
            .unwrap();

        assert_eq!(backend.info().page_count, 1);
        assert_eq!(backend.info().metadata.title.as_deref(), Some("figure"));

        let request = RenderRequest {
            scale: 0.5,
            ..RenderRequest::default()
        };
        let page = backend.render_page(&request, &CancelFlag::new()).unwrap();
        assert_eq!((page.image.width, page.image.height), (20, 10));
        assert_eq!((page.native_width, page.native_height), (40.0, 20.0));
        assert!(page.tokens.is_empty());
    }

    #[tokio::test]
    async fn rejects_pages_past_the_first_and_honours_cancellation() {
        let dir = tempdir().unwrap();
        let backend = ImageDocumentProvider::new()
            .open(&sample_png(dir.path()))
            .await
            .unwrap();

        let beyond = RenderRequest {
            page_index: 1,
            ..RenderRequest::default()
        };
        assert_eq!(
            backend.render_page(&beyond, &CancelFlag::new()).unwrap_err(),
            RenderFailure::Provider(ProviderError::PageOutOfRange {
                index: 1,
                page_count: 1
            })
        );

        let cancel = CancelFlag::new();
        cancel.cancel();
        let request = RenderRequest {
            scale: 2.0,
            ..RenderRequest::default()
        };
        assert_eq!(
            backend.render_page(&request, &cancel).unwrap_err(),
            RenderFailure::Cancelled
        );
    }

    #[tokio::test]
    async fn garbage_file_is_reported_as_provider_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let result = ImageDocumentProvider::new().open(&path).await;
        assert!(result.is_err());

        let missing = ImageDocumentProvider::new()
            .open(&dir.path().join("absent.png"))
            .await;
        assert!(matches!(missing, Err(ProviderError::Unreadable(_))));
    }
}
