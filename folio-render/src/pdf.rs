//! PDF documents rasterized through Pdfium. Text comes from Pdfium's text segments,
//! split into reference and plain tokens.

use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use folio_core::text_layer::tokenize_run;
use folio_core::{
    document_id_for_path, CancelFlag, DocumentBackend, DocumentInfo, DocumentMetadata,
    DocumentProvider, ProviderError, Rect, RenderFailure, RenderImage, RenderRequest,
    RenderedPage, TextToken,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

/// Environment variable naming an explicit Pdfium shared library.
pub const PDFIUM_LIBRARY_ENV: &str = "FOLIO_PDFIUM_LIBRARY_PATH";

pub struct PdfiumProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumProvider {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>, ProviderError> {
        let absolute = path
            .canonicalize()
            .map_err(|err| ProviderError::Unreadable(format!("{}: {err}", path.display())))?;
        let info = build_document_info(&self.pdfium, &absolute)?;
        Ok(Arc::new(PdfiumDocument::new(
            Arc::clone(&self.pdfium),
            absolute,
            info,
        )))
    }
}

struct PdfiumDocument {
    // Declared before `pdfium` so it drops first; see `open_document`.
    document: Mutex<Option<PdfDocument<'static>>>,
    cache: Mutex<Option<RenderCacheEntry>>,
    info: DocumentInfo,
    path: PathBuf,
    pdfium: Arc<Pdfium>,
}

struct RenderCacheEntry {
    page_index: usize,
    scale: f32,
    page: RenderedPage,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, path: PathBuf, info: DocumentInfo) -> Self {
        Self {
            document: Mutex::new(None),
            cache: Mutex::new(None),
            info,
            path,
            pdfium,
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>, ProviderError> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .map_err(|err| ProviderError::Unreadable(format!("{}: {err}", self.path.display())))?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`. It is stored in
        // `self.document`, which is declared before `pdfium` and therefore dropped first,
        // so the borrow never outlives the bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R, RenderFailure>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R, RenderFailure>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            *guard = Some(self.open_document()?);
        }
        match guard.as_ref() {
            Some(document) => f(document),
            None => Err(ProviderError::Backend("document handle unavailable".into()).into()),
        }
    }

    fn render_internal(
        &self,
        document: &PdfDocument<'_>,
        request: &RenderRequest,
        cancel: &CancelFlag,
    ) -> Result<RenderedPage, RenderFailure> {
        let out_of_range = || ProviderError::PageOutOfRange {
            index: request.page_index,
            page_count: self.info.page_count,
        };
        let page_index: PdfPageIndex = request
            .page_index
            .try_into()
            .map_err(|_| out_of_range())?;
        let page = document
            .pages()
            .get(page_index)
            .map_err(|_| out_of_range())?;

        let native_width = page.width().value;
        let native_height = page.height().value;

        let config = PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.1));
        let bitmap = page.render_with_config(&config).map_err(|err| {
            ProviderError::Backend(format!("failed to render page {}: {err}", request.page_index))
        })?;
        if cancel.is_cancelled() {
            return Err(RenderFailure::Cancelled);
        }
        let pixels = bitmap.as_image().to_rgba8().into_raw();
        let image = RenderImage {
            width: u32::try_from(bitmap.width()).unwrap_or_default(),
            height: u32::try_from(bitmap.height()).unwrap_or_default(),
            pixels,
        };

        let tokens = match page.text() {
            Ok(text) => page_tokens(&text, native_height),
            Err(err) => {
                warn!(
                    ?err,
                    page = request.page_index,
                    path = %self.path.display(),
                    "failed to extract page text"
                );
                Vec::new()
            }
        };

        Ok(RenderedPage {
            image,
            native_width,
            native_height,
            tokens,
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    #[instrument(skip(self, cancel))]
    fn render_page(
        &self,
        request: &RenderRequest,
        cancel: &CancelFlag,
    ) -> Result<RenderedPage, RenderFailure> {
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.as_ref() {
                if entry.page_index == request.page_index
                    && (entry.scale - request.scale).abs() < f32::EPSILON
                {
                    debug!("serving page from render cache");
                    return Ok(entry.page.clone());
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(RenderFailure::Cancelled);
        }
        let page = self.with_document(|document| self.render_internal(document, request, cancel))?;

        *self.cache.lock() = Some(RenderCacheEntry {
            page_index: request.page_index,
            scale: request.scale,
            page: page.clone(),
        });

        Ok(page)
    }
}

/// Converts Pdfium's bottom-left page coordinates into top-left content-native boxes.
fn page_tokens(text: &PdfPageText<'_>, page_height: f32) -> Vec<TextToken> {
    let mut tokens = Vec::new();
    for segment in text.segments().iter() {
        let bounds = segment.bounds();
        let left = bounds.left().value;
        let top = bounds.top().value;
        let rect = Rect::new(
            left,
            page_height - top,
            bounds.right().value - left,
            top - bounds.bottom().value,
        );
        tokens.extend(tokenize_run(&segment.text(), rect));
    }
    tokens
}

fn build_document_info(pdfium: &Pdfium, path: &Path) -> Result<DocumentInfo, ProviderError> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|err| ProviderError::Unreadable(format!("{}: {err}", path.display())))?;
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    let metadata = document.metadata();

    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|tag| tag.value().to_owned());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|tag| tag.value().to_owned());

    Ok(DocumentInfo {
        id: document_id_for_path(path),
        path: path.to_path_buf(),
        page_count,
        metadata: DocumentMetadata { title, author },
    })
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    match std::env::var(PDFIUM_LIBRARY_ENV) {
        Ok(path) if !path.is_empty() => match Pdfium::bind_to_library(&path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!("failed to load Pdfium from {}={}: {}", PDFIUM_LIBRARY_ENV, path, err);
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; install it or set {} ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}
