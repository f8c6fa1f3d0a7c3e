//! Fake document backend for unit tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;

use parking_lot::Mutex;

use crate::error::{ProviderError, RenderFailure};
use crate::{
    CancelFlag, DocumentBackend, DocumentInfo, DocumentMetadata, RenderImage, RenderRequest,
    RenderedPage, TextToken,
};

pub(crate) struct FakeBackend {
    info: DocumentInfo,
    native: (f32, f32),
    tokens: Vec<TextToken>,
    failing: Vec<usize>,
    panicking: Vec<usize>,
    gates: Mutex<HashMap<u32, mpsc::Receiver<()>>>,
    seen: Mutex<Vec<CancelFlag>>,
}

impl FakeBackend {
    pub(crate) fn new(page_count: usize, native_width: f32, native_height: f32) -> Self {
        Self {
            info: DocumentInfo {
                id: uuid::Uuid::nil(),
                path: PathBuf::from("/tmp/fake.pdf"),
                page_count,
                metadata: DocumentMetadata::default(),
            },
            native: (native_width, native_height),
            tokens: Vec::new(),
            failing: Vec::new(),
            panicking: Vec::new(),
            gates: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_tokens(mut self, tokens: Vec<TextToken>) -> Self {
        self.tokens = tokens;
        self
    }

    pub(crate) fn failing_on(mut self, page: usize) -> Self {
        self.failing.push(page);
        self
    }

    pub(crate) fn panicking_on(mut self, page: usize) -> Self {
        self.panicking.push(page);
        self
    }

    /// Holds renders at `scale` until the returned sender fires.
    pub(crate) fn gate(&self, scale: f32) -> mpsc::Sender<()> {
        let (sender, receiver) = mpsc::channel();
        self.gates.lock().insert(scale_key(scale), receiver);
        sender
    }

    pub(crate) fn seen_cancel_flags(&self) -> Vec<CancelFlag> {
        self.seen.lock().clone()
    }
}

fn scale_key(scale: f32) -> u32 {
    (scale * 1000.0).round() as u32
}

impl DocumentBackend for FakeBackend {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn render_page(
        &self,
        request: &RenderRequest,
        cancel: &CancelFlag,
    ) -> Result<RenderedPage, RenderFailure> {
        self.seen.lock().push(cancel.clone());
        let gate = self.gates.lock().remove(&scale_key(request.scale));
        if let Some(gate) = gate {
            let _ = gate.recv();
        }

        if self.panicking.contains(&request.page_index) {
            panic!("rasterizer exploded");
        }
        if self.failing.contains(&request.page_index) {
            return Err(ProviderError::Unsupported(format!(
                "page {} uses an unknown filter",
                request.page_index
            ))
            .into());
        }
        if request.page_index >= self.info.page_count {
            return Err(ProviderError::PageOutOfRange {
                index: request.page_index,
                page_count: self.info.page_count,
            }
            .into());
        }

        let width = (self.native.0 * request.scale).round().max(1.0) as u32;
        let height = (self.native.1 * request.scale).round().max(1.0) as u32;
        Ok(RenderedPage {
            image: RenderImage {
                width,
                height,
                pixels: vec![request.page_index as u8; width as usize * height as usize * 4],
            },
            native_width: self.native.0,
            native_height: self.native.1,
            tokens: self.tokens.clone(),
        })
    }
}
