//! Glue towards the completion service: what the viewer sends it and how quoted
//! passages are pulled back out of its answers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::overlay::SelectionRegion;
use crate::RenderImage;

static QUOTED_PASSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"\n]+)"|\u{201C}([^\u{201D}\n]+)\u{201D}"#).expect("valid quote pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionRequest {
    /// Selected or located text.
    Quote { text: String },
    /// A committed box selection, cropped out of the installed raster.
    Region {
        page_index: usize,
        region: SelectionRegion,
        image: RenderImage,
    },
}

impl CompletionRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            CompletionRequest::Quote { .. } => "quote",
            CompletionRequest::Region { .. } => "region",
        }
    }

    /// Plain-text context handed to the service alongside any image payload.
    pub fn context_text(&self) -> String {
        match self {
            CompletionRequest::Quote { text } => text.clone(),
            CompletionRequest::Region {
                page_index, region, ..
            } => format!(
                "page {} region x={:.0} y={:.0} w={:.0} h={:.0}",
                page_index + 1,
                region.x,
                region.y,
                region.width,
                region.height
            ),
        }
    }
}

#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    async fn ask(&self, request: CompletionRequest) -> anyhow::Result<String>;
}

/// Quoted passages of at least `min_chars` characters, in order of appearance,
/// without duplicates. Straight and curly double quotes are recognised.
pub fn quoted_passages(answer: &str, min_chars: usize) -> Vec<String> {
    let mut passages: Vec<String> = Vec::new();
    for captures in QUOTED_PASSAGE.captures_iter(answer) {
        let Some(inner) = captures.get(1).or_else(|| captures.get(2)) else {
            continue;
        };
        let passage = inner.as_str().trim();
        if passage.chars().count() < min_chars {
            continue;
        }
        if !passages.iter().any(|known| known == passage) {
            passages.push(passage.to_string());
        }
    }
    passages
}
