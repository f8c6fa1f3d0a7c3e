//! Positioned, selectable text spans laid over the displayed raster.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect, ViewportTransform};

static CITATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\d+\][.,;:]?$").expect("valid citation pattern"));

static FIGURE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:fig\.?|figure|tab\.?|table)\s*\d+[a-z]?[.,;:]?$")
        .expect("valid figure pattern")
});

static INLINE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\d+\]|\b(?i:fig\.?|figure|tab\.?|table)\s*\d+[a-z]?\b")
        .expect("valid inline reference pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Citation,
    Figure,
}

pub fn classify(text: &str) -> Option<ReferenceKind> {
    let trimmed = text.trim();
    if CITATION_PATTERN.is_match(trimmed) {
        Some(ReferenceKind::Citation)
    } else if FIGURE_PATTERN.is_match(trimmed) {
        Some(ReferenceKind::Figure)
    } else {
        None
    }
}

/// A unit of recognised text with its box in content-native pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub text: String,
    pub bbox: Rect,
    pub reference: Option<ReferenceKind>,
}

impl TextToken {
    pub fn new(text: impl Into<String>, bbox: Rect) -> Self {
        let text = text.into();
        let reference = classify(&text);
        Self {
            text,
            bbox,
            reference,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.reference.is_some()
    }
}

/// A token placed in container space.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedSpan {
    /// Position in document order.
    pub index: usize,
    pub text: String,
    pub rect: Rect,
    pub reference: Option<ReferenceKind>,
}

impl PositionedSpan {
    pub fn is_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Text emitted when a reference span is clicked.
    pub fn reference_text(&self) -> Option<&str> {
        self.reference.map(|_| self.text.trim())
    }
}

/// Splits a run of text laid out in `bbox` into tokens, cutting reference labels
/// out as tokens of their own. Boxes are apportioned by character count.
pub fn tokenize_run(text: &str, bbox: Rect) -> Vec<TextToken> {
    let total = text.chars().count();
    if total == 0 {
        return Vec::new();
    }
    let char_width = bbox.width / total as f32;

    let mut pieces = Vec::new();
    let mut cursor = 0;
    for found in INLINE_REFERENCE.find_iter(text) {
        pieces.push(cursor..found.start());
        pieces.push(found.range());
        cursor = found.end();
    }
    pieces.push(cursor..text.len());

    pieces
        .into_iter()
        .filter_map(|range| {
            let slice = &text[range.clone()];
            let trimmed = slice.trim();
            if trimmed.is_empty() {
                return None;
            }
            let leading = slice.len() - slice.trim_start().len();
            let start = text[..range.start + leading].chars().count();
            let len = trimmed.chars().count();
            Some(TextToken::new(
                trimmed,
                Rect::new(
                    bbox.x + start as f32 * char_width,
                    bbox.y,
                    len as f32 * char_width,
                    bbox.height,
                ),
            ))
        })
        .collect()
}

pub fn build(tokens: &[TextToken], transform: &ViewportTransform) -> Vec<PositionedSpan> {
    tokens
        .iter()
        .enumerate()
        .map(|(index, token)| PositionedSpan {
            index,
            text: token.text.clone(),
            rect: transform.rect_to_container(&token.bbox),
            reference: token.reference,
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct TextLayer {
    spans: Vec<PositionedSpan>,
    highlighted: Option<usize>,
}

impl TextLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every span in one step. The highlight does not survive a rebuild
    /// unless `keep_highlight` is set and the index still exists.
    pub fn rebuild(
        &mut self,
        tokens: &[TextToken],
        transform: &ViewportTransform,
        keep_highlight: bool,
    ) {
        let spans = build(tokens, transform);
        let highlighted = self
            .highlighted
            .filter(|index| keep_highlight && *index < spans.len());
        self.spans = spans;
        self.highlighted = highlighted;
    }

    pub fn clear(&mut self) {
        self.spans.clear();
        self.highlighted = None;
    }

    pub fn spans(&self) -> &[PositionedSpan] {
        &self.spans
    }

    pub fn highlighted(&self) -> Option<&PositionedSpan> {
        self.highlighted.and_then(|index| self.spans.get(index))
    }

    pub fn set_highlight(&mut self, index: Option<usize>) {
        self.highlighted = index.filter(|index| *index < self.spans.len());
    }

    /// Topmost span under `point` (container space).
    pub fn span_at(&self, point: Point) -> Option<&PositionedSpan> {
        self.spans.iter().rev().find(|span| span.rect.contains(point))
    }

    /// Spans intersecting `area` (container space), in document order.
    pub fn spans_within(&self, area: &Rect) -> impl Iterator<Item = &PositionedSpan> {
        let area = *area;
        self.spans.iter().filter(move |span| span.rect.intersects(&area))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_bracketed_integers_as_citations() {
        assert_eq!(classify("[12]"), Some(ReferenceKind::Citation));
        assert_eq!(classify("  [3], "), Some(ReferenceKind::Citation));
        assert_eq!(classify("[a]"), None);
        assert_eq!(classify("[12"), None);
    }

    #[test]
    fn classifies_figure_and_table_labels() {
        assert_eq!(classify("Fig. 3"), Some(ReferenceKind::Figure));
        assert_eq!(classify("Figure 10b"), Some(ReferenceKind::Figure));
        assert_eq!(classify("Table 2"), Some(ReferenceKind::Figure));
        assert_eq!(classify("table 2."), Some(ReferenceKind::Figure));
        assert_eq!(classify("Figures show"), None);
        assert_eq!(classify("contribution"), None);
    }

    #[test]
    fn tokenize_run_cuts_references_out_of_running_text() {
        let tokens = tokenize_run("as shown in [12] and Fig. 3.", Rect::new(0.0, 0.0, 280.0, 10.0));

        let texts: Vec<_> = tokens.iter().map(|token| token.text.as_str()).collect();
        assert_eq!(texts, vec!["as shown in", "[12]", "and", "Fig. 3", "."]);
        assert_eq!(tokens[0].bbox, Rect::new(0.0, 0.0, 110.0, 10.0));
        assert_eq!(tokens[1].reference, Some(ReferenceKind::Citation));
        assert_eq!(tokens[1].bbox, Rect::new(120.0, 0.0, 40.0, 10.0));
        assert_eq!(tokens[3].reference, Some(ReferenceKind::Figure));
        assert_eq!(tokens[3].bbox, Rect::new(210.0, 0.0, 60.0, 10.0));
        assert!(tokens[2].reference.is_none());
    }

    #[test]
    fn tokenize_run_keeps_plain_text_whole() {
        let tokens = tokenize_run("  a novel contribution ", Rect::new(0.0, 0.0, 23.0, 10.0));
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "a novel contribution");
        assert_eq!(tokens[0].bbox.x, 2.0);
        assert!(tokenize_run("", Rect::default()).is_empty());
    }

    #[test]
    fn build_scales_and_offsets_token_boxes() {
        let tokens = vec![
            TextToken::new("Results", Rect::new(10.0, 20.0, 40.0, 8.0)),
            TextToken::new("[4]", Rect::new(60.0, 20.0, 10.0, 8.0)),
        ];
        let transform = ViewportTransform::new(Point::new(5.0, 7.0), 2.0);

        let spans = build(&tokens, &transform);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].rect, Rect::new(25.0, 47.0, 80.0, 16.0));
        assert!(!spans[0].is_reference());
        assert_eq!(spans[1].index, 1);
        assert_eq!(spans[1].reference_text(), Some("[4]"));
    }

    #[test]
    fn rebuild_replaces_spans_and_drops_highlight() {
        let mut layer = TextLayer::new();
        let tokens = vec![TextToken::new("alpha", Rect::new(0.0, 0.0, 10.0, 10.0))];
        layer.rebuild(&tokens, &ViewportTransform::default(), false);
        layer.set_highlight(Some(0));
        assert!(layer.highlighted().is_some());

        layer.rebuild(&tokens, &ViewportTransform::new(Point::ORIGIN, 2.0), false);
        assert!(layer.highlighted().is_none());
        assert_eq!(layer.spans()[0].rect.width, 20.0);
    }

    #[test]
    fn hit_testing_and_area_selection_use_container_space() {
        let mut layer = TextLayer::new();
        let tokens = vec![
            TextToken::new("one", Rect::new(0.0, 0.0, 10.0, 10.0)),
            TextToken::new("two", Rect::new(20.0, 0.0, 10.0, 10.0)),
            TextToken::new("three", Rect::new(0.0, 40.0, 10.0, 10.0)),
        ];
        layer.rebuild(&tokens, &ViewportTransform::default(), false);

        assert_eq!(layer.span_at(Point::new(25.0, 5.0)).unwrap().text, "two");
        assert!(layer.span_at(Point::new(15.0, 5.0)).is_none());

        let picked: Vec<_> = layer
            .spans_within(&Rect::new(0.0, 0.0, 40.0, 12.0))
            .map(|span| span.text.as_str())
            .collect();
        assert_eq!(picked, vec!["one", "two"]);
    }
}
