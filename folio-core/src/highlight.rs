//! Quote lookup over the synchronized text layer.
//!
//! Matching is containment within a single span. A quote that straddles two
//! adjacent spans is reported as not found.

use crate::geometry::{ContainerGeometry, Size};
use crate::text_layer::{PositionedSpan, TextLayer};

#[derive(Debug, Clone, PartialEq)]
pub struct LocateResult {
    pub found: bool,
    pub span: Option<PositionedSpan>,
}

impl LocateResult {
    pub fn miss() -> Self {
        Self {
            found: false,
            span: None,
        }
    }
}

/// Trims and collapses internal whitespace runs to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Index of the first span, in document order, whose text contains `quote`.
/// Only the quote is normalised; span text is matched as extracted.
pub fn find(spans: &[PositionedSpan], quote: &str) -> Option<usize> {
    let needle = normalize(quote);
    if needle.is_empty() {
        return None;
    }
    spans
        .iter()
        .position(|span| span.text.contains(&needle))
}

/// Highlights the first span containing `quote` and scrolls it to the centre of
/// the viewport. `content` is the scrollable extent in container space.
pub fn locate(
    layer: &mut TextLayer,
    container: &mut ContainerGeometry,
    content: Size,
    quote: &str,
) -> LocateResult {
    let Some(index) = find(layer.spans(), quote) else {
        return LocateResult::miss();
    };
    layer.set_highlight(Some(index));
    let span = layer.spans()[index].clone();
    container.scroll = container.centered_on(&span.rect, content);
    LocateResult {
        found: true,
        span: Some(span),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Rect, ViewportTransform};
    use crate::text_layer::TextToken;

    fn layer_with(texts: &[&str]) -> TextLayer {
        let tokens: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| TextToken::new(*text, Rect::new(0.0, i as f32 * 100.0, 200.0, 12.0)))
            .collect();
        let mut layer = TextLayer::new();
        layer.rebuild(&tokens, &ViewportTransform::default(), false);
        layer
    }

    #[test]
    fn exact_quote_is_found_and_highlighted() {
        let mut layer = layer_with(&["Introduction", "novel contribution", "Method"]);
        let mut container = ContainerGeometry::new(Rect::new(0.0, 0.0, 400.0, 100.0));

        let result = locate(
            &mut layer,
            &mut container,
            Size::new(400.0, 1000.0),
            "novel contribution",
        );

        assert!(result.found);
        assert_eq!(result.span.as_ref().unwrap().index, 1);
        assert_eq!(layer.highlighted().unwrap().text, "novel contribution");
        // span centre is at y = 106, viewport height 100
        assert_eq!(container.scroll, Point::new(0.0, 56.0));
    }

    #[test]
    fn missing_quote_reports_not_found_and_keeps_state() {
        let mut layer = layer_with(&["novel contribution"]);
        layer.set_highlight(Some(0));
        let mut container = ContainerGeometry::new(Rect::new(0.0, 0.0, 400.0, 100.0));

        let result = locate(
            &mut layer,
            &mut container,
            Size::new(400.0, 1000.0),
            "nonexistent phrase",
        );

        assert!(!result.found);
        assert!(result.span.is_none());
        assert_eq!(layer.highlighted().unwrap().index, 0);
        assert_eq!(container.scroll, Point::ORIGIN);
    }

    #[test]
    fn quote_whitespace_is_normalized() {
        let layer = layer_with(&["a novel contribution here"]);
        assert_eq!(find(layer.spans(), "  novel \n contribution "), Some(0));
    }

    #[test]
    fn span_whitespace_is_matched_as_extracted() {
        let layer = layer_with(&["a novel  contribution here", "novel contribution"]);
        assert_eq!(find(layer.spans(), "novel contribution"), Some(1));
    }

    #[test]
    fn new_match_replaces_previous_highlight() {
        let mut layer = layer_with(&["first passage", "second passage"]);
        let mut container = ContainerGeometry::new(Rect::new(0.0, 0.0, 400.0, 100.0));
        let content = Size::new(400.0, 1000.0);

        locate(&mut layer, &mut container, content, "first");
        locate(&mut layer, &mut container, content, "second");

        assert_eq!(layer.highlighted().unwrap().index, 1);
    }

    #[test]
    fn quote_split_across_spans_is_not_found() {
        let layer = layer_with(&["novel", "contribution"]);
        assert_eq!(find(layer.spans(), "novel contribution"), None);
    }

    #[test]
    fn empty_quote_never_matches() {
        let layer = layer_with(&["anything"]);
        assert_eq!(find(layer.spans(), "   "), None);
    }
}
