//! Composites the live frame for hosts that draw pixels themselves: the themed
//! raster with highlight, selection, strokes and annotation pins burned in.

use anyhow::Result;
use folio_core::{Point, Rect, RenderImage, ViewportController};

use crate::draw::{self, palette};

/// Presentation frame for the installed page, or `None` before the first render.
pub fn frame(controller: &ViewportController) -> Result<Option<RenderImage>> {
    let (Some(page), Some(base)) = (controller.page().copied(), controller.presented_image())
    else {
        return Ok(None);
    };
    let mut canvas = draw::to_canvas(&base)?;
    let transform = controller.transform();
    let to_raster = |content: Point| (content.x * page.scale, content.y * page.scale);
    let raster_rect = |content: Rect| {
        let rect = content.scaled(page.scale);
        (
            rect.x.floor() as i64,
            rect.y.floor() as i64,
            rect.right().ceil() as i64,
            rect.bottom().ceil() as i64,
        )
    };

    if let Some(span) = controller.text_layer().highlighted() {
        let (x0, y0, x1, y1) = raster_rect(transform.rect_to_content(&span.rect));
        draw::fill_rect(&mut canvas, x0, y0, x1, y1, palette::HIGHLIGHT);
    }

    let surface = controller.surface();
    if let Some(region) = surface.selection() {
        let (x0, y0, x1, y1) = raster_rect(region.rect());
        draw::rect_outline(&mut canvas, x0, y0, x1, y1, 2, palette::SELECTION);
    }
    if let Some(preview) = surface.preview_rect() {
        let (x0, y0, x1, y1) = raster_rect(transform.rect_to_content(&preview));
        draw::fill_rect(&mut canvas, x0, y0, x1, y1, palette::SELECTION_FILL);
        draw::rect_outline(&mut canvas, x0, y0, x1, y1, 1, palette::SELECTION);
    }

    for stroke in surface.strokes().iter().chain(surface.pending_stroke()) {
        let points: Vec<_> = stroke.points.iter().map(|point| to_raster(*point)).collect();
        draw::polyline(&mut canvas, &points, stroke.width * page.scale, palette::MASK);
    }

    let native = page.native_size();
    for (index, annotation) in controller.annotations().iter().enumerate() {
        let (x, y) = to_raster(annotation.content_position(native));
        draw::disc(&mut canvas, x, y, 6.0, palette::PIN);
        let label = (index + 1).to_string();
        let (width, height) = draw::text_size(&label, 1);
        draw::text(
            &mut canvas,
            x as i64 - i64::from(width / 2),
            y as i64 - i64::from(height / 2),
            &label,
            1,
            palette::CALLOUT_TEXT,
        );
    }

    Ok(Some(draw::from_canvas(canvas)))
}
