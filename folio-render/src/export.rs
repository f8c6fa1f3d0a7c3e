//! Burns committed strokes and annotation callouts into a copy of the installed
//! raster and writes the result as PNG.

use std::path::Path;

use anyhow::{Context, Result};
use folio_core::ExportSnapshot;
use image::{ImageFormat, RgbaImage};
use tracing::info;

use crate::draw::{self, palette};

const MAX_LABEL_CHARS: usize = 48;
const CALLOUT_PADDING: i64 = 4;
const PIN_RADIUS: f32 = 5.0;

pub fn compose(snapshot: &ExportSnapshot) -> Result<RgbaImage> {
    let mut canvas = draw::to_canvas(&snapshot.image)?;
    let scale = snapshot.page.scale;

    for stroke in &snapshot.strokes {
        let points: Vec<_> = stroke
            .points
            .iter()
            .map(|point| (point.x * scale, point.y * scale))
            .collect();
        draw::polyline(&mut canvas, &points, stroke.width * scale, palette::MASK);
    }

    let label_scale = if canvas.width() >= 1200 { 2 } else { 1 };
    let native = snapshot.page.native_size();
    for (index, annotation) in snapshot.annotations.iter().enumerate() {
        let position = annotation.content_position(native);
        let pin = (position.x * scale, position.y * scale);
        let label = callout_label(index + 1, &annotation.text);
        draw_callout(&mut canvas, pin, &label, label_scale);
    }

    Ok(canvas)
}

fn callout_label(number: usize, text: &str) -> String {
    let text = text.trim();
    let mut label = format!("{number} ");
    if text.chars().count() > MAX_LABEL_CHARS {
        label.extend(text.chars().take(MAX_LABEL_CHARS - 3));
        label.push_str("...");
    } else {
        label.push_str(text);
    }
    label
}

fn draw_callout(canvas: &mut RgbaImage, pin: (f32, f32), label: &str, scale: u32) {
    let (text_width, text_height) = draw::text_size(label, scale);
    let box_width = i64::from(text_width) + 2 * CALLOUT_PADDING;
    let box_height = i64::from(text_height) + 2 * CALLOUT_PADDING;
    let max_x = (i64::from(canvas.width()) - box_width).max(0);
    let max_y = (i64::from(canvas.height()) - box_height).max(0);

    let x0 = (pin.0 as i64 + 12).clamp(0, max_x);
    let y0 = (pin.1 as i64 - box_height / 2).clamp(0, max_y);
    let x1 = x0 + box_width - 1;
    let y1 = y0 + box_height - 1;

    draw::line(
        canvas,
        pin,
        (x0 as f32, (y0 + box_height / 2) as f32),
        2.0,
        palette::PIN,
    );
    draw::fill_rect(canvas, x0, y0, x1, y1, palette::CALLOUT_FILL);
    draw::rect_outline(canvas, x0, y0, x1, y1, 1, palette::PIN);
    draw::text(
        canvas,
        x0 + CALLOUT_PADDING,
        y0 + CALLOUT_PADDING,
        label,
        scale,
        palette::CALLOUT_TEXT,
    );
    draw::disc(canvas, pin.0, pin.1, PIN_RADIUS, palette::PIN);
}

pub fn write_png(image: &RgbaImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), width = image.width(), height = image.height(), "exported page");
    Ok(())
}

/// Composes `snapshot` and saves it to `path`.
pub fn export_png(snapshot: &ExportSnapshot, path: &Path) -> Result<()> {
    let composed = compose(snapshot)?;
    write_png(&composed, path)
}
