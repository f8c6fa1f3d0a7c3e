//! Raster drawing primitives shared by the export compositor and the live frame.

use anyhow::{anyhow, Result};
use folio_core::RenderImage;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};

pub const GLYPH_SIZE: u32 = 8;

/// Overlay colours shared by the live frame and the export.
pub mod palette {
    use image::Rgba;

    pub const MASK: Rgba<u8> = Rgba([230, 40, 40, 150]);
    pub const SELECTION: Rgba<u8> = Rgba([40, 110, 230, 255]);
    pub const SELECTION_FILL: Rgba<u8> = Rgba([40, 110, 230, 40]);
    pub const HIGHLIGHT: Rgba<u8> = Rgba([255, 215, 0, 110]);
    pub const PIN: Rgba<u8> = Rgba([245, 130, 20, 255]);
    pub const CALLOUT_FILL: Rgba<u8> = Rgba([255, 250, 220, 235]);
    pub const CALLOUT_TEXT: Rgba<u8> = Rgba([30, 30, 30, 255]);
}

pub fn to_canvas(image: &RenderImage) -> Result<RgbaImage> {
    RgbaImage::from_raw(image.width, image.height, image.pixels.clone()).ok_or_else(|| {
        anyhow!(
            "pixel buffer of {} bytes does not match {}x{}",
            image.pixels.len(),
            image.width,
            image.height
        )
    })
}

pub fn from_canvas(canvas: RgbaImage) -> RenderImage {
    let (width, height) = canvas.dimensions();
    RenderImage {
        width,
        height,
        pixels: canvas.into_raw(),
    }
}

/// Source-over blend of `src` onto `dst`.
pub fn blend(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let alpha = f32::from(src[3]) / 255.0;
    if alpha <= 0.0 {
        return dst;
    }
    let inv = 1.0 - alpha;
    let mix = |d: u8, s: u8| (f32::from(d) * inv + f32::from(s) * alpha).round().clamp(0.0, 255.0) as u8;
    let out_alpha = (f32::from(dst[3]) + f32::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([
        mix(dst[0], src[0]),
        mix(dst[1], src[1]),
        mix(dst[2], src[2]),
        out_alpha,
    ])
}

fn blend_at(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    let (x, y) = (x as u32, y as u32);
    let dst = *canvas.get_pixel(x, y);
    canvas.put_pixel(x, y, blend(dst, color));
}

pub fn disc(canvas: &mut RgbaImage, cx: f32, cy: f32, radius: f32, color: Rgba<u8>) {
    if radius <= 0.1 {
        blend_at(canvas, cx.round() as i64, cy.round() as i64, color);
        return;
    }
    let r2 = radius * radius;
    let (min_x, max_x) = ((cx - radius).floor() as i64, (cx + radius).ceil() as i64);
    let (min_y, max_y) = ((cy - radius).floor() as i64, (cy + radius).ceil() as i64);
    for y in min_y.max(0)..=max_y.min(i64::from(canvas.height()) - 1) {
        for x in min_x.max(0)..=max_x.min(i64::from(canvas.width()) - 1) {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if dx * dx + dy * dy <= r2 {
                blend_at(canvas, x, y, color);
            }
        }
    }
}

/// Stamps discs along the segment. Overlapping stamps blend repeatedly, so
/// translucent strokes darken slightly at joints.
pub fn line(canvas: &mut RgbaImage, from: (f32, f32), to: (f32, f32), width: f32, color: Rgba<u8>) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let steps = (dx * dx + dy * dy).sqrt().max(1.0).ceil() as u32;
    let radius = (width.max(1.0) / 2.0).max(0.6);
    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        disc(canvas, from.0 + dx * t, from.1 + dy * t, radius, color);
    }
}

pub fn polyline(canvas: &mut RgbaImage, points: &[(f32, f32)], width: f32, color: Rgba<u8>) {
    match points {
        [] => {}
        [only] => disc(canvas, only.0, only.1, width / 2.0, color),
        _ => {
            for pair in points.windows(2) {
                line(canvas, pair[0], pair[1], width, color);
            }
        }
    }
}

pub fn fill_rect(canvas: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    if canvas.width() == 0 || canvas.height() == 0 {
        return;
    }
    let max_x = i64::from(canvas.width()) - 1;
    let max_y = i64::from(canvas.height()) - 1;
    for y in y0.min(y1).max(0)..=y0.max(y1).min(max_y) {
        for x in x0.min(x1).max(0)..=x0.max(x1).min(max_x) {
            blend_at(canvas, x, y, color);
        }
    }
}

pub fn rect_outline(
    canvas: &mut RgbaImage,
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
    thickness: u32,
    color: Rgba<u8>,
) {
    let t = i64::from(thickness.max(1)) - 1;
    fill_rect(canvas, x0, y0, x1, y0 + t, color);
    fill_rect(canvas, x0, y1 - t, x1, y1, color);
    fill_rect(canvas, x0, y0 + t + 1, x0 + t, y1 - t - 1, color);
    fill_rect(canvas, x1 - t, y0 + t + 1, x1, y1 - t - 1, color);
}

/// Renders `text` with the 8x8 bitmap font, one glyph per `GLYPH_SIZE * scale` pixels.
pub fn text(canvas: &mut RgbaImage, x: i64, y: i64, text: &str, scale: u32, color: Rgba<u8>) {
    let scale = i64::from(scale.max(1));
    let mut cursor_x = x;
    for ch in text.chars() {
        let glyph = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?'));
        if let Some(glyph) = glyph {
            for (row_idx, row) in glyph.iter().enumerate() {
                for col in 0..8_i64 {
                    if (row >> col) & 1 == 0 {
                        continue;
                    }
                    let px = cursor_x + col * scale;
                    let py = y + row_idx as i64 * scale;
                    for sy in 0..scale {
                        for sx in 0..scale {
                            blend_at(canvas, px + sx, py + sy, color);
                        }
                    }
                }
            }
        }
        cursor_x += i64::from(GLYPH_SIZE) * scale;
    }
}

/// Pixel size of a single line of `text` at `scale`.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let step = GLYPH_SIZE * scale.max(1);
    (text.chars().count() as u32 * step, step)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn blend_respects_source_alpha() {
        let dst = Rgba([255, 255, 255, 255]);
        assert_eq!(blend(dst, Rgba([0, 0, 0, 0])), dst);
        assert_eq!(blend(dst, Rgba([0, 0, 0, 255])), Rgba([0, 0, 0, 255]));
        assert_eq!(blend(dst, Rgba([0, 0, 0, 128]))[0], 127);
    }

    #[test]
    fn line_covers_its_endpoints_and_stays_inside_canvas() {
        let mut canvas = white(20, 20);
        line(&mut canvas, (-5.0, 10.0), (30.0, 10.0), 3.0, Rgba([255, 0, 0, 255]));
        assert_eq!(*canvas.get_pixel(0, 10), Rgba([255, 0, 0, 255]));
        assert_eq!(*canvas.get_pixel(19, 10), Rgba([255, 0, 0, 255]));
        assert_eq!(*canvas.get_pixel(10, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn rect_outline_leaves_interior_untouched() {
        let mut canvas = white(10, 10);
        rect_outline(&mut canvas, 1, 1, 8, 8, 1, Rgba([0, 0, 255, 255]));
        assert_eq!(*canvas.get_pixel(1, 5), Rgba([0, 0, 255, 255]));
        assert_eq!(*canvas.get_pixel(8, 8), Rgba([0, 0, 255, 255]));
        assert_eq!(*canvas.get_pixel(5, 5), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn text_draws_glyph_pixels() {
        let mut canvas = white(16, 8);
        text(&mut canvas, 0, 0, "H", 1, Rgba([0, 0, 0, 255]));
        let inked = canvas.pixels().filter(|pixel| pixel[0] == 0).count();
        assert!(inked > 0);
        assert_eq!(text_size("abc", 2), (48, 16));
    }

    #[test]
    fn canvas_conversion_checks_buffer_length() {
        let bad = RenderImage {
            width: 2,
            height: 2,
            pixels: vec![0; 3],
        };
        assert!(to_canvas(&bad).is_err());

        let good = RenderImage {
            width: 2,
            height: 1,
            pixels: vec![9; 8],
        };
        assert_eq!(from_canvas(to_canvas(&good).unwrap()), good);
    }
}
