//! Presentation-only colour filters.
//!
//! A theme never reaches the document backend: the installed raster keeps its
//! original pixels and the filter is applied when the frame is presented.

use serde::{Deserialize, Serialize};

use crate::config::ViewerConfig;
use crate::RenderImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Sepia,
}

impl Theme {
    pub fn next(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Sepia,
            Theme::Sepia => Theme::Light,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Sepia => "sepia",
        }
    }
}

/// Declarative filter for the raster presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StyleDescriptor {
    pub invert: f32,
    pub hue_rotate_deg: f32,
    pub sepia: f32,
}

pub fn apply(theme: Theme, config: &ViewerConfig) -> StyleDescriptor {
    match theme {
        Theme::Light => StyleDescriptor::default(),
        Theme::Dark => StyleDescriptor {
            invert: config.dark.invert.clamp(0.0, 1.0),
            hue_rotate_deg: config.dark.hue_rotate_deg,
            sepia: 0.0,
        },
        Theme::Sepia => StyleDescriptor {
            invert: 0.0,
            hue_rotate_deg: 0.0,
            sepia: config.sepia.amount.clamp(0.0, 1.0),
        },
    }
}

impl StyleDescriptor {
    pub fn is_identity(&self) -> bool {
        self.invert == 0.0 && self.hue_rotate_deg.rem_euclid(360.0) == 0.0 && self.sepia == 0.0
    }

    /// CSS `filter` value equivalent to this descriptor.
    pub fn css_filter(&self) -> String {
        if self.is_identity() {
            return "none".to_string();
        }
        let mut parts = Vec::new();
        if self.invert > 0.0 {
            parts.push(format!("invert({})", self.invert));
        }
        if self.hue_rotate_deg.rem_euclid(360.0) != 0.0 {
            parts.push(format!("hue-rotate({}deg)", self.hue_rotate_deg));
        }
        if self.sepia > 0.0 {
            parts.push(format!("sepia({})", self.sepia));
        }
        parts.join(" ")
    }

    /// Returns a filtered copy of `image` for hosts that composite pixels themselves.
    pub fn present(&self, image: &RenderImage) -> RenderImage {
        let mut out = image.clone();
        if self.is_identity() {
            return out;
        }

        let hue = hue_rotate_matrix(self.hue_rotate_deg);
        let sepia = sepia_matrix(self.sepia);
        for pixel in out.pixels.chunks_exact_mut(4) {
            let mut rgb = [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32];
            if self.invert > 0.0 {
                for channel in rgb.iter_mut() {
                    *channel = *channel * (1.0 - self.invert) + (255.0 - *channel) * self.invert;
                }
            }
            if self.hue_rotate_deg != 0.0 {
                rgb = multiply(&hue, rgb);
            }
            if self.sepia > 0.0 {
                rgb = multiply(&sepia, rgb);
            }
            for (dst, value) in pixel.iter_mut().zip(rgb) {
                *dst = value.round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }
}

type Matrix = [[f32; 3]; 3];

fn multiply(m: &Matrix, rgb: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0; 3];
    for (row, value) in m.iter().zip(out.iter_mut()) {
        *value = row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2];
    }
    out
}

fn hue_rotate_matrix(degrees: f32) -> Matrix {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

fn sepia_matrix(amount: f32) -> Matrix {
    let inv = 1.0 - amount;
    [
        [0.393 + 0.607 * inv, 0.769 - 0.769 * inv, 0.189 - 0.189 * inv],
        [0.349 - 0.349 * inv, 0.686 + 0.314 * inv, 0.168 - 0.168 * inv],
        [0.272 - 0.272 * inv, 0.534 - 0.534 * inv, 0.131 + 0.869 * inv],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(rgba: [u8; 4]) -> RenderImage {
        RenderImage {
            width: 2,
            height: 1,
            pixels: rgba.iter().chain(rgba.iter()).copied().collect(),
        }
    }

    #[test]
    fn light_theme_is_identity() {
        let style = apply(Theme::Light, &ViewerConfig::default());
        assert!(style.is_identity());
        assert_eq!(style.css_filter(), "none");

        let image = solid([10, 20, 30, 255]);
        assert_eq!(style.present(&image).pixels, image.pixels);
    }

    #[test]
    fn dark_theme_inverts_without_touching_source() {
        let style = StyleDescriptor {
            invert: 1.0,
            hue_rotate_deg: 0.0,
            sepia: 0.0,
        };
        let image = solid([255, 255, 255, 200]);
        let presented = style.present(&image);

        assert_eq!(&presented.pixels[..4], &[0, 0, 0, 200]);
        assert_eq!(&image.pixels[..4], &[255, 255, 255, 200]);
    }

    #[test]
    fn dark_theme_css_contains_inversion_and_rotation() {
        let css = apply(Theme::Dark, &ViewerConfig::default()).css_filter();
        assert_eq!(css, "invert(0.9) hue-rotate(180deg)");
    }

    #[test]
    fn sepia_tints_grey_towards_warm_tones() {
        let style = apply(Theme::Sepia, &ViewerConfig::default());
        let presented = style.present(&solid([128, 128, 128, 255]));
        let [r, g, b, _] = [
            presented.pixels[0],
            presented.pixels[1],
            presented.pixels[2],
            presented.pixels[3],
        ];
        assert!(r >= g && g >= b, "expected warm tint, got {r},{g},{b}");
        assert!(r > b);
    }

    #[test]
    fn theme_cycle_visits_all_variants() {
        assert_eq!(Theme::Light.next(), Theme::Dark);
        assert_eq!(Theme::Dark.next(), Theme::Sepia);
        assert_eq!(Theme::Sepia.next(), Theme::Light);
    }
}
