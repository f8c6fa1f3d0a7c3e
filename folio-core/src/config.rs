use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    /// Box selections smaller than this (display pixels, either side) are dropped.
    pub min_selection_px: f32,
    /// Text selections must be longer than this after trimming.
    pub min_text_selection_chars: usize,
    /// Mask brush diameter in display pixels.
    pub brush_width_px: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub zoom_step: f32,
    /// Pointer travel below which a down/up pair counts as a click.
    pub click_tolerance_px: f32,
    /// Shortest quoted passage considered when focusing an answer.
    pub min_quote_chars: usize,
    pub dark: DarkFilter,
    pub sepia: SepiaFilter,
    pub completion: CompletionConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            min_selection_px: 10.0,
            min_text_selection_chars: 2,
            brush_width_px: 12.0,
            min_scale: 0.25,
            max_scale: 4.0,
            zoom_step: 1.1,
            click_tolerance_px: 3.0,
            min_quote_chars: 4,
            dark: DarkFilter::default(),
            sepia: SepiaFilter::default(),
            completion: CompletionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct DarkFilter {
    pub invert: f32,
    pub hue_rotate_deg: f32,
}

impl Default for DarkFilter {
    fn default() -> Self {
        Self {
            invert: 0.9,
            hue_rotate_deg: 180.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct SepiaFilter {
    pub amount: f32,
}

impl Default for SepiaFilter {
    fn default() -> Self {
        Self { amount: 0.6 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionConfig {
    /// External program that receives the prompt on stdin and answers on stdout.
    pub command: Option<Vec<String>>,
}

impl ViewerConfig {
    pub fn from_toml(source: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_toml(&raw, &display)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn clamp_scale(&self, scale: f32) -> f32 {
        if !scale.is_finite() {
            return 1.0_f32.clamp(self.min_scale, self.max_scale);
        }
        scale.clamp(self.min_scale, self.max_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let config = ViewerConfig::from_toml(
            r#"
            brush_width_px = 20.0

            [dark]
            invert = 1.0
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.brush_width_px, 20.0);
        assert_eq!(config.dark.invert, 1.0);
        assert_eq!(config.dark.hue_rotate_deg, 180.0);
        assert_eq!(config.min_selection_px, 10.0);
        assert!(config.completion.command.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = ViewerConfig::load_or_default(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "min_scale = \"tiny\"").unwrap();

        let err = ViewerConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn completion_command_is_parsed() {
        let config = ViewerConfig::from_toml(
            r#"
            [completion]
            command = ["llm", "-m", "local"]
            "#,
            "inline",
        )
        .unwrap();
        assert_eq!(
            config.completion.command,
            Some(vec!["llm".to_string(), "-m".to_string(), "local".to_string()])
        );
    }
}
