use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::filter::FilterStrategy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Locating the document in the downscaled copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Longer side of the detection copy, in pixels.
    pub max_dimension: u32,
    /// Gaussian sigma; 1.1 is what a 5x5 kernel with automatic sigma gives.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Chebyshev radius used to close one-pixel gaps in the edge map; 0 disables.
    pub edge_dilation: u8,
    /// Minimum contour area as a fraction of the detection copy's area.
    pub min_area_ratio: f64,
    /// Polygon simplification tolerance as a fraction of contour perimeter.
    pub epsilon_ratio: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1000,
            blur_sigma: 1.1,
            canny_low: 75.0,
            canny_high: 200.0,
            edge_dilation: 1,
            min_area_ratio: 0.3,
            epsilon_ratio: 0.02,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CleaningConfig {
    /// Gray levels above this become white, the rest black.
    pub threshold: u8,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self { threshold: 127 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Horizontal dilation width is `image_width / dilation_divisor`.
    pub dilation_divisor: u32,
    /// Max distance between a blob's top edge and its row's mean top edge.
    pub row_tolerance: f64,
    /// White border added around each cell crop.
    pub cell_padding: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self { dilation_divisor: 40, row_tolerance: 10.0, cell_padding: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrConfig {
    /// Directory holding `<language>.traineddata`; engine default when unset.
    pub data_path: Option<String>,
    pub language: String,
    /// Characters the engine may emit; empty disables the restriction.
    pub whitelist: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { data_path: None, language: "eng".to_string(), whitelist: "0123456789".to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub detection: DetectionConfig,
    pub cleaning: CleaningConfig,
    pub segmentation: SegmentationConfig,
    pub filter: FilterStrategy,
    pub ocr: OcrConfig,
}

impl PipelineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if d.max_dimension == 0 {
            return Err(invalid("detection.max_dimension", "must be positive"));
        }
        if !(d.blur_sigma > 0.0) {
            return Err(invalid("detection.blur_sigma", "must be positive"));
        }
        if d.canny_low > d.canny_high {
            return Err(invalid(
                "detection.canny_low",
                format!("{} exceeds canny_high {}", d.canny_low, d.canny_high),
            ));
        }
        if !(d.min_area_ratio > 0.0 && d.min_area_ratio <= 1.0) {
            return Err(invalid("detection.min_area_ratio", "must be in (0, 1]"));
        }
        if !(d.epsilon_ratio > 0.0 && d.epsilon_ratio <= 1.0) {
            return Err(invalid("detection.epsilon_ratio", "must be in (0, 1]"));
        }
        if self.segmentation.dilation_divisor == 0 {
            return Err(invalid("segmentation.dilation_divisor", "must be positive"));
        }
        if self.segmentation.row_tolerance < 0.0 {
            return Err(invalid("segmentation.row_tolerance", "must not be negative"));
        }
        if self.ocr.language.trim().is_empty() {
            return Err(invalid("ocr.language", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}
