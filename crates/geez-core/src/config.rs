//! Annotation policy loaded from TOML
//!
//! Every field is optional; a missing section or key takes the default
//! listed on it. A full file looks like:
//!
//! ```toml
//! [detection]
//! margin_depth = 100.0
//! edge_gate = true         # false searches the whole band width
//! edge_threshold = 100.0
//!
//! [placement]
//! bottom_offset = 35.0
//! outer_right_inset = 60.0
//! outer_left_inset = 40.0
//! font_size = 12.0
//! color = [0.0, 0.0, 0.0]
//!
//! [redaction]
//! fill = [1.0, 1.0, 1.0]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GeezError;
use crate::geometry::Color;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
}

/// Where old page numbers are searched for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Depth of the bottom margin band in points (default: 100)
    #[serde(default = "default_margin_depth")]
    pub margin_depth: f64,
    /// Require candidates to sit near a side edge (default: true)
    #[serde(default = "default_edge_gate")]
    pub edge_gate: bool,
    /// With the edge gate on, fragments must start within this distance of
    /// the left edge or end within it of the right edge (default: 100)
    #[serde(default = "default_edge_threshold")]
    pub edge_threshold: f64,
}

fn default_margin_depth() -> f64 {
    100.0
}

fn default_edge_gate() -> bool {
    true
}

fn default_edge_threshold() -> f64 {
    100.0
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            margin_depth: default_margin_depth(),
            edge_gate: default_edge_gate(),
            edge_threshold: default_edge_threshold(),
        }
    }
}

/// Where and how the Ge'ez numeral is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Baseline distance above the bottom edge (default: 35)
    #[serde(default = "default_bottom_offset")]
    pub bottom_offset: f64,
    /// Anchor distance from the right edge on odd pages (default: 60)
    #[serde(default = "default_outer_right_inset")]
    pub outer_right_inset: f64,
    /// Anchor distance from the left edge on even pages (default: 40)
    #[serde(default = "default_outer_left_inset")]
    pub outer_left_inset: f64,
    /// Font size in points (default: 12)
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default = "default_text_color")]
    pub color: Color,
}

fn default_bottom_offset() -> f64 {
    35.0
}

fn default_outer_right_inset() -> f64 {
    60.0
}

fn default_outer_left_inset() -> f64 {
    40.0
}

fn default_font_size() -> f64 {
    12.0
}

fn default_text_color() -> Color {
    Color::BLACK
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            bottom_offset: default_bottom_offset(),
            outer_right_inset: default_outer_right_inset(),
            outer_left_inset: default_outer_left_inset(),
            font_size: default_font_size(),
            color: default_text_color(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_fill")]
    pub fill: Color,
}

fn default_fill() -> Color {
    Color::WHITE
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            fill: default_fill(),
        }
    }
}

impl AnnotatorConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, GeezError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            GeezError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(s: &str) -> Result<Self, GeezError> {
        let config: AnnotatorConfig =
            toml::from_str(s).map_err(|e| GeezError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GeezError> {
        let distances = [
            ("detection.margin_depth", self.detection.margin_depth),
            ("detection.edge_threshold", self.detection.edge_threshold),
            ("placement.bottom_offset", self.placement.bottom_offset),
            ("placement.outer_right_inset", self.placement.outer_right_inset),
            ("placement.outer_left_inset", self.placement.outer_left_inset),
        ];
        for (key, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(GeezError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    key, value
                )));
            }
        }

        let size = self.placement.font_size;
        if !size.is_finite() || size <= 0.0 {
            return Err(GeezError::Config(format!(
                "placement.font_size must be positive, got {}",
                size
            )));
        }
        if !self.placement.color.is_valid() {
            return Err(GeezError::Config(
                "placement.color components must be within 0-1".into(),
            ));
        }
        if !self.redaction.fill.is_valid() {
            return Err(GeezError::Config(
                "redaction.fill components must be within 0-1".into(),
            ));
        }
        Ok(())
    }
}
