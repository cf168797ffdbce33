//! YAML configuration for detection thresholds, export layout, and filter
//! presets.
//!
//! Every field is optional in the file; omitted values fall back to the
//! built-in defaults, which reproduce the stock detection behaviour.

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SAMPLE_ROWS: usize = 10;
pub const DEFAULT_OPTIONS_LIMIT: usize = 15;
pub const DEFAULT_PRIMARY_LIMIT: usize = 6;
pub const DEFAULT_SERIAL_MIN: f64 = 40_000.0;
pub const DEFAULT_SERIAL_MAX: f64 = 50_000.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TriageConfig {
    pub detection: DetectionConfig,
    pub export: ExportConfig,
    /// Filter expressions applied on top of any given on the command line.
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Leading rows inspected per column when voting on a type.
    pub sample_rows: usize,
    /// Largest distinct-value count that still yields categorical options.
    pub options_limit: usize,
    /// Columns at a position below this are eligible for the summary view.
    pub primary_limit: usize,
    pub serial_min: f64,
    pub serial_max: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            options_limit: DEFAULT_OPTIONS_LIMIT,
            primary_limit: DEFAULT_PRIMARY_LIMIT,
            serial_min: DEFAULT_SERIAL_MIN,
            serial_max: DEFAULT_SERIAL_MAX,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub delimiter: char,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl ExportConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        ensure!(
            self.delimiter.is_ascii(),
            "Export delimiter '{}' must be a single ASCII character",
            self.delimiter
        );
        Ok(self.delimiter as u8)
    }
}

impl TriageConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("Opening config file {path:?}"))?;
        Self::from_yaml_str(&raw).with_context(|| format!("Parsing config file {path:?}"))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: TriageConfig = serde_yaml::from_str(raw).context("Parsing config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing config to YAML")
    }

    fn validate(&self) -> Result<()> {
        let detection = &self.detection;
        ensure!(
            detection.sample_rows > 0,
            "detection.sample_rows must be at least 1"
        );
        ensure!(
            detection.serial_min < detection.serial_max,
            "detection.serial_min ({}) must be below detection.serial_max ({})",
            detection.serial_min,
            detection.serial_max
        );
        self.export.delimiter_byte()?;
        Ok(())
    }
}
