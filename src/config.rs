//! Batch settings loaded from TOML.
//!
//! ```toml
//! [batch]
//! max_workers = 4
//! error_limit = 10
//! skip_existing = true
//!
//! [output]
//! dir = "web"
//! format = "webp"
//! suffix = ""
//! quality = 80
//!
//! [[pipeline]]
//! op = "resize"
//! width = 1200
//! ```
//!
//! Every section is optional. Batch options can be overridden from the
//! environment with `GNEISS_MAX_WORKERS`, `GNEISS_ERROR_LIMIT`,
//! `GNEISS_SKIP_EXISTING` and `GNEISS_STOP_ON_ERROR`.

use crate::core::batch::{BatchConfig, OutputLayout};
use crate::core::error::ConfigError;
use crate::core::types::{ImageFormat, Quality};
use crate::pipeline::config::{build_pipeline, StepConfig};
use crate::pipeline::operation::OperationPipeline;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where processed files are written and how they are encoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Output directory; `None` writes next to each input.
    pub dir: Option<PathBuf>,
    /// Output format name, e.g. `webp`. `None` keeps each input's format.
    pub format: Option<String>,
    /// File name suffix; `None` uses the layout default.
    pub suffix: Option<String>,
    /// Encoder quality for lossy formats.
    pub quality: Option<Quality>,
}

/// Complete settings for one batch invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Worker and failure settings, the `[batch]` table.
    pub batch: BatchConfig,
    /// Output naming and encoding, the `[output]` table.
    pub output: OutputSettings,
    /// Steps applied to every image, the `[[pipeline]]` list.
    pub pipeline: Vec<StepConfig>,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded settings from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Apply `GNEISS_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("GNEISS_MAX_WORKERS") {
            self.batch.max_workers = parse_number("GNEISS_MAX_WORKERS", &value)?;
        }
        if let Some(value) = lookup("GNEISS_ERROR_LIMIT") {
            self.batch.error_limit = Some(parse_number("GNEISS_ERROR_LIMIT", &value)?);
        }
        if let Some(value) = lookup("GNEISS_SKIP_EXISTING") {
            self.batch.skip_existing = parse_bool("GNEISS_SKIP_EXISTING", &value)?;
        }
        if let Some(value) = lookup("GNEISS_STOP_ON_ERROR") {
            self.batch.stop_on_error = parse_bool("GNEISS_STOP_ON_ERROR", &value)?;
        }
        Ok(())
    }

    /// Validated batch options.
    pub fn batch_config(&self) -> Result<BatchConfig, ConfigError> {
        self.batch
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                key: "batch".to_string(),
                message: e.to_string(),
            })?;
        Ok(self.batch.clone())
    }

    /// Output layout described by `[output]`.
    pub fn output_layout(&self) -> Result<OutputLayout, ConfigError> {
        let mut layout = OutputLayout::new();
        if let Some(dir) = &self.output.dir {
            layout = layout.with_output_dir(dir);
        }
        if let Some(format) = &self.output.format {
            layout = layout.with_format(format.parse::<ImageFormat>()?);
        }
        if let Some(suffix) = &self.output.suffix {
            layout = layout.with_suffix(suffix.as_str());
        }
        if let Some(quality) = self.output.quality {
            layout = layout.with_quality(quality);
        }
        Ok(layout)
    }

    /// Pipeline described by `[[pipeline]]`, in order.
    pub fn build_pipeline(&self) -> Result<OperationPipeline, ConfigError> {
        build_pipeline(&self.pipeline)
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected a non-negative integer, got '{}'", value),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{}'", value),
        }),
    }
}
