//! Configuration loading and validation.
//!
//! The configuration file (`config.toml` in the root folder, or the path
//! given with `--config`) declares folders, global metadata and pipelines.
//! It is layered on top of the stock configuration returned by
//! [`stock_config_toml`]:
//!
//! ```text
//! stock config (two pipelines: Content, Resources)
//!   ← config.toml (tables merge key by key, arrays replace)
//!   ← CLI flags (--input, --output, --noclean, --nocache)
//! ```
//!
//! So a file that only sets `output = "public"` keeps the stock pipelines,
//! while a file that declares `[[pipelines]]` replaces them entirely.
//!
//! ## Configuration Options
//!
//! ```toml
//! input = "input"          # Input folder, relative to the root folder
//! output = "output"        # Output folder, relative to the root folder
//! clean_output = true      # Empty the output folder before every run
//!
//! [metadata]               # Global metadata for every document
//! SiteTitle = "My Site"
//!
//! [[pipelines]]
//! name = "Posts"
//! input = "Content"        # Optional: start from an earlier pipeline's outputs
//! metadata = { Layout = "post" }
//! steps = [
//!     { ReadFiles = { pattern = "posts/*.md" } },
//!     { FrontMatter = {} },
//!     { Markdown = {} },
//!     { WriteFiles = { extension = "html" } },
//! ]
//! ```
//!
//! Unknown keys are rejected at every level.

use crate::engine::{Engine, EngineError, EngineSettings};
use crate::pipeline::Pipeline;
use crate::steps::{StepConfig, build_steps};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the root folder when no `--config` is given.
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Input folder, relative to the root folder.
    pub input: String,
    /// Output folder, relative to the root folder.
    pub output: String,
    /// Empty the output folder before every run.
    pub clean_output: bool,
    /// Global metadata available to every document.
    pub metadata: toml::Table,
    /// Pipelines, run in declaration order.
    pub pipelines: Vec<PipelineConfig>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            input: "input".to_string(),
            output: "output".to_string(),
            clean_output: true,
            metadata: toml::Table::new(),
            pipelines: Vec::new(),
        }
    }
}

/// One `[[pipelines]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub name: String,
    /// Name of an earlier pipeline whose outputs seed this one.
    #[serde(default)]
    pub input: Option<String>,
    /// Pipeline-scoped metadata, overlaid on the global metadata.
    #[serde(default)]
    pub metadata: toml::Table,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

impl SiteConfig {
    /// Validate folder names, pipeline names, input references and steps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input.trim().is_empty() {
            return Err(ConfigError::Validation("input must not be empty".into()));
        }
        if self.output.trim().is_empty() {
            return Err(ConfigError::Validation("output must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for pipeline in &self.pipelines {
            if pipeline.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "pipeline names must not be empty".into(),
                ));
            }
            if let Some(input) = &pipeline.input {
                if !seen.contains(input.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "pipeline '{}' reads from '{input}', which is not an earlier pipeline",
                        pipeline.name
                    )));
                }
            }
            if !seen.insert(pipeline.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate pipeline name '{}'",
                    pipeline.name
                )));
            }
            for step in &pipeline.steps {
                step.validate().map_err(|e| {
                    ConfigError::Validation(format!("pipeline '{}': {e}", pipeline.name))
                })?;
            }
        }
        Ok(())
    }

    /// Engine settings for a root folder, before CLI overrides.
    pub fn engine_settings(&self, root: &Path) -> EngineSettings {
        EngineSettings {
            root_folder: root.to_path_buf(),
            input_folder: PathBuf::from(&self.input),
            output_folder: PathBuf::from(&self.output),
            no_cache: false,
            clean_output_on_execute: self.clean_output,
        }
    }

    /// Build an engine with this configuration's metadata and pipelines.
    pub fn build_engine(&self, settings: EngineSettings) -> Result<Engine, EngineError> {
        let mut engine = Engine::new(settings);
        engine.add_metadata(self.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        for p in &self.pipelines {
            let mut pipeline = Pipeline::new(p.name.clone())
                .with_metadata(p.metadata.iter().map(|(k, v)| (k.clone(), v.clone())))
                .with_steps(build_steps(&p.steps));
            if let Some(input) = &p.input {
                pipeline = pipeline.with_input(input.clone());
            }
            engine.add_pipeline(pipeline)?;
        }
        Ok(engine)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// The stock configuration as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::from_str(stock_config_toml())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay, arrays included, replace base values.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a configuration file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the configuration file at `path` over the stock configuration.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns the fully-commented stock `config.toml`.
///
/// Used as the base layer of every configuration and when no file exists.
pub fn stock_config_toml() -> &'static str {
    r##"# simple-press configuration
# ==========================
# All settings are optional. Values shown below are the defaults.
# Tables merge key by key with this file; arrays (such as the pipeline
# list) replace it. Unknown keys cause an error.

# Input folder, relative to the root folder.
input = "input"

# Output folder, relative to the root folder.
output = "output"

# Empty the output folder before every run.
clean_output = true

# Global metadata available to every document.
[metadata]

# ---------------------------------------------------------------------------
# Pipelines run in declaration order. Each one starts from a single empty
# document (or from the outputs of the pipeline named by `input`) and passes
# documents through its steps.
#
# Available steps:
#   ReadFiles   { pattern, recursive = true, extensions = [], exclude_extensions = [] }
#   WriteFiles  { extension } or { path_key } or {}
#   FrontMatter {}
#   Markdown    { key } or {}
#   Content     { text, position = "replace" | "append" | "prepend" }
#   Meta        { key, value }
#   GroupBy     { key, steps = [] }
#   OrderBy     { key, descending = false }
#   Concat      { steps }
# ---------------------------------------------------------------------------

# Markdown pages: front matter to metadata, markdown to HTML.
[[pipelines]]
name = "Content"
steps = [
    { ReadFiles = { pattern = "*.md" } },
    { FrontMatter = {} },
    { Markdown = {} },
    { WriteFiles = { extension = "html" } },
]

# Everything else is copied as-is.
[[pipelines]]
name = "Resources"
steps = [
    { ReadFiles = { pattern = "*", exclude_extensions = ["md"] } },
    { WriteFiles = {} },
]
"##
}
