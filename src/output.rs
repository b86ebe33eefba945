//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Folders
//!
//! Printed once at startup, before the first run:
//!
//! ```text
//! Root: /home/me/site
//!     Input: /home/me/site/input
//!     Output: /home/me/site/output
//!     Config: /home/me/site/config.toml (stock)
//! ```
//!
//! ## Run summary
//!
//! Printed after every successful run, one line per pipeline:
//!
//! ```text
//! 001 Content → 3 documents (4 steps, 12 ms)
//! 002 Resources → 1 document (2 steps, 1 ms)
//!
//! Executed 2 pipelines, 4 documents in 15 ms (cache: 3 computed)
//! ```
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::engine::{EngineSettings, ExecutionSummary, PipelineSummary};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn millis(d: Duration) -> u128 {
    d.as_millis()
}

// ============================================================================
// Folders
// ============================================================================

/// Startup banner: resolved folders and the configuration source.
///
/// `config_found` is false when the stock configuration is in use.
pub fn format_folders(settings: &EngineSettings, config: &Path, config_found: bool) -> Vec<String> {
    let config_line = if config_found {
        format!("{}Config: {}", indent(1), config.display())
    } else {
        format!("{}Config: {} (stock)", indent(1), config.display())
    };
    vec![
        format!("Root: {}", settings.root_folder.display()),
        format!("{}Input: {}", indent(1), settings.input_path().display()),
        format!("{}Output: {}", indent(1), settings.output_path().display()),
        config_line,
    ]
}

pub fn print_folders(settings: &EngineSettings, config: &Path, config_found: bool) {
    for line in format_folders(settings, config, config_found) {
        println!("{}", line);
    }
}

// ============================================================================
// Run summary
// ============================================================================

fn pipeline_line(index: usize, p: &PipelineSummary) -> String {
    format!(
        "{} {} → {} ({}, {} ms)",
        format_index(index),
        p.name,
        plural(p.outputs, "document", "documents"),
        plural(p.steps, "step", "steps"),
        millis(p.elapsed)
    )
}

/// One line per pipeline, a blank line, and a totals line.
pub fn format_summary(summary: &ExecutionSummary) -> Vec<String> {
    let mut lines: Vec<String> = summary
        .pipelines
        .iter()
        .enumerate()
        .map(|(i, p)| pipeline_line(i + 1, p))
        .collect();
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Executed {}, {} in {} ms (cache: {})",
        plural(summary.pipelines.len(), "pipeline", "pipelines"),
        plural(summary.total_outputs(), "document", "documents"),
        millis(summary.elapsed),
        summary.cache
    ));
    lines
}

pub fn print_summary(summary: &ExecutionSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}
