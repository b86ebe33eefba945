//! Engine orchestration: settings, pipelines, cache and a full run.
//!
//! An [`Engine`] owns an ordered list of uniquely named pipelines, global
//! metadata, one [`ExecutionCache`] and the [`DocumentCollection`] of the
//! current run. [`Engine::execute`] performs a complete run:
//!
//! ```text
//! clean output (optional)
//!   → dispose previous run's documents, clear outputs
//!   → for each pipeline in declaration order:
//!        initial docs = [one empty doc with global + pipeline metadata]
//!                     | outputs of the named earlier pipeline
//!        run steps (sweeping superseded documents after each)
//!        record outputs under the pipeline name
//! ```
//!
//! The cache survives between `execute` calls, which is what makes repeated
//! runs in watch mode cheap. A step error aborts the run at once; documents
//! produced so far stay as they are until the next run or until the engine is
//! dropped.

use crate::cache::{CacheStats, ExecutionCache};
use crate::document::{Body, Document, DocumentError};
use crate::documents::DocumentCollection;
use crate::metadata::{Metadata, Value};
use crate::pipeline::{ActivePipeline, Pipeline};
use crate::step::StepError;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Pipeline '{pipeline}' failed in step '{step}': {source}")]
    Step {
        pipeline: String,
        step: String,
        #[source]
        source: StepError,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("A pipeline named '{0}' already exists")]
    DuplicatePipeline(String),
    #[error("Pipeline '{pipeline}' reads from '{input}', which is not an earlier pipeline")]
    UnknownPipeline { pipeline: String, input: String },
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("Refusing to clean output folder {}: it contains the {contains} folder", .output.display())]
    UnsafeOutput {
        output: PathBuf,
        contains: &'static str,
    },
}

/// Folder and behavior settings, fixed before the first `execute`.
///
/// Relative input and output folders resolve against `root_folder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub root_folder: PathBuf,
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub no_cache: bool,
    pub clean_output_on_execute: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            root_folder: PathBuf::from("."),
            input_folder: PathBuf::from("input"),
            output_folder: PathBuf::from("output"),
            no_cache: false,
            clean_output_on_execute: true,
        }
    }
}

impl EngineSettings {
    pub fn input_path(&self) -> PathBuf {
        self.root_folder.join(&self.input_folder)
    }

    pub fn output_path(&self) -> PathBuf {
        self.root_folder.join(&self.output_folder)
    }
}

/// The engine state steps can see through their context.
#[derive(Debug)]
pub(crate) struct EngineParts {
    pub(crate) settings: EngineSettings,
    pub(crate) cache: ExecutionCache,
    pub(crate) documents: DocumentCollection,
    pub(crate) active: Arc<ActivePipeline>,
}

/// Per-pipeline result of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub name: String,
    pub steps: usize,
    pub outputs: usize,
    pub elapsed: Duration,
}

/// Result of a successful [`Engine::execute`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionSummary {
    pub pipelines: Vec<PipelineSummary>,
    pub cache: CacheStats,
    pub elapsed: Duration,
}

impl ExecutionSummary {
    pub fn total_outputs(&self) -> usize {
        self.pipelines.iter().map(|p| p.outputs).sum()
    }
}

pub struct Engine {
    parts: EngineParts,
    metadata: Metadata,
    pipelines: Vec<Pipeline>,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        let cache = if settings.no_cache {
            ExecutionCache::disabled()
        } else {
            ExecutionCache::new()
        };
        Self {
            parts: EngineParts {
                settings,
                cache,
                documents: DocumentCollection::new(),
                active: Arc::default(),
            },
            metadata: Metadata::new(),
            pipelines: Vec::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.parts.settings
    }

    /// Global metadata every new document starts from.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Overlay global metadata.
    pub fn add_metadata<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.metadata = self.metadata.with_overlay(pairs);
    }

    /// Append a pipeline. Names are unique, and an initial-input pipeline
    /// must already have been added.
    pub fn add_pipeline(&mut self, pipeline: Pipeline) -> Result<(), EngineError> {
        if self.pipeline(pipeline.name()).is_some() {
            return Err(EngineError::DuplicatePipeline(pipeline.name().to_string()));
        }
        if let Some(input) = pipeline.input() {
            if self.pipeline(input).is_none() {
                return Err(EngineError::UnknownPipeline {
                    pipeline: pipeline.name().to_string(),
                    input: input.to_string(),
                });
            }
        }
        pipeline.state().attach(&self.parts.active);
        self.pipelines.push(pipeline);
        Ok(())
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.iter().find(|p| p.name() == name)
    }

    pub fn cache(&self) -> &ExecutionCache {
        &self.parts.cache
    }

    /// Outputs of the latest run, by pipeline name.
    pub fn documents(&self) -> &DocumentCollection {
        &self.parts.documents
    }

    /// Run every pipeline once. Errors are logged here and returned.
    pub fn execute(&mut self) -> Result<ExecutionSummary, EngineError> {
        let result = self.run();
        self.parts.active.clear();
        match &result {
            Ok(summary) => info!(
                pipelines = summary.pipelines.len(),
                outputs = summary.total_outputs(),
                elapsed_ms = summary.elapsed.as_millis() as u64,
                cache = %summary.cache,
                "execution finished"
            ),
            Err(e) => error!(error = %e, "execution aborted"),
        }
        result
    }

    fn run(&mut self) -> Result<ExecutionSummary, EngineError> {
        let started = Instant::now();
        if self.parts.settings.clean_output_on_execute {
            self.clean_output()?;
        }
        self.reset();
        self.parts.cache.reset_stats();

        let mut summary = ExecutionSummary::default();
        for pipeline in &self.pipelines {
            let pipeline_started = Instant::now();
            self.parts.active.set(pipeline.state());
            let base = self.metadata.with_overlay(
                pipeline
                    .metadata()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone())),
            );
            let inputs = match pipeline.input() {
                Some(input) => self
                    .parts
                    .documents
                    .get(input)
                    .ok_or_else(|| EngineError::UnknownPipeline {
                        pipeline: pipeline.name().to_string(),
                        input: input.to_string(),
                    })?
                    .to_vec(),
                None => vec![Document::create(
                    pipeline.state(),
                    String::new(),
                    base.clone(),
                    Body::Empty,
                )?],
            };

            info!(pipeline = pipeline.name(), inputs = inputs.len(), "executing pipeline");
            let outputs = pipeline.run(inputs, &base, &self.parts)?;
            let elapsed = pipeline_started.elapsed();
            summary.pipelines.push(PipelineSummary {
                name: pipeline.name().to_string(),
                steps: pipeline.steps().len(),
                outputs: outputs.len(),
                elapsed,
            });
            self.parts.documents.insert(pipeline.name(), outputs);
        }
        summary.cache = self.parts.cache.stats();
        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// Empty the output folder. An output folder that is, or contains, the
    /// root or input folder is never removed.
    fn clean_output(&self) -> Result<(), EngineError> {
        let settings = &self.parts.settings;
        let output = settings.output_path();
        if output.exists() {
            let resolved = output.canonicalize()?;
            let guarded = [("root", settings.root_folder.clone()), ("input", settings.input_path())];
            for (contains, folder) in guarded {
                let Ok(folder) = folder.canonicalize() else {
                    continue;
                };
                if folder.starts_with(&resolved) {
                    return Err(EngineError::UnsafeOutput { output, contains });
                }
            }
            debug!(path = %output.display(), "cleaning output folder");
            std::fs::remove_dir_all(&output)?;
        }
        std::fs::create_dir_all(&output)?;
        Ok(())
    }

    /// Dispose every document of the previous run and forget its outputs.
    fn reset(&mut self) {
        for pipeline in &self.pipelines {
            pipeline.reset();
        }
        self.parts.documents.clear();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.reset();
    }
}
