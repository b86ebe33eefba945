//! The per-invocation facade handed to every step.
//!
//! An [`ExecutionContext`] binds together the engine's shared parts
//! (settings, cache, finished pipeline outputs), the running pipeline and the
//! name of the invoking step. Steps create documents, run nested steps and
//! reach the cache only through it.

use crate::cache::ExecutionCache;
use crate::document::{Body, Document, DocumentError};
use crate::documents::DocumentCollection;
use crate::engine::{EngineParts, EngineSettings};
use crate::metadata::{FromValue, Metadata, Value, convert};
use crate::pipeline::Pipeline;
use crate::step::{Step, StepError};
use std::path::{Path, PathBuf};
use tracing::Span;

pub struct ExecutionContext<'a> {
    parts: &'a EngineParts,
    pipeline: &'a Pipeline,
    base_metadata: &'a Metadata,
    step: &'a str,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        parts: &'a EngineParts,
        pipeline: &'a Pipeline,
        base_metadata: &'a Metadata,
        step: &'a str,
    ) -> Self {
        Self {
            parts,
            pipeline,
            base_metadata,
            step,
        }
    }

    pub fn pipeline_name(&self) -> &str {
        self.pipeline.name()
    }

    pub fn step_name(&self) -> &str {
        self.step
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.parts.settings
    }

    pub fn root_folder(&self) -> &Path {
        &self.parts.settings.root_folder
    }

    /// Input folder resolved against the root folder.
    pub fn input_folder(&self) -> PathBuf {
        self.parts.settings.input_path()
    }

    /// Output folder resolved against the root folder.
    pub fn output_folder(&self) -> PathBuf {
        self.parts.settings.output_path()
    }

    /// Global metadata overlaid with the running pipeline's metadata.
    pub fn metadata(&self) -> &Metadata {
        self.base_metadata
    }

    pub fn cache(&self) -> &ExecutionCache {
        &self.parts.cache
    }

    /// Final outputs of pipelines that already finished in this run.
    pub fn documents(&self) -> &DocumentCollection {
        &self.parts.documents
    }

    /// Convert a value with the same rules as typed metadata reads.
    pub fn convert<T: FromValue>(&self, value: &Value) -> Option<T> {
        convert(value)
    }

    /// A new document without a source.
    pub fn new_document<K, V>(
        &self,
        body: impl Into<Body>,
        metadata: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Document, DocumentError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.new_document_with_source("", body, metadata)
    }

    /// A new document with a source, registered for uniqueness in the
    /// running pipeline.
    pub fn new_document_with_source<K, V>(
        &self,
        source: impl Into<String>,
        body: impl Into<Body>,
        metadata: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Document, DocumentError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Document::create(
            self.pipeline.state(),
            source.into(),
            self.base_metadata.with_overlay(metadata),
            body.into(),
        )
    }

    /// A new empty document carrying only the base metadata.
    pub fn new_empty_document(&self) -> Result<Document, DocumentError> {
        self.new_document(Body::Empty, Vec::<(String, Value)>::new())
    }

    /// Run steps in order over `inputs` and return the last step's outputs.
    ///
    /// Nested runs create documents in the running pipeline but do not sweep;
    /// the outer step's outputs decide what survives.
    pub fn execute_steps(
        &self,
        steps: &[Box<dyn Step>],
        inputs: &[Document],
    ) -> Result<Vec<Document>, StepError> {
        let mut docs = inputs.to_vec();
        for step in steps {
            let ctx = ExecutionContext::new(self.parts, self.pipeline, self.base_metadata, step.name());
            docs = step.execute(&docs, &ctx)?;
        }
        Ok(docs)
    }

    /// Run steps starting from one new empty document with extra metadata.
    pub fn execute_new<K, V>(
        &self,
        steps: &[Box<dyn Step>],
        metadata: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Vec<Document>, StepError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let seed = self.new_document(Body::Empty, metadata)?;
        self.execute_steps(steps, &[seed])
    }

    /// The span of the running step, for carrying it into worker threads.
    pub fn span(&self) -> Span {
        Span::current()
    }
}
