//! Named, ordered step chains and their per-run bookkeeping.
//!
//! A [`Pipeline`] holds its steps plus a [`PipelineState`] shared (weakly)
//! with every document it creates. The state does two jobs during a run:
//!
//! - **Identity**: every non-empty document `source` created in the pipeline
//!   is registered; a second document claiming the same source fails with
//!   [`DocumentError::DuplicateSource`].
//! - **Disposal**: every document created in the pipeline is tracked. After
//!   each step, tracked documents that are no longer reachable from that
//!   step's outputs are disposed. Reachability follows document-valued
//!   metadata, so group members referenced from a group document survive.
//!
//! Inside an engine, clones are bound to the pipeline that is executing when
//! they are made, tracked by the engine's [`ActivePipeline`]. A document
//! carried into a later pipeline (see [`Pipeline::with_input`]) stays owned
//! by its home pipeline, but its clones register sources and join the
//! disposal registry of the pipeline that produced them.

use crate::context::ExecutionContext;
use crate::document::{Document, DocumentError};
use crate::engine::{EngineError, EngineParts};
use crate::metadata::{Metadata, Value};
use crate::step::Step;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, debug_span, info_span};

/// The pipeline an engine is currently executing, shared by all of its
/// pipeline states.
#[derive(Debug, Default)]
pub struct ActivePipeline {
    current: Mutex<Weak<PipelineState>>,
}

impl ActivePipeline {
    pub(crate) fn set(&self, state: &Arc<PipelineState>) {
        *lock(&self.current) = Arc::downgrade(state);
    }

    pub(crate) fn clear(&self) {
        *lock(&self.current) = Weak::new();
    }

    pub fn current(&self) -> Option<Arc<PipelineState>> {
        lock(&self.current).upgrade()
    }
}

/// Per-run identity and disposal registry of one pipeline.
pub struct PipelineState {
    name: String,
    sources: Mutex<HashSet<String>>,
    produced: Mutex<Vec<Document>>,
    active: Mutex<Weak<ActivePipeline>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PipelineState {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sources: Mutex::new(HashSet::new()),
            produced: Mutex::new(Vec::new()),
            active: Mutex::new(Weak::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join an engine's active-pipeline tracker.
    pub(crate) fn attach(&self, active: &Arc<ActivePipeline>) {
        *lock(&self.active) = Arc::downgrade(active);
    }

    /// The pipeline that should own documents derived from this pipeline's
    /// documents: the one executing right now, or this one outside a run.
    pub fn producer(self: &Arc<Self>) -> Arc<PipelineState> {
        lock(&self.active)
            .upgrade()
            .and_then(|active| active.current())
            .unwrap_or_else(|| Arc::clone(self))
    }

    /// Claim a source for this run. Empty sources are never registered.
    pub fn register_source(&self, source: &str) -> Result<(), DocumentError> {
        if source.is_empty() {
            return Ok(());
        }
        if !lock(&self.sources).insert(source.to_string()) {
            return Err(DocumentError::DuplicateSource {
                source_id: source.to_string(),
                pipeline: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Add a document to the disposal registry.
    pub fn track(&self, doc: &Document) {
        lock(&self.produced).push(doc.clone());
    }

    pub fn tracked_len(&self) -> usize {
        lock(&self.produced).len()
    }

    /// Dispose every tracked document and forget all sources.
    pub(crate) fn reset(&self) {
        let produced = std::mem::take(&mut *lock(&self.produced));
        for doc in &produced {
            doc.dispose();
        }
        lock(&self.sources).clear();
    }

    /// Dispose tracked documents not reachable from `live`. Returns the
    /// number of documents disposed.
    pub(crate) fn sweep(&self, live: &[Document]) -> usize {
        let mut reachable = HashSet::new();
        for doc in live {
            Value::Document(doc.clone()).collect_documents(&mut reachable);
        }
        let mut produced = lock(&self.produced);
        let before = produced.len();
        produced.retain(|doc| {
            let keep = reachable.contains(&doc.id());
            if !keep {
                doc.dispose();
            }
            keep
        });
        before - produced.len()
    }
}

impl fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineState")
            .field("name", &self.name)
            .field("sources", &lock(&self.sources).len())
            .field("tracked", &self.tracked_len())
            .finish()
    }
}

/// A named, ordered chain of steps.
pub struct Pipeline {
    name: String,
    steps: Vec<Box<dyn Step>>,
    metadata: Metadata,
    input: Option<String>,
    state: Arc<PipelineState>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let state = PipelineState::new(&name);
        Self {
            name,
            steps: Vec::new(),
            metadata: Metadata::new(),
            input: None,
            state,
        }
    }

    /// Append a step.
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = Box<dyn Step>>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Pipeline-scoped metadata, overlaid on the engine's global metadata for
    /// every document created in this pipeline.
    pub fn with_metadata<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.metadata = self.metadata.with_overlay(pairs);
        self
    }

    /// Start from the final outputs of an earlier pipeline instead of a
    /// single empty document.
    pub fn with_input(mut self, pipeline: impl Into<String>) -> Self {
        self.input = Some(pipeline.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    pub fn register_source(&self, source: &str) -> Result<(), DocumentError> {
        self.state.register_source(source)
    }

    pub fn track(&self, doc: &Document) {
        self.state.track(doc);
    }

    pub(crate) fn reset(&self) {
        self.state.reset();
    }

    /// Run every step in order, sweeping superseded documents after each.
    pub(crate) fn run(
        &self,
        inputs: Vec<Document>,
        base_metadata: &Metadata,
        parts: &EngineParts,
    ) -> Result<Vec<Document>, EngineError> {
        let span = info_span!("pipeline", name = %self.name);
        let _entered = span.enter();

        let mut docs = inputs;
        for (index, step) in self.steps.iter().enumerate() {
            let step_span = debug_span!("step", index, name = step.name());
            let _step_entered = step_span.enter();

            let ctx = ExecutionContext::new(parts, self, base_metadata, step.name());
            docs = step
                .execute(&docs, &ctx)
                .map_err(|source| EngineError::Step {
                    pipeline: self.name.clone(),
                    step: step.name().to_string(),
                    source,
                })?;
            let disposed = self.state.sweep(&docs);
            debug!(outputs = docs.len(), disposed, "step finished");
        }
        Ok(docs)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<&str> = self.steps.iter().map(|s| s.name()).collect();
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &steps)
            .field("input", &self.input)
            .finish()
    }
}
