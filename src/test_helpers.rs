//! Shared test utilities for the simple-press test suite.
//!
//! Provides small documents, instrumented readers, and steps with
//! predictable output, plus an engine runner for step-level tests.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let engine = run_pipeline(
//!     tmp.path(),
//!     Pipeline::new("Test").step(CountStep::new("A").additional_outputs(2)),
//! );
//! assert_eq!(contents(engine.documents().get("Test").unwrap()), ["1", "2", "3"]);
//! ```

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::context::ExecutionContext;
use crate::document::{Body, Document, DocumentChanges};
use crate::engine::{Engine, EngineSettings};
use crate::metadata::Metadata;
use crate::pipeline::Pipeline;
use crate::step::{Step, StepError};

// =========================================================================
// Documents
// =========================================================================

/// A detached text document with no metadata.
pub fn text_doc(source: &str, text: &str) -> Document {
    Document::detached(source, Metadata::new(), Body::text(text))
}

/// Contents of documents in order. Panics on a disposed document.
pub fn contents(docs: &[Document]) -> Vec<String> {
    docs.iter().map(|d| d.content().unwrap().to_string()).collect()
}

/// A seekable in-memory reader that counts `read` calls.
pub struct CountingReader {
    inner: Cursor<Vec<u8>>,
    reads: Arc<AtomicUsize>,
}

impl CountingReader {
    pub fn new(bytes: Vec<u8>, reads: Arc<AtomicUsize>) -> Self {
        Self {
            inner: Cursor::new(bytes),
            reads,
        }
    }
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(buf)
    }
}

impl Seek for CountingReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

// =========================================================================
// Steps
// =========================================================================

/// Emits `additional_outputs + 1` clones per input. Each clone's content and
/// `key` metadata hold a running count that starts at 1 on every execution.
pub struct CountStep {
    key: String,
    additional_outputs: usize,
    executions: Arc<AtomicUsize>,
}

impl CountStep {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            additional_outputs: 0,
            executions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn additional_outputs(mut self, n: usize) -> Self {
        self.additional_outputs = n;
        self
    }

    /// Shared counter of `execute` calls.
    pub fn executions(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.executions)
    }
}

impl Step for CountStep {
    fn name(&self) -> &str {
        "Count"
    }

    fn execute(
        &self,
        inputs: &[Document],
        _ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let mut value = 0i64;
        let mut outputs = Vec::new();
        for input in inputs {
            for _ in 0..=self.additional_outputs {
                value += 1;
                outputs.push(input.clone_with(
                    DocumentChanges::new()
                        .content(value.to_string())
                        .meta(self.key.clone(), value),
                )?);
            }
        }
        Ok(outputs)
    }
}

/// Always fails with the given message.
pub struct FailStep {
    message: String,
}

impl FailStep {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl Step for FailStep {
    fn name(&self) -> &str {
        "Fail"
    }

    fn execute(
        &self,
        _inputs: &[Document],
        _ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        Err(StepError::failed(self.message.clone()))
    }
}

// =========================================================================
// Engine
// =========================================================================

/// Engine settings rooted at `root`, with `input/` and `output/` below it.
pub fn test_settings(root: &Path) -> EngineSettings {
    EngineSettings {
        root_folder: root.to_path_buf(),
        ..EngineSettings::default()
    }
}

/// Execute a single pipeline and return the engine holding its outputs.
///
/// The engine must outlive any document read from it; dropping it disposes
/// them.
pub fn run_pipeline(root: &Path, pipeline: Pipeline) -> Engine {
    let mut engine = Engine::new(test_settings(root));
    engine.add_pipeline(pipeline).unwrap();
    engine.execute().unwrap();
    engine
}
