//! The step contract and parameter plumbing shared by step implementations.
//!
//! A [`Step`] turns a list of input documents into a list of output
//! documents. Steps never mutate their inputs (documents are immutable); they
//! return new documents built with [`Document::clone_with`] or created through
//! the [`ExecutionContext`].
//!
//! Parameterized steps take a [`ValueSource`], which resolves a value either
//! statically, from the context, or per document. This keeps each step a
//! single capability while still letting configuration vary per document.

use crate::context::ExecutionContext;
use crate::document::{Document, DocumentError};
use crate::metadata::MetadataError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Failed(String),
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        StepError::Failed(message.into())
    }
}

/// A transformation from input documents to output documents.
pub trait Step: Send + Sync {
    /// Display name used in logs and error reports.
    fn name(&self) -> &str;

    fn execute(
        &self,
        inputs: &[Document],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError>;
}

impl<S: Step + ?Sized> Step for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn execute(
        &self,
        inputs: &[Document],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        (**self).execute(inputs, ctx)
    }
}

type ContextFn<T> = dyn Fn(&ExecutionContext<'_>) -> Result<T, StepError> + Send + Sync;
type DocumentFn<T> = dyn Fn(&Document, &ExecutionContext<'_>) -> Result<T, StepError> + Send + Sync;

/// A step parameter resolved per document.
pub enum ValueSource<T> {
    Static(T),
    Context(Arc<ContextFn<T>>),
    Document(Arc<DocumentFn<T>>),
}

impl<T: Clone> ValueSource<T> {
    pub fn from_context(
        f: impl Fn(&ExecutionContext<'_>) -> Result<T, StepError> + Send + Sync + 'static,
    ) -> Self {
        ValueSource::Context(Arc::new(f))
    }

    pub fn from_document(
        f: impl Fn(&Document, &ExecutionContext<'_>) -> Result<T, StepError> + Send + Sync + 'static,
    ) -> Self {
        ValueSource::Document(Arc::new(f))
    }

    /// Resolve for one document.
    pub fn resolve(&self, doc: &Document, ctx: &ExecutionContext<'_>) -> Result<T, StepError> {
        match self {
            ValueSource::Static(value) => Ok(value.clone()),
            ValueSource::Context(f) => f(ctx),
            ValueSource::Document(f) => f(doc, ctx),
        }
    }
}

impl<T: Clone> Clone for ValueSource<T> {
    fn clone(&self) -> Self {
        match self {
            ValueSource::Static(value) => ValueSource::Static(value.clone()),
            ValueSource::Context(f) => ValueSource::Context(Arc::clone(f)),
            ValueSource::Document(f) => ValueSource::Document(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Static(value) => f.debug_tuple("Static").field(value).finish(),
            ValueSource::Context(_) => f.write_str("Context(..)"),
            ValueSource::Document(_) => f.write_str("Document(..)"),
        }
    }
}

impl<T> From<T> for ValueSource<T> {
    fn from(value: T) -> Self {
        ValueSource::Static(value)
    }
}

impl From<&str> for ValueSource<String> {
    fn from(value: &str) -> Self {
        ValueSource::Static(value.to_string())
    }
}
