//! Run arbitrary code as a step.

use crate::context::ExecutionContext;
use crate::document::Document;
use crate::step::{Step, StepError};

type ExecuteFn =
    dyn Fn(&[Document], &ExecutionContext<'_>) -> Result<Vec<Document>, StepError> + Send + Sync;

pub struct Execute {
    f: Box<ExecuteFn>,
}

impl Execute {
    /// Run `f` over the whole input list.
    pub fn new(
        f: impl Fn(&[Document], &ExecutionContext<'_>) -> Result<Vec<Document>, StepError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self { f: Box::new(f) }
    }

    /// Run `f` once per input and concatenate the results.
    pub fn per_document(
        f: impl Fn(&Document, &ExecutionContext<'_>) -> Result<Vec<Document>, StepError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::new(move |inputs, ctx| {
            let mut outputs = Vec::new();
            for doc in inputs {
                outputs.extend(f(doc, ctx)?);
            }
            Ok(outputs)
        })
    }
}

impl Step for Execute {
    fn name(&self) -> &str {
        "Execute"
    }

    fn execute(
        &self,
        inputs: &[Document],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        (self.f)(inputs, ctx)
    }
}
