//! Append the outputs of child steps to the inputs.
//!
//! The child steps start from one new empty document, so they typically
//! begin with a reading step such as `ReadFiles`.

use crate::context::ExecutionContext;
use crate::document::Document;
use crate::metadata::Value;
use crate::step::{Step, StepError};

pub struct Concat {
    steps: Vec<Box<dyn Step>>,
}

impl Concat {
    pub fn new(steps: impl IntoIterator<Item = Box<dyn Step>>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }
}

impl Step for Concat {
    fn name(&self) -> &str {
        "Concat"
    }

    fn execute(
        &self,
        inputs: &[Document],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        let mut outputs = inputs.to_vec();
        outputs.extend(ctx.execute_new(&self.steps, Vec::<(String, Value)>::new())?);
        Ok(outputs)
    }
}
