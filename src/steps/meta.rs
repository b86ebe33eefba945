//! Add one metadata value to every document.

use crate::context::ExecutionContext;
use crate::document::Document;
use crate::metadata::Value;
use crate::step::{Step, StepError, ValueSource};

pub struct Meta {
    key: String,
    value: ValueSource<Value>,
}

impl Meta {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::from_source(key, ValueSource::Static(value.into()))
    }

    pub fn from_source(key: impl Into<String>, value: ValueSource<Value>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl Step for Meta {
    fn name(&self) -> &str {
        "Meta"
    }

    fn execute(
        &self,
        inputs: &[Document],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        inputs
            .iter()
            .map(|doc| -> Result<Document, StepError> {
                let value = self.value.resolve(doc, ctx)?;
                Ok(doc.clone_with_metadata([(self.key.as_str(), value)])?)
            })
            .collect()
    }
}
