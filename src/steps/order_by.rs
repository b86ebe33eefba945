//! Stable sort of documents by a computed key.

use crate::context::ExecutionContext;
use crate::document::Document;
use crate::metadata::Value;
use crate::step::{Step, StepError, ValueSource};

pub struct OrderBy {
    key: ValueSource<Value>,
    descending: bool,
}

impl OrderBy {
    pub fn new(
        key: impl Fn(&Document, &ExecutionContext<'_>) -> Result<Value, StepError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: ValueSource::from_document(key),
            descending: false,
        }
    }

    /// Order by the value of a metadata key; missing values sort first.
    pub fn by_key(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(move |doc, _| Ok(doc.get(&key).cloned().unwrap_or(Value::Null)))
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }
}

impl Step for OrderBy {
    fn name(&self) -> &str {
        "OrderBy"
    }

    fn execute(
        &self,
        inputs: &[Document],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        let mut keyed: Vec<(Value, Document)> = Vec::with_capacity(inputs.len());
        for doc in inputs {
            keyed.push((self.key.resolve(doc, ctx)?, doc.clone()));
        }
        if self.descending {
            keyed.sort_by(|(a, _), (b, _)| b.compare(a));
        } else {
            keyed.sort_by(|(a, _), (b, _)| a.compare(b));
        }
        Ok(keyed.into_iter().map(|(_, doc)| doc).collect())
    }
}
