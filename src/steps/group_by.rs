//! Group documents by a computed key.
//!
//! Child steps (if any) run first over the inputs; their outputs are then
//! grouped. Each group becomes a new empty document carrying the key under
//! `GroupKey` and the members, in input order, under `GroupDocuments`. Groups
//! appear in order of first occurrence. Documents whose key is null are left
//! out.

use crate::context::ExecutionContext;
use crate::document::{Body, Document};
use crate::metadata::{Value, keys};
use crate::step::{Step, StepError, ValueSource};

pub struct GroupBy {
    key: ValueSource<Value>,
    steps: Vec<Box<dyn Step>>,
}

impl GroupBy {
    pub fn new(
        key: impl Fn(&Document, &ExecutionContext<'_>) -> Result<Value, StepError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: ValueSource::from_document(key),
            steps: Vec::new(),
        }
    }

    /// Group by the value of a metadata key.
    pub fn by_key(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(move |doc, _| Ok(doc.get(&key).cloned().unwrap_or(Value::Null)))
    }

    /// Run this step over the inputs before grouping.
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = Box<dyn Step>>) -> Self {
        self.steps.extend(steps);
        self
    }
}

impl Step for GroupBy {
    fn name(&self) -> &str {
        "GroupBy"
    }

    fn execute(
        &self,
        inputs: &[Document],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        let docs = if self.steps.is_empty() {
            inputs.to_vec()
        } else {
            ctx.execute_steps(&self.steps, inputs)?
        };

        let mut groups: Vec<(Value, Vec<Document>)> = Vec::new();
        for doc in docs {
            let key = self.key.resolve(&doc, ctx)?;
            if key == Value::Null {
                continue;
            }
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(doc),
                None => groups.push((key, vec![doc])),
            }
        }

        groups
            .into_iter()
            .map(|(key, members)| {
                ctx.new_document(
                    Body::Empty,
                    [
                        (keys::GROUP_KEY, key),
                        (keys::GROUP_DOCUMENTS, Value::documents(members)),
                    ],
                )
                .map_err(StepError::from)
            })
            .collect()
    }
}
