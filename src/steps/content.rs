//! Replace, append to, or prepend to document content.

use crate::context::ExecutionContext;
use crate::document::Document;
use crate::step::{Step, StepError, ValueSource};
use serde::Deserialize;

/// Where new text goes relative to the existing content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentPosition {
    #[default]
    Replace,
    Append,
    Prepend,
}

pub struct Content {
    text: ValueSource<String>,
    position: ContentPosition,
}

impl Content {
    pub fn new(text: impl Into<ValueSource<String>>) -> Self {
        Self {
            text: text.into(),
            position: ContentPosition::Replace,
        }
    }

    pub fn append(text: impl Into<ValueSource<String>>) -> Self {
        Self::new(text).at(ContentPosition::Append)
    }

    pub fn prepend(text: impl Into<ValueSource<String>>) -> Self {
        Self::new(text).at(ContentPosition::Prepend)
    }

    pub fn at(mut self, position: ContentPosition) -> Self {
        self.position = position;
        self
    }
}

impl Step for Content {
    fn name(&self) -> &str {
        "Content"
    }

    fn execute(
        &self,
        inputs: &[Document],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        inputs
            .iter()
            .map(|doc| -> Result<Document, StepError> {
                let text = self.text.resolve(doc, ctx)?;
                let content = match self.position {
                    ContentPosition::Replace => text,
                    ContentPosition::Append => format!("{}{text}", doc.content()?),
                    ContentPosition::Prepend => format!("{text}{}", doc.content()?),
                };
                Ok(doc.clone_with_content(content, Vec::<(String, String)>::new())?)
            })
            .collect()
    }
}
