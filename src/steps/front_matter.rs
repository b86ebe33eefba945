//! Split front matter off the top of a document into metadata.
//!
//! Two formats are recognized:
//!
//! ```text
//! +++                        {
//! title = "Hello"              "title": "Hello",
//! tags = ["a", "b"]            "tags": ["a", "b"]
//! +++                        }
//! body...                    body...
//! ```
//!
//! TOML between `+++` lines, or a JSON object at the very start. Top-level
//! keys become metadata (nested tables stay tables). The remaining text
//! becomes the content. Documents without front matter pass through.

use crate::context::ExecutionContext;
use crate::document::{Document, DocumentChanges};
use crate::metadata::Value;
use crate::step::{Step, StepError};
use tracing::debug;

const TOML_DELIMITER: &str = "+++";

#[derive(Debug, Default)]
pub struct FrontMatter;

impl FrontMatter {
    pub fn new() -> Self {
        Self
    }
}

/// Parsed front matter and the byte offset where the body starts.
#[derive(Debug, PartialEq)]
pub struct Split {
    pub metadata: Vec<(String, Value)>,
    pub body_start: usize,
}

/// Parse front matter from `text`. `Ok(None)` when there is none.
pub fn split_front_matter(text: &str) -> Result<Option<Split>, String> {
    if let Some(split) = split_toml(text)? {
        return Ok(Some(split));
    }
    split_json(text)
}

fn split_toml(text: &str) -> Result<Option<Split>, String> {
    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(None);
    };
    if first.trim_end() != TOML_DELIMITER {
        return Ok(None);
    }
    let start = first.len();
    let mut offset = start;
    for line in lines {
        if line.trim_end() == TOML_DELIMITER {
            let table: toml::Table =
                toml::from_str(&text[start..offset]).map_err(|e| e.to_string())?;
            let metadata = table
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect();
            return Ok(Some(Split {
                metadata,
                body_start: offset + line.len(),
            }));
        }
        offset += line.len();
    }
    Err("unterminated +++ front matter".to_string())
}

fn split_json(text: &str) -> Result<Option<Split>, String> {
    if !text.starts_with('{') {
        return Ok(None);
    }
    let mut stream =
        serde_json::Deserializer::from_str(text).into_iter::<serde_json::Map<String, serde_json::Value>>();
    match stream.next() {
        Some(Ok(map)) => {
            let mut body_start = stream.byte_offset();
            let rest = &text[body_start..];
            // Drop the line break that closes the object.
            if let Some(stripped) = rest.strip_prefix("\r\n") {
                body_start += rest.len() - stripped.len();
            } else if rest.starts_with('\n') {
                body_start += 1;
            }
            let metadata = map.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
            Ok(Some(Split {
                metadata,
                body_start,
            }))
        }
        Some(Err(e)) => Err(e.to_string()),
        None => Ok(None),
    }
}

impl Step for FrontMatter {
    fn name(&self) -> &str {
        "FrontMatter"
    }

    fn execute(
        &self,
        inputs: &[Document],
        _ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for doc in inputs {
            let content = doc.content()?;
            let split = split_front_matter(&content).map_err(|e| {
                StepError::failed(format!("Invalid front matter in '{}': {e}", doc.source()))
            })?;
            match split {
                Some(Split {
                    metadata,
                    body_start,
                }) => {
                    debug!(source = doc.source(), keys = metadata.len(), "front matter");
                    outputs.push(doc.clone_with(
                        DocumentChanges::new()
                            .content(&content[body_start..])
                            .metadata(metadata),
                    )?);
                }
                None => outputs.push(doc.clone()),
            }
        }
        Ok(outputs)
    }
}
