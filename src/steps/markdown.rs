//! Render markdown to HTML with pulldown-cmark.
//!
//! By default the document content is rendered and replaced. With
//! [`Markdown::for_key`] a metadata value is rendered instead and written
//! back under the same key, leaving the content alone.
//!
//! Rendered content is cached per document fingerprint, so unchanged files
//! are not re-rendered on later runs of the same engine.

use crate::cache::document_fingerprint;
use crate::context::ExecutionContext;
use crate::document::Document;
use crate::step::{Step, StepError};
use pulldown_cmark::{Options, Parser, html};
use rayon::prelude::*;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Markdown {
    key: Option<String>,
}

impl Markdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the string under `key` instead of the content.
    pub fn for_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }

    fn render_content(
        &self,
        doc: &Document,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Document, StepError> {
        let cache_key = format!("markdown:{}", document_fingerprint(doc)?);
        let rendered = match ctx.cache().get_as::<String>(&cache_key)? {
            Some(html) => {
                debug!(source = doc.source(), "markdown cache hit");
                html.as_ref().clone()
            }
            None => {
                let html = render(&doc.content()?);
                ctx.cache().set(&cache_key, html.clone())?;
                html
            }
        };
        Ok(doc.clone_with_content(rendered, Vec::<(String, String)>::new())?)
    }

    fn render_key(&self, doc: &Document, key: &str) -> Result<Document, StepError> {
        match doc.string(key) {
            Some(text) => Ok(doc.clone_with_metadata([(key, render(&text))])?),
            None => Ok(doc.clone()),
        }
    }
}

/// Markdown to HTML with tables, footnotes, strikethrough and task lists.
pub fn render(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

impl Step for Markdown {
    fn name(&self) -> &str {
        "Markdown"
    }

    fn execute(
        &self,
        inputs: &[Document],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        let span = ctx.span();
        inputs
            .par_iter()
            .map(|doc| {
                let _entered = span.enter();
                match &self.key {
                    Some(key) => self.render_key(doc, key),
                    None => self.render_content(doc, ctx),
                }
            })
            .collect()
    }
}
