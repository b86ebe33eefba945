//! # Simple Press
//!
//! A pipeline-driven static content generator. Documents (immutable content
//! plus layered metadata) flow through named pipelines of steps; the engine
//! runs the pipelines in order and keeps a cache that makes repeated runs in
//! watch mode cheap.
//!
//! # Architecture: Documents Through Pipelines
//!
//! ```text
//! config.toml ─▶ Engine ─▶ Pipeline "Content"   ─▶ [ReadFiles → FrontMatter → Markdown → WriteFiles]
//!                       ─▶ Pipeline "Resources" ─▶ [ReadFiles → WriteFiles]
//!                       ─▶ ...                      (each step: &[Document] → Vec<Document>)
//! ```
//!
//! Each pipeline starts from one empty document carrying the global and
//! pipeline metadata (or from the outputs of an earlier pipeline), and every
//! step maps a list of documents to a new list. Later pipelines can read the
//! outputs of earlier ones through the execution context.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`metadata`] | Layered, immutable key/value store with typed conversion |
//! | [`document`] | Immutable documents, lazily materialized content, stream access |
//! | [`step`] | The [`step::Step`] trait and [`step::ValueSource`] parameters |
//! | [`steps`] | Built-in steps and their configuration form |
//! | [`pipeline`] | Named step lists and per-pipeline document bookkeeping |
//! | [`context`] | What a running step can see and create |
//! | [`engine`] | Settings, pipeline registration, a full run |
//! | [`cache`] | Content-addressed execution cache shared across runs |
//! | [`documents`] | Outputs of finished pipelines and lookup helpers |
//! | [`config`] | `config.toml` loading, validation, and the stock configuration |
//! | [`watch`] | File watching and the rebuild loop |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Immutable Documents
//!
//! A step never changes a document; it clones it with changes. Clones share
//! the parent's metadata layers and, when content is unchanged, the content
//! itself. Documents a pipeline stops referencing are disposed after each
//! step, which releases any file stream they own.
//!
//! ## Sequential Pipelines, Parallel Steps
//!
//! Pipelines and steps run one after another, so a step can rely on every
//! earlier pipeline having finished. Fan-out is left to the step: reading
//! files and rendering markdown use rayon internally.
//!
//! ## Configuration as Data
//!
//! Pipelines are plain TOML. The step list is an externally tagged enum, so
//! `{ Markdown = {} }` in the file maps straight to a built-in step, and
//! unknown step names or fields are rejected before anything runs.

pub mod cache;
pub mod config;
pub mod context;
pub mod document;
pub mod documents;
pub mod engine;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod step;
pub mod steps;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
