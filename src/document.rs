//! Immutable documents with lazily materialized content.
//!
//! A [`Document`] is the unit that flows between pipeline steps. It combines:
//!
//! - a `source` identity string (empty means "no origin"),
//! - a [`Metadata`] store,
//! - a content body that is either text or a byte stream.
//!
//! `Document` is a cheap handle (`Arc` inside): cloning the handle with
//! [`Clone::clone`] yields the *same* document. Producing a *new* document
//! from an existing one goes through [`Document::clone_with`], which is the
//! only way steps "modify" a document.
//!
//! # Content materialization
//!
//! At most one of {text, stream} is authoritative. The other is derived on
//! first access and cached in the document's content cell:
//!
//! ```text
//! stream-backed ── content() ──► text cached, stream kept for open_stream()
//! text-backed ─── open_stream() ─► in-memory stream over the UTF-8 bytes
//! ```
//!
//! The cell is guarded by a mutex. [`Document::content`] and
//! [`Document::open_stream`] both take it, so concurrent readers of the same
//! document block instead of observing each other's stream positions. The
//! [`StreamGuard`] returned by `open_stream` holds the lock until dropped.
//!
//! Non-seekable readers ([`Body::Reader`]) are buffered into memory on first
//! access so content can be re-read from position zero any number of times.
//!
//! # Ownership and disposal
//!
//! A document either owns its stream or borrows it (the stream is released
//! when the last document sharing the content cell is dropped). A
//! metadata-only [`Document::clone_with`] shares the content cell, and a
//! clone of an owner becomes a co-owner. The cell counts its owners; an owned
//! stream is released when the last owner is disposed, so disposing one
//! document never takes content away from another live one.
//!
//! Disposal is idempotent and terminal for content. Metadata stays readable.

use crate::metadata::{FromValue, Metadata, MetadataError, Value};
use crate::pipeline::PipelineState;
use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;

/// Characters returned by [`Document::preview`].
pub const PREVIEW_CHARS: usize = 128;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document '{0}' has been disposed")]
    Disposed(String),
    #[error("Document stream is not readable: {0}")]
    InvalidStream(#[source] io::Error),
    #[error("Duplicate document source '{source_id}' in pipeline {pipeline}")]
    DuplicateSource { source_id: String, pipeline: String },
}

/// A readable, seekable stream that can move between threads.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Content supplied when creating or cloning a document.
pub enum Body {
    Empty,
    Text(String),
    /// A seekable stream. With `dispose: true` the document owns it and
    /// releases it on disposal.
    Stream {
        stream: Box<dyn ReadSeek>,
        dispose: bool,
    },
    /// A forward-only reader. Buffered into memory on first access; the
    /// buffer is always owned by the document.
    Reader(Box<dyn Read + Send>),
}

impl Body {
    pub fn text(text: impl Into<String>) -> Self {
        Body::Text(text.into())
    }

    /// An owned seekable stream.
    pub fn stream(stream: impl ReadSeek + 'static) -> Self {
        Body::Stream {
            stream: Box::new(stream),
            dispose: true,
        }
    }

    /// A seekable stream the document should not release on disposal.
    pub fn borrowed_stream(stream: impl ReadSeek + 'static) -> Self {
        Body::Stream {
            stream: Box::new(stream),
            dispose: false,
        }
    }

    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        Body::Reader(Box::new(reader))
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

// ============================================================================
// Content cell
// ============================================================================

enum StreamSlot {
    Absent,
    Seekable(Box<dyn ReadSeek>),
    Unbuffered(Box<dyn Read + Send>),
    Released,
}

struct ContentState {
    text: Option<Arc<str>>,
    stream: StreamSlot,
}

impl ContentState {
    /// The seekable stream, buffering a forward-only reader first.
    /// `Ok(None)` when the document never had a stream.
    fn seekable(&mut self, source: &str) -> Result<Option<&mut Box<dyn ReadSeek>>, DocumentError> {
        if let StreamSlot::Unbuffered(reader) = &mut self.stream {
            let mut bytes = Vec::new();
            reader
                .read_to_end(&mut bytes)
                .map_err(DocumentError::InvalidStream)?;
            self.stream = StreamSlot::Seekable(Box::new(Cursor::new(bytes)));
        }
        match &mut self.stream {
            StreamSlot::Seekable(stream) => Ok(Some(stream)),
            StreamSlot::Released => Err(DocumentError::Disposed(source.to_string())),
            StreamSlot::Absent | StreamSlot::Unbuffered(_) => Ok(None),
        }
    }
}

struct ContentCell {
    state: Mutex<ContentState>,
    /// Documents holding a share of stream ownership.
    owners: AtomicUsize,
}

impl ContentCell {
    fn new(body: Body) -> (Arc<Self>, bool) {
        let (text, stream, owns) = match body {
            Body::Empty => (None, StreamSlot::Absent, false),
            Body::Text(text) => (Some(Arc::from(text)), StreamSlot::Absent, false),
            Body::Stream { stream, dispose } => (None, StreamSlot::Seekable(stream), dispose),
            Body::Reader(reader) => (None, StreamSlot::Unbuffered(reader), true),
        };
        let cell = ContentCell {
            state: Mutex::new(ContentState { text, stream }),
            owners: AtomicUsize::new(usize::from(owns)),
        };
        (Arc::new(cell), owns)
    }

    /// Take another share of ownership for a clone.
    fn acquire(&self) {
        self.owners.fetch_add(1, Ordering::SeqCst);
    }

    /// Give up one share; the last owner out releases the stream.
    fn release(&self) {
        if self.owners.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.lock().stream = StreamSlot::Released;
        }
    }

    fn lock(&self) -> MutexGuard<'_, ContentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decode bytes as text, honoring a byte order mark.
///
/// UTF-8 BOMs are stripped, UTF-16 BOMs select the matching decoder, and
/// everything else is read as UTF-8 with invalid sequences replaced.
pub fn decode_text(bytes: &[u8]) -> String {
    fn utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
        let units: Vec<u16> = bytes.chunks_exact(2).map(|c| unit([c[0], c[1]])).collect();
        String::from_utf16_lossy(&units)
    }

    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        utf16(rest, u16::from_le_bytes)
    } else if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        utf16(rest, u16::from_be_bytes)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

// ============================================================================
// Document
// ============================================================================

struct DocumentInner {
    id: u64,
    source: String,
    metadata: Metadata,
    content: Arc<ContentCell>,
    owns_stream: AtomicBool,
    disposed: AtomicBool,
    /// Non-owning link to the bookkeeping of the pipeline that produced this
    /// document, used only to register new sources and track derived
    /// documents.
    pipeline: Weak<PipelineState>,
}

/// Shared handle to an immutable document.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl Document {
    /// Create a document bound to a pipeline run: a non-empty `source` is
    /// registered for uniqueness and the document joins the disposal registry.
    pub(crate) fn create(
        pipeline: &Arc<PipelineState>,
        source: String,
        metadata: Metadata,
        body: Body,
    ) -> Result<Document, DocumentError> {
        pipeline.register_source(&source)?;
        let (content, owns) = ContentCell::new(body);
        let doc = Self::assemble(source, metadata, content, owns, Arc::downgrade(pipeline));
        pipeline.track(&doc);
        Ok(doc)
    }

    /// Create a document outside any pipeline. No identity registration and
    /// no disposal tracking happen for it or for documents cloned from it.
    pub fn detached(source: impl Into<String>, metadata: Metadata, body: Body) -> Document {
        let (content, owns) = ContentCell::new(body);
        Self::assemble(source.into(), metadata, content, owns, Weak::new())
    }

    fn assemble(
        source: String,
        metadata: Metadata,
        content: Arc<ContentCell>,
        owns_stream: bool,
        pipeline: Weak<PipelineState>,
    ) -> Document {
        Document {
            inner: Arc::new(DocumentInner {
                id: NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed),
                source,
                metadata,
                content,
                owns_stream: AtomicBool::new(owns_stream),
                disposed: AtomicBool::new(false),
                pipeline,
            }),
        }
    }

    /// Process-unique identity of this document value.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.metadata.get(key)
    }

    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<T, MetadataError> {
        self.inner.metadata.get_as(key)
    }

    pub fn get_or<T: FromValue>(&self, key: &str, default: T) -> T {
        self.inner.metadata.get_or(key, default)
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.inner.metadata.string(key)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    fn check_disposed(&self) -> Result<(), DocumentError> {
        if self.is_disposed() {
            return Err(DocumentError::Disposed(self.inner.source.clone()));
        }
        Ok(())
    }

    /// The content as text, materialized from the stream on first call.
    pub fn content(&self) -> Result<Arc<str>, DocumentError> {
        self.check_disposed()?;
        let mut state = self.inner.content.lock();
        if let Some(text) = &state.text {
            return Ok(Arc::clone(text));
        }
        let text: Arc<str> = match state.seekable(&self.inner.source)? {
            Some(stream) => {
                stream
                    .seek(SeekFrom::Start(0))
                    .map_err(DocumentError::InvalidStream)?;
                let mut bytes = Vec::new();
                stream
                    .read_to_end(&mut bytes)
                    .map_err(DocumentError::InvalidStream)?;
                Arc::from(decode_text(&bytes))
            }
            None => Arc::from(""),
        };
        state.text = Some(Arc::clone(&text));
        Ok(text)
    }

    /// Open the content stream, positioned at the start.
    ///
    /// The returned guard holds the document's content lock: other callers of
    /// `open_stream` or `content` on this document block until it is dropped.
    pub fn open_stream(&self) -> Result<StreamGuard<'_>, DocumentError> {
        self.check_disposed()?;
        let mut state = self.inner.content.lock();
        if state.seekable(&self.inner.source)?.is_none() {
            let bytes = state
                .text
                .as_ref()
                .map(|t| t.as_bytes().to_vec())
                .unwrap_or_default();
            state.stream = StreamSlot::Seekable(Box::new(Cursor::new(bytes)));
        }
        if let StreamSlot::Seekable(stream) = &mut state.stream {
            stream
                .seek(SeekFrom::Start(0))
                .map_err(DocumentError::InvalidStream)?;
        }
        Ok(StreamGuard { state })
    }

    /// Produce a new document from this one.
    ///
    /// - the clone belongs to the pipeline executing now (see
    ///   [`PipelineState::producer`]), which registers a new `source`
    ///   (duplicates fail) and tracks the clone for disposal;
    /// - new text drops the stream, a new stream drops the cached text;
    /// - without a body change the content cell is shared, and the clone of
    ///   an owning document becomes a co-owner.
    pub fn clone_with(&self, changes: DocumentChanges) -> Result<Document, DocumentError> {
        self.check_disposed()?;
        let pipeline = self.inner.pipeline.upgrade().map(|home| home.producer());
        let source = match changes.source {
            Some(source) => {
                if let Some(p) = &pipeline {
                    p.register_source(&source)?;
                }
                source
            }
            None => self.inner.source.clone(),
        };
        let metadata = self.inner.metadata.with_overlay(changes.metadata);
        let (content, owns) = match changes.body {
            Some(body) => ContentCell::new(body),
            None => {
                let owns = self.inner.owns_stream.load(Ordering::SeqCst);
                if owns {
                    self.inner.content.acquire();
                }
                (Arc::clone(&self.inner.content), owns)
            }
        };
        let owner = pipeline.as_ref().map(Arc::downgrade).unwrap_or_default();
        let doc = Self::assemble(source, metadata, content, owns, owner);
        if let Some(p) = &pipeline {
            p.track(&doc);
        }
        Ok(doc)
    }

    /// Shorthand for a clone with new text and extra metadata.
    pub fn clone_with_content<K, V>(
        &self,
        content: impl Into<String>,
        metadata: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Document, DocumentError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.clone_with(DocumentChanges::new().content(content).metadata(metadata))
    }

    /// Shorthand for a metadata-only clone.
    pub fn clone_with_metadata<K, V>(
        &self,
        metadata: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Document, DocumentError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.clone_with(DocumentChanges::new().metadata(metadata))
    }

    /// Give up this document's share of the stream and mark it disposed.
    /// The stream itself is released with the last owning document.
    /// Calling this more than once has no further effect.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.inner.owns_stream.swap(false, Ordering::SeqCst) {
            self.inner.content.release();
        }
    }

    /// Up to the first [`PREVIEW_CHARS`] characters of content, for
    /// diagnostics. Empty when disposed or unreadable; never fails.
    pub fn preview(&self) -> String {
        if self.is_disposed() {
            return String::new();
        }
        let mut state = self.inner.content.lock();
        if let Some(text) = &state.text {
            return text.chars().take(PREVIEW_CHARS).collect();
        }
        let Ok(Some(stream)) = state.seekable(&self.inner.source) else {
            return String::new();
        };
        if stream.seek(SeekFrom::Start(0)).is_err() {
            return String::new();
        }
        // Four bytes per char covers any UTF-8 prefix of PREVIEW_CHARS chars.
        let mut bytes = Vec::new();
        if stream
            .take((PREVIEW_CHARS * 4) as u64)
            .read_to_end(&mut bytes)
            .is_err()
        {
            return String::new();
        }
        decode_text(&bytes).chars().take(PREVIEW_CHARS).collect()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("metadata", &self.inner.metadata)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.preview())
    }
}

/// Two handles are equal when they refer to the same document value.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Document {}

/// Changes applied by [`Document::clone_with`].
#[derive(Default)]
pub struct DocumentChanges {
    source: Option<String>,
    body: Option<Body>,
    metadata: Vec<(String, Value)>,
}

impl DocumentChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn content(mut self, text: impl Into<String>) -> Self {
        self.body = Some(Body::Text(text.into()));
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn metadata<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.metadata
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// Exclusive, scoped access to a document's content stream.
///
/// Dropping the guard releases the document's content lock.
pub struct StreamGuard<'a> {
    state: MutexGuard<'a, ContentState>,
}

impl StreamGuard<'_> {
    fn stream(&mut self) -> io::Result<&mut Box<dyn ReadSeek>> {
        match &mut self.state.stream {
            StreamSlot::Seekable(stream) => Ok(stream),
            _ => Err(io::Error::other("document stream is not available")),
        }
    }
}

impl Read for StreamGuard<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.read(buf)
    }
}

impl Seek for StreamGuard<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.stream()?.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{CountingReader, text_doc};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, Mutex as StdMutex};
    use std::thread;
    use std::time::Duration;

    fn stream_doc(bytes: &[u8]) -> Document {
        Document::detached("s", Metadata::new(), Body::stream(Cursor::new(bytes.to_vec())))
    }

    // =========================================================================
    // Content materialization
    // =========================================================================

    #[test]
    fn text_content_is_returned_as_is() {
        let doc = text_doc("a", "hello");
        assert_eq!(&*doc.content().unwrap(), "hello");
    }

    #[test]
    fn stream_content_decodes_utf8() {
        let doc = stream_doc("héllo wörld".as_bytes());
        assert_eq!(&*doc.content().unwrap(), "héllo wörld");
    }

    #[test]
    fn content_is_read_from_stream_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let reader = CountingReader::new(b"counted".to_vec(), Arc::clone(&reads));
        let doc = Document::detached("c", Metadata::new(), Body::stream(reader));

        assert_eq!(&*doc.content().unwrap(), "counted");
        let after_first = reads.load(Ordering::SeqCst);
        assert!(after_first > 0);
        assert_eq!(&*doc.content().unwrap(), "counted");
        assert_eq!(reads.load(Ordering::SeqCst), after_first);
    }

    #[test]
    fn empty_document_has_empty_content() {
        let doc = Document::detached("", Metadata::new(), Body::Empty);
        assert_eq!(&*doc.content().unwrap(), "");
        let mut out = String::new();
        doc.open_stream().unwrap().read_to_string(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let doc = stream_doc(&[0xEF, 0xBB, 0xBF, b'h', b'i']);
        assert_eq!(&*doc.content().unwrap(), "hi");
    }

    #[test]
    fn utf16_le_bom_selects_utf16() {
        let doc = stream_doc(&[0xFF, 0xFE, b'o', 0, b'k', 0]);
        assert_eq!(&*doc.content().unwrap(), "ok");
    }

    #[test]
    fn forward_only_reader_is_buffered_and_rereadable() {
        let reader: &'static [u8] = b"once only";
        let doc = Document::detached("r", Metadata::new(), Body::reader(reader));

        let mut first = String::new();
        doc.open_stream().unwrap().read_to_string(&mut first).unwrap();
        let mut second = String::new();
        doc.open_stream().unwrap().read_to_string(&mut second).unwrap();
        assert_eq!(first, "once only");
        assert_eq!(second, "once only");
        assert_eq!(&*doc.content().unwrap(), "once only");
    }

    #[test]
    fn failing_reader_reports_invalid_stream() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("boom"))
            }
        }
        let doc = Document::detached("b", Metadata::new(), Body::reader(Broken));
        assert!(matches!(doc.content(), Err(DocumentError::InvalidStream(_))));
    }

    #[test]
    fn open_stream_over_text_yields_bytes() {
        let doc = text_doc("t", "from text");
        let mut out = String::new();
        doc.open_stream().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "from text");
    }

    #[test]
    fn open_stream_always_starts_at_zero() {
        let doc = stream_doc(b"abcdef");
        {
            let mut guard = doc.open_stream().unwrap();
            let mut buf = [0u8; 3];
            guard.read_exact(&mut buf).unwrap();
        }
        let mut out = String::new();
        doc.open_stream().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "abcdef");
    }

    // =========================================================================
    // Concurrency
    // =========================================================================

    #[test]
    fn concurrent_stream_access_is_serialized() {
        let doc = stream_doc(b"shared");
        let events = Arc::new(StdMutex::new(Vec::new()));
        let barrier = Arc::new(Barrier::new(2));

        let first = {
            let (doc, events, barrier) = (doc.clone(), Arc::clone(&events), Arc::clone(&barrier));
            thread::spawn(move || {
                let guard = doc.open_stream().unwrap();
                events.lock().unwrap().push("first-open");
                barrier.wait();
                thread::sleep(Duration::from_millis(50));
                events.lock().unwrap().push("first-release");
                drop(guard);
            })
        };
        let second = {
            let (doc, events, barrier) = (doc.clone(), Arc::clone(&events), Arc::clone(&barrier));
            thread::spawn(move || {
                barrier.wait();
                let _guard = doc.open_stream().unwrap();
                events.lock().unwrap().push("second-open");
            })
        };
        first.join().unwrap();
        second.join().unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["first-open", "first-release", "second-open"]
        );
    }

    // =========================================================================
    // Cloning
    // =========================================================================

    #[test]
    fn default_clone_preserves_content() {
        let doc = stream_doc(b"keep me");
        let clone = doc.clone_with(DocumentChanges::new()).unwrap();
        assert_eq!(clone.content().unwrap(), doc.content().unwrap());
        assert_eq!(clone.source(), doc.source());
        assert_ne!(clone.id(), doc.id());
    }

    #[test]
    fn clone_with_text_replaces_stream() {
        let doc = stream_doc(b"old");
        let clone = doc.clone_with_content("new", Vec::<(String, Value)>::new()).unwrap();
        let mut out = String::new();
        clone.open_stream().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "new");
        assert_eq!(&*doc.content().unwrap(), "old");
    }

    #[test]
    fn clone_with_stream_replaces_text() {
        let doc = text_doc("t", "old");
        let clone = doc
            .clone_with(DocumentChanges::new().body(Body::stream(Cursor::new(b"new".to_vec()))))
            .unwrap();
        assert_eq!(&*clone.content().unwrap(), "new");
    }

    #[test]
    fn clone_overlays_metadata() {
        let doc = Document::detached("m", Metadata::from_pairs([("A", 1)]), Body::Empty);
        let clone = doc.clone_with_metadata([("B", 2)]).unwrap();
        assert_eq!(clone.get_as::<i64>("A").unwrap(), 1);
        assert_eq!(clone.get_as::<i64>("B").unwrap(), 2);
        assert!(doc.get("B").is_none());
    }

    #[test]
    fn clone_with_empty_overlay_enumerates_same_pairs() {
        let doc = Document::detached("m", Metadata::from_pairs([("A", 1), ("B", 2)]), Body::Empty);
        let clone = doc.clone_with_metadata(Vec::<(String, Value)>::new()).unwrap();
        let mut a: Vec<String> = doc.metadata().iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut b: Vec<String> = clone.metadata().iter().map(|(k, v)| format!("{k}={v}")).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn metadata_clone_shares_stream_ownership() {
        let doc = stream_doc(b"owned");
        let clone = doc.clone_with_metadata([("x", 1)]).unwrap();

        doc.dispose();
        assert_eq!(&*clone.content().unwrap(), "owned");

        clone.dispose();
        assert!(matches!(clone.content(), Err(DocumentError::Disposed(_))));
    }

    #[test]
    fn disposing_a_clone_keeps_the_original_readable() {
        let doc = stream_doc(b"still here");
        let peek = doc.clone_with_metadata([("peek", true)]).unwrap();
        peek.dispose();

        let mut out = String::new();
        doc.open_stream().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "still here");
        assert_eq!(&*doc.content().unwrap(), "still here");
    }

    #[test]
    fn stream_is_released_with_the_last_owner() {
        let doc = stream_doc(b"shared");
        let a = doc.clone_with_metadata([("n", 1)]).unwrap();
        let b = doc.clone_with_metadata([("n", 2)]).unwrap();
        assert_eq!(doc.inner.content.owners.load(Ordering::SeqCst), 3);

        doc.dispose();
        a.dispose();
        let mut out = String::new();
        b.open_stream().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "shared");

        b.dispose();
        assert!(matches!(
            doc.inner.content.lock().stream,
            StreamSlot::Released
        ));
    }

    #[test]
    fn borrowed_stream_survives_disposal_of_sharing_clone() {
        let doc = Document::detached(
            "b",
            Metadata::new(),
            Body::borrowed_stream(Cursor::new(b"borrowed".to_vec())),
        );
        let clone = doc.clone_with_metadata([("x", 1)]).unwrap();
        clone.dispose();
        assert_eq!(&*doc.content().unwrap(), "borrowed");
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    #[test]
    fn dispose_is_idempotent_and_keeps_metadata() {
        let doc = Document::detached(
            "d",
            Metadata::from_pairs([("Title", "kept")]),
            Body::stream(Cursor::new(b"gone".to_vec())),
        );
        doc.dispose();
        doc.dispose();
        assert!(doc.is_disposed());
        assert_eq!(doc.string("Title").as_deref(), Some("kept"));
        assert!(matches!(doc.content(), Err(DocumentError::Disposed(_))));
        assert!(matches!(doc.open_stream(), Err(DocumentError::Disposed(_))));
        assert!(matches!(
            doc.clone_with_metadata([("a", 1)]),
            Err(DocumentError::Disposed(_))
        ));
    }

    // =========================================================================
    // Preview
    // =========================================================================

    #[test]
    fn preview_truncates_to_limit() {
        let long = "x".repeat(PREVIEW_CHARS * 2);
        let doc = text_doc("p", &long);
        assert_eq!(doc.preview().len(), PREVIEW_CHARS);
        assert_eq!(doc.to_string().len(), PREVIEW_CHARS);
    }

    #[test]
    fn preview_reads_stream_without_materializing() {
        let doc = stream_doc("ünïcödé".as_bytes());
        assert_eq!(doc.preview(), "ünïcödé");
    }

    #[test]
    fn preview_of_disposed_document_is_empty() {
        let doc = text_doc("p", "text");
        doc.dispose();
        assert_eq!(doc.preview(), "");
    }
}
