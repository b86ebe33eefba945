//! Write document content to the output folder.
//!
//! The destination is relative to the output folder and comes from one of:
//!
//! - the document's `RelativeFilePath` (default),
//! - the same with a new extension ([`WriteFiles::with_extension`]),
//! - an explicit per-document path ([`WriteFiles::with_path`]).
//!
//! Documents without a destination pass through untouched. Written documents
//! come out as metadata-only clones carrying the `DestinationFile*` keys and
//! `RelativeFilePath`, `RelativeFilePathBase` and `RelativeFileDir` set to the
//! path actually written below the output folder. Content and source are
//! unchanged.

use crate::context::ExecutionContext;
use crate::document::Document;
use crate::metadata::{Value, keys};
use crate::step::{Step, StepError, ValueSource};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

enum Destination {
    Relative,
    Extension(String),
    Path(ValueSource<Option<String>>),
}

pub struct WriteFiles {
    destination: Destination,
}

impl WriteFiles {
    /// Write to the document's relative path unchanged.
    pub fn new() -> Self {
        Self {
            destination: Destination::Relative,
        }
    }

    /// Write to the relative path with the extension replaced
    /// (`"html"` and `".html"` are equivalent).
    pub fn with_extension(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            destination: Destination::Extension(extension.trim_start_matches('.').to_string()),
        }
    }

    /// Write to a path computed per document; `None` skips the document.
    pub fn with_path(path: ValueSource<Option<String>>) -> Self {
        Self {
            destination: Destination::Path(path),
        }
    }

    /// Write to the path stored under a metadata key.
    pub fn with_path_key(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::with_path(ValueSource::from_document(move |doc, _| Ok(doc.string(&key))))
    }

    fn relative_destination(
        &self,
        doc: &Document,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Option<PathBuf>, StepError> {
        let relative = doc.string(keys::RELATIVE_FILE_PATH).map(PathBuf::from);
        Ok(match &self.destination {
            Destination::Relative => relative,
            Destination::Extension(ext) => relative.map(|p| p.with_extension(ext)),
            Destination::Path(source) => source.resolve(doc, ctx)?.map(PathBuf::from),
        })
    }
}

impl Default for WriteFiles {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for WriteFiles {
    fn name(&self) -> &str {
        "WriteFiles"
    }

    fn execute(
        &self,
        inputs: &[Document],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        let output_root = ctx.output_folder();
        let mut outputs = Vec::with_capacity(inputs.len());
        for doc in inputs {
            let Some(relative) = self.relative_destination(doc, ctx)? else {
                debug!(source = doc.source(), "no destination, skipping write");
                outputs.push(doc.clone());
                continue;
            };
            let destination = output_root.join(&relative);
            write_document(doc, &destination)?;
            debug!(path = %destination.display(), "wrote file");
            let mut metadata = destination_metadata(&destination);
            metadata.extend(relative_metadata(&relative));
            outputs.push(doc.clone_with_metadata(metadata)?);
        }
        Ok(outputs)
    }
}

fn write_document(doc: &Document, destination: &Path) -> Result<(), StepError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(destination)?;
    let mut stream = doc.open_stream()?;
    io::copy(&mut stream, &mut file)?;
    Ok(())
}

fn lossy(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// The `DestinationFile*` keys for a written file.
pub fn destination_metadata(path: &Path) -> Vec<(&'static str, Value)> {
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    vec![
        (
            keys::DESTINATION_FILE_BASE,
            path.file_stem().map(|s| lossy(Path::new(s))).unwrap_or_default().into(),
        ),
        (keys::DESTINATION_FILE_EXT, ext.into()),
        (
            keys::DESTINATION_FILE_NAME,
            path.file_name().map(|s| lossy(Path::new(s))).unwrap_or_default().into(),
        ),
        (
            keys::DESTINATION_FILE_DIR,
            path.parent().map(lossy).unwrap_or_default().into(),
        ),
        (keys::DESTINATION_FILE_PATH, lossy(path).into()),
        (keys::DESTINATION_FILE_PATH_BASE, lossy(&path.with_extension("")).into()),
    ]
}

/// The `RelativeFile*` keys for a path below the output folder.
pub fn relative_metadata(relative: &Path) -> Vec<(&'static str, Value)> {
    vec![
        (keys::RELATIVE_FILE_PATH, lossy(relative).into()),
        (keys::RELATIVE_FILE_PATH_BASE, lossy(&relative.with_extension("")).into()),
        (
            keys::RELATIVE_FILE_DIR,
            relative.parent().map(lossy).unwrap_or_default().into(),
        ),
    ]
}
