//! Read files from the input folder into documents.
//!
//! The pattern is relative to the input folder. Everything up to the last
//! `/` names a directory; the rest is a file-name wildcard (`*` matches any
//! run of characters, `?` exactly one):
//!
//! ```text
//! "*.md"          every markdown file under input/ (recursive by default)
//! "posts/*.md"    every markdown file under input/posts/
//! "about.md"      one file
//! ```
//!
//! Files are read in parallel with rayon, then turned into documents in
//! file-name order so runs are deterministic. Each input document yields one
//! output per file: a clone whose source is the file path, whose content is
//! the file bytes, and whose metadata carries the `SourceFile*` and
//! `RelativeFile*` path keys.

use crate::context::ExecutionContext;
use crate::document::{Body, Document, DocumentChanges};
use crate::metadata::{Value, keys};
use crate::step::{Step, StepError, ValueSource};
use rayon::prelude::*;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

type PathFilter = dyn Fn(&Path) -> bool + Send + Sync;

pub struct ReadFiles {
    pattern: ValueSource<String>,
    recursive: bool,
    extensions: Vec<String>,
    excluded: Vec<String>,
    filter: Option<Arc<PathFilter>>,
}

impl ReadFiles {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self::from_source(ValueSource::Static(pattern.into()))
    }

    /// Pattern resolved per input document.
    pub fn from_source(pattern: ValueSource<String>) -> Self {
        Self {
            pattern,
            recursive: true,
            extensions: Vec::new(),
            excluded: Vec::new(),
            filter: None,
        }
    }

    /// Only match files directly in the pattern's directory.
    pub fn top_directory_only(mut self) -> Self {
        self.recursive = false;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Keep only files with one of these extensions (with or without the
    /// leading dot, compared case-insensitively).
    pub fn with_extensions<S: AsRef<str>>(mut self, extensions: impl IntoIterator<Item = S>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .collect();
        self
    }

    /// Drop files with one of these extensions.
    pub fn without_extensions<S: AsRef<str>>(mut self, extensions: impl IntoIterator<Item = S>) -> Self {
        self.excluded = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .collect();
        self
    }

    /// Keep only files the predicate accepts.
    pub fn filter(mut self, predicate: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(predicate));
        self
    }

    fn accepts(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !self.extensions.is_empty() && !self.extensions.contains(&ext) {
            return false;
        }
        if self.excluded.contains(&ext) {
            return false;
        }
        self.filter.as_ref().is_none_or(|f| f(path))
    }
}

impl Step for ReadFiles {
    fn name(&self) -> &str {
        "ReadFiles"
    }

    fn execute(
        &self,
        inputs: &[Document],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Document>, StepError> {
        let root = ctx.input_folder();
        let span = ctx.span();
        let mut outputs = Vec::new();

        for input in inputs {
            let pattern = self.pattern.resolve(input, ctx)?;
            let files: Vec<PathBuf> = find_files(&root, &pattern, self.recursive)?
                .into_iter()
                .filter(|p| self.accepts(p))
                .collect();
            debug!(pattern = %pattern, files = files.len(), "matched files");

            let loaded: Vec<(PathBuf, Vec<u8>)> = files
                .into_par_iter()
                .map(|path| {
                    let _entered = span.enter();
                    debug!(path = %path.display(), "reading file");
                    fs::read(&path).map(|bytes| (path, bytes))
                })
                .collect::<io::Result<_>>()?;

            for (path, bytes) in loaded {
                let doc = input.clone_with(
                    DocumentChanges::new()
                        .source(path.to_string_lossy())
                        .body(Body::stream(Cursor::new(bytes)))
                        .metadata(source_path_metadata(&root, &path)),
                )?;
                outputs.push(doc);
            }
        }
        Ok(outputs)
    }
}

/// Files under `root` matching `pattern`, sorted by path.
pub fn find_files(root: &Path, pattern: &str, recursive: bool) -> io::Result<Vec<PathBuf>> {
    let pattern = pattern.trim_start_matches("./");
    let (dir, name_pattern) = match pattern.rfind('/') {
        Some(i) => (root.join(&pattern[..i]), &pattern[i + 1..]),
        None => (root.to_path_buf(), pattern),
    };
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "pattern directory does not exist");
        return Ok(Vec::new());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in WalkDir::new(&dir).max_depth(max_depth).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && wildcard_match(name_pattern, &entry.file_name().to_string_lossy())
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Match a file name against a `*`/`?` wildcard pattern.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((star_pi, star_ni)) = star {
            // Let the last star absorb one more character.
            pi = star_pi + 1;
            ni = star_ni + 1;
            star = Some((star_pi, star_ni + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

fn lossy(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// The `SourceFile*` and `RelativeFile*` keys for a file under `root`.
pub fn source_path_metadata(root: &Path, path: &Path) -> Vec<(&'static str, Value)> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = path.parent().map(lossy).unwrap_or_default();
    let relative_dir = relative.parent().map(lossy).unwrap_or_default();

    vec![
        (keys::SOURCE_FILE_ROOT, lossy(root).into()),
        (keys::SOURCE_FILE_BASE, base.into()),
        (keys::SOURCE_FILE_EXT, ext.into()),
        (keys::SOURCE_FILE_NAME, name.into()),
        (keys::SOURCE_FILE_DIR, dir.into()),
        (keys::SOURCE_FILE_PATH, lossy(path).into()),
        (keys::SOURCE_FILE_PATH_BASE, lossy(&path.with_extension("")).into()),
        (keys::RELATIVE_FILE_PATH, lossy(relative).into()),
        (keys::RELATIVE_FILE_PATH_BASE, lossy(&relative.with_extension("")).into()),
        (keys::RELATIVE_FILE_DIR, relative_dir.into()),
    ]
}
