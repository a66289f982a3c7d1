/// Diff-aware file materializer (spec.md §4.13): renders each file in a
/// component's generate map, compares against what's already on disk, and
/// writes atomically only when the bytes differ. `clean` mode deletes
/// instead of writing; `dryRun` reports without touching the filesystem.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use stackcat_core::{GenerateEntry, TemplateContext};

use super::render::render_entry;

#[derive(Debug)]
struct MaterializeError {
    inner: failure::Context<MaterializeErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum MaterializeErrKind {
    #[fail(display = "failed to render '{}': {}", _0, _1)]
    RenderFailed(String, String),

    #[fail(display = "failed to write '{}': {}", _0, _1)]
    WriteFailed(String, String),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for MaterializeError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for MaterializeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<MaterializeErrKind> for MaterializeError {
    fn from(kind: MaterializeErrKind) -> MaterializeError {
        MaterializeError { inner: Context::new(kind) }
    }
}
impl From<Context<MaterializeErrKind>> for MaterializeError {
    fn from(inner: Context<MaterializeErrKind>) -> MaterializeError {
        MaterializeError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Created,
    Updated,
    Unchanged,
    Deleted,
    Error,
}

#[derive(Debug, Clone)]
pub struct FileResult {
    pub path: PathBuf,
    pub outcome: FileOutcome,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MaterializeOptions {
    pub dry_run: bool,
    pub clean: bool,
}

/// A per-directory tally of outcomes, plus the individual file results in
/// iteration order.
#[derive(Debug, Clone, Default)]
pub struct MaterializeSummary {
    pub results: Vec<FileResult>,
}

impl MaterializeSummary {
    pub fn created(&self) -> usize {
        self.results.iter().filter(|r| r.outcome == FileOutcome::Created).count()
    }
    pub fn updated(&self) -> usize {
        self.results.iter().filter(|r| r.outcome == FileOutcome::Updated).count()
    }
    pub fn unchanged(&self) -> usize {
        self.results.iter().filter(|r| r.outcome == FileOutcome::Unchanged).count()
    }
    pub fn deleted(&self) -> usize {
        self.results.iter().filter(|r| r.outcome == FileOutcome::Deleted).count()
    }
    pub fn errors(&self) -> usize {
        self.results.iter().filter(|r| r.outcome == FileOutcome::Error).count()
    }
}

/// Materializes every `(relative_path, entry)` in `files` under `root`,
/// iterating in the map's natural order (`files` is a `BTreeMap`, so that
/// order is alphabetical, matching spec.md §5's "map-iteration order, but
/// written serially" guarantee). Per-file errors are recorded in the
/// summary rather than aborting the remaining files. Routes to
/// `apply_clean` when `opts.clean` is set.
pub fn materialize_component(root: &Path, files: &BTreeMap<String, GenerateEntry>, ctx: &TemplateContext, opts: &MaterializeOptions) -> MaterializeSummary {
    if opts.clean {
        return apply_clean(root, files, opts);
    }
    let mut summary = MaterializeSummary::default();
    for (relative_path, entry) in files {
        let full_path = root.join(relative_path);
        let result = materialize_one(&full_path, relative_path, entry, ctx, opts);
        summary.results.push(result);
    }
    summary
}

fn materialize_one(full_path: &Path, relative_path: &str, entry: &GenerateEntry, ctx: &TemplateContext, opts: &MaterializeOptions) -> FileResult {
    let bytes = match render_entry(relative_path, entry, ctx) {
        Ok(b) => b,
        Err(e) => return FileResult { path: full_path.to_path_buf(), outcome: FileOutcome::Error, detail: Some(e.to_string()) },
    };

    let existing = fs::read(full_path).ok();
    if existing.as_deref() == Some(bytes.as_slice()) {
        return FileResult { path: full_path.to_path_buf(), outcome: FileOutcome::Unchanged, detail: None };
    }

    let outcome = if existing.is_some() { FileOutcome::Updated } else { FileOutcome::Created };
    if opts.dry_run {
        return FileResult { path: full_path.to_path_buf(), outcome, detail: None };
    }

    match write_atomic(full_path, &bytes) {
        Ok(()) => FileResult { path: full_path.to_path_buf(), outcome, detail: None },
        Err(e) => FileResult { path: full_path.to_path_buf(), outcome: FileOutcome::Error, detail: Some(e.to_string()) },
    }
}

/// Performs the clean-mode deletion for one file, tolerating a missing
/// file.
fn delete_tolerating_missing(full_path: &Path) -> Result<()> {
    match fs::remove_file(full_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MaterializeErrKind::WriteFailed(full_path.display().to_string(), e.to_string()))?,
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| MaterializeErrKind::WriteFailed(path.display().to_string(), e.to_string()))?;
    }
    let tmp_path = path.with_extension(format!("{}.tmp", path.extension().and_then(|e| e.to_str()).unwrap_or("out")));
    {
        let mut f = fs::File::create(&tmp_path).map_err(|e| MaterializeErrKind::WriteFailed(path.display().to_string(), e.to_string()))?;
        f.write_all(bytes).map_err(|e| MaterializeErrKind::WriteFailed(path.display().to_string(), e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            f.set_permissions(fs::Permissions::from_mode(0o644)).map_err(|e| MaterializeErrKind::WriteFailed(path.display().to_string(), e.to_string()))?;
        }
    }
    fs::rename(&tmp_path, path).map_err(|e| MaterializeErrKind::WriteFailed(path.display().to_string(), e.to_string()))?;
    Ok(())
}

/// Executes the clean-mode deletions a prior `materialize_component(..., clean: true)`
/// call planned, when not running in dry-run mode. Call this with the same
/// `files` map right after materializing to actually remove the files.
pub fn apply_clean(root: &Path, files: &BTreeMap<String, GenerateEntry>, opts: &MaterializeOptions) -> MaterializeSummary {
    let mut summary = MaterializeSummary::default();
    for relative_path in files.keys() {
        let full_path = root.join(relative_path);
        if opts.dry_run {
            summary.results.push(FileResult { path: full_path, outcome: FileOutcome::Deleted, detail: None });
            continue;
        }
        let result = match delete_tolerating_missing(&full_path) {
            Ok(()) => FileResult { path: full_path, outcome: FileOutcome::Deleted, detail: None },
            Err(e) => FileResult { path: full_path, outcome: FileOutcome::Error, detail: Some(e.to_string()) },
        };
        summary.results.push(result);
    }
    summary
}
