/// Per-install-directory `.cache.json` metadata and the PR/SHA revalidation
/// state machine (spec.md §4.4).

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug)]
struct CacheError {
    inner: Context<CacheErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum CacheErrKind {
    #[fail(display = "could not read cache metadata at '{}'", _0)]
    Unreadable(String),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for CacheError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<CacheErrKind> for CacheError {
    fn from(kind: CacheErrKind) -> CacheError {
        CacheError { inner: Context::new(kind) }
    }
}
impl From<Context<CacheErrKind>> for CacheError {
    fn from(inner: Context<CacheErrKind>) -> CacheError {
        CacheError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

/// TTL for PR artifact revalidation (spec.md §4.4, §8 invariant).
pub const PR_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub head_sha: String,
    pub checked_at: DateTime<Utc>,
    pub run_id: i64,
}

impl CacheMeta {
    pub fn read(path: &Path) -> Option<CacheMeta> {
        let data = fs::read(path).ok()?;
        serde_json::from_slice(&data).ok()
    }

    /// Writes `self` as indented JSON with mode `0o600` (spec.md §6).
    pub fn write(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_vec_pretty(self)?;
        fs::write(path, body)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

/// Revalidation status for one PR/SHA install directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    NeedsInstall,
    NeedsCheck,
    Valid,
}

/// Decides the status of a PR install directory: `binary_path` is the
/// expected binary location, `meta_path` its sibling `.cache.json`. SHA
/// installs are immutable and should call `sha_status` instead.
pub fn pr_status(binary_path: &Path, meta_path: &Path, now: DateTime<Utc>) -> CacheStatus {
    if !binary_path.is_file() {
        return CacheStatus::NeedsInstall;
    }
    match CacheMeta::read(meta_path) {
        None => CacheStatus::NeedsCheck,
        Some(meta) => {
            let age = now.signed_duration_since(meta.checked_at);
            if age < chrono::Duration::from_std(PR_CACHE_TTL).unwrap() {
                CacheStatus::Valid
            } else {
                CacheStatus::NeedsCheck
            }
        }
    }
}

/// SHA installs are immutable: presence of the binary alone is sufficient.
pub fn sha_status(binary_path: &Path) -> CacheStatus {
    if binary_path.is_file() {
        CacheStatus::Valid
    } else {
        CacheStatus::NeedsInstall
    }
}
