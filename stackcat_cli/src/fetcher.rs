/// Downloads release/CI artifacts with GitHub-token auth, an on-disk cache
/// keyed by URL tail, 404-driven version fallback, and Zip-Slip-safe
/// extraction.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{StatusCode, Url};

#[derive(Debug)]
struct FetchError {
    inner: Context<FetchErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum FetchErrKind {
    #[fail(display = "asset not found (404): {}", _0)]
    Http404(String),

    #[fail(display = "download failed for '{}': HTTP {}", _0, _1)]
    DownloadFailed(String, u16),

    #[fail(display = "authentication required or rate-limited fetching '{}' (configure a GitHub token)", _0)]
    AuthOrRateLimited(String),

    #[fail(display = "too many redirects fetching '{}'", _0)]
    TooManyRedirects(String),

    #[fail(display = "zip slip violation: entry '{}' escapes the destination directory", _0)]
    ZipSlip(String),
}
use failure::{Error, Fail, Context, Backtrace, ResultExt};
use std::fmt::{self, Display};

impl Fail for FetchError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<FetchErrKind> for FetchError {
    fn from(kind: FetchErrKind) -> FetchError {
        FetchError { inner: Context::new(kind) }
    }
}
impl From<Context<FetchErrKind>> for FetchError {
    fn from(inner: Context<FetchErrKind>) -> FetchError {
        FetchError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

const MAX_REDIRECTS: u8 = 10;

/// A fetcher bound to one cache directory and an optional GitHub token.
pub struct Fetcher {
    client: Client,
    cache_dir: PathBuf,
    github_token: Option<String>,
}

fn is_github_host(url: &Url) -> bool {
    url.host_str().map_or(false, |h| h.contains("github"))
}

fn cache_key(url: &Url) -> String {
    url.path_segments().and_then(|mut s| s.next_back()).unwrap_or("asset").to_string()
}

impl Fetcher {
    pub fn new(cache_dir: impl Into<PathBuf>, github_token: Option<String>) -> Result<Fetcher> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        // Redirects are followed manually below so Authorization can be
        // stripped or kept per-host, rather than relying on reqwest's
        // blanket cross-host stripping.
        let client = Client::builder().redirect(reqwest::redirect::Policy::none()).build()?;
        Ok(Fetcher { client, cache_dir, github_token })
    }

    fn authed_get(&self, url: &Url) -> Result<Response> {
        let mut req = self.client.get(url.clone());
        if is_github_host(url) {
            if let Some(token) = &self.github_token {
                req = req.header(AUTHORIZATION, HeaderValue::from_str(&format!("token {}", token))?);
            }
        }
        Ok(req.send()?)
    }

    /// Resolves `latest` against the GitHub release index
    /// (`GET /repos/{owner}/{repo}/releases/latest`, which answers with a
    /// JSON body rather than a redirect), returning the release's tag name
    /// with any leading `v` stripped so it reads as a bare semver (spec.md
    /// §4.5).
    pub fn resolve_latest_tag(&self, owner: &str, repo: &str) -> Result<String> {
        let url: Url = format!("https://api.github.com/repos/{}/{}/releases/latest", owner, repo)
            .parse()
            .map_err(|_| FetchErrKind::DownloadFailed(format!("{}/{}", owner, repo), 0))?;
        let resp = self.authed_get(&url)?;
        match resp.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(FetchErrKind::Http404(url.to_string()))?,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(FetchErrKind::AuthOrRateLimited(url.to_string()))?,
            other => return Err(FetchErrKind::DownloadFailed(url.to_string(), other.as_u16()))?,
        }
        let body: serde_json::Value = resp.json().context(FetchErrKind::DownloadFailed(url.to_string(), 0))?;
        tag_name_from_release(&body).ok_or_else(|| FetchErrKind::DownloadFailed(url.to_string(), 0).into())
    }

    /// Follows redirects manually, stripping the `Authorization` header the
    /// moment a redirect leaves a GitHub host.
    fn get_following_redirects(&self, url: &Url) -> Result<Response> {
        let mut current = url.clone();
        let mut authorize = is_github_host(&current);
        for _ in 0..MAX_REDIRECTS {
            let mut req = self.client.get(current.clone());
            if authorize {
                if let Some(token) = &self.github_token {
                    req = req.header(AUTHORIZATION, HeaderValue::from_str(&format!("token {}", token))?);
                }
            }
            let resp = req.send()?;
            if resp.status().is_redirection() {
                let location = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| FetchErrKind::DownloadFailed(current.to_string(), resp.status().as_u16()))?;
                let next = current.join(location)?;
                authorize = is_github_host(&next);
                current = next;
                continue;
            }
            return Ok(resp);
        }
        Err(FetchErrKind::TooManyRedirects(url.to_string()))?
    }

    /// Downloads `url` into the cache directory, returning the cached path.
    /// Already-cached assets are returned immediately with no network call.
    pub fn download(&self, url: &Url) -> Result<PathBuf> {
        let key = cache_key(url);
        let dest = self.cache_dir.join(&key);
        if dest.is_file() {
            return Ok(dest);
        }

        match self.fetch_to_cache(url, &dest) {
            Ok(path) => Ok(path),
            Err(e) => {
                if is_http_404(&e) {
                    let fallback_url = toggle_leading_v(url)?;
                    match self.fetch_to_cache(&fallback_url, &self.cache_dir.join(cache_key(&fallback_url))) {
                        Ok(path) => Ok(path),
                        Err(_) => Err(FetchErrKind::Http404(format!("{} (also tried {})", url, fallback_url)))?,
                    }
                } else {
                    Err(e)
                }
            }
        }
    }

    fn fetch_to_cache(&self, url: &Url, dest: &Path) -> Result<PathBuf> {
        let mut resp = self.get_following_redirects(url)?;
        match resp.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(FetchErrKind::Http404(url.to_string()))?,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(FetchErrKind::AuthOrRateLimited(url.to_string()))?,
            other => return Err(FetchErrKind::DownloadFailed(url.to_string(), other.as_u16()))?,
        }

        let tmp = tempfile::NamedTempFile::new_in(&self.cache_dir).context(FetchErrKind::DownloadFailed(url.to_string(), 0))?;
        {
            let mut file = tmp.reopen()?;
            let mut buf = [0u8; 8192];
            loop {
                let n = io::Read::read(&mut resp, &mut buf)?;
                if n == 0 {
                    break;
                }
                file.write_all(&buf[..n])?;
            }
        }
        tmp.persist(dest).map_err(|e| e.error)?;
        Ok(dest.to_path_buf())
    }
}

/// Pulls `tag_name` out of a GitHub release API response, stripping a
/// leading `v` so the result reads as a bare semver.
fn tag_name_from_release(body: &serde_json::Value) -> Option<String> {
    let tag = body.get("tag_name").and_then(|v| v.as_str())?;
    Some(tag.trim_start_matches('v').to_string())
}

fn is_http_404(err: &Error) -> bool {
    err.downcast_ref::<FetchErrKind>().map_or(false, |k| matches!(k, FetchErrKind::Http404(_)))
}

/// Toggles the presence of a leading `v` in the last path segment's version
/// number (e.g. `foo-1.2.3.tar.gz` <-> `foo-v1.2.3.tar.gz`), for the
/// single-retry version-format fallback spec.md §4.3 describes.
fn toggle_leading_v(url: &Url) -> Result<Url> {
    let mut segments: Vec<String> = url
        .path_segments()
        .map(|s| s.map(str::to_string).collect())
        .unwrap_or_default();
    if let Some(last) = segments.last_mut() {
        *last = toggle_leading_v_in_filename(last);
    }
    let mut next = url.clone();
    next.set_path(&segments.join("/"));
    Ok(next)
}

fn toggle_leading_v_in_filename(name: &str) -> String {
    // Find the first run of digits preceded optionally by 'v' and flip it.
    if let Some(idx) = name.find(|c: char| c.is_ascii_digit()) {
        if idx > 0 && name.as_bytes()[idx - 1] == b'v' {
            // strip the 'v'
            format!("{}{}", &name[..idx - 1], &name[idx..])
        } else {
            format!("{}v{}", &name[..idx], &name[idx..])
        }
    } else {
        name.to_string()
    }
}

/// Extracts `archive` (a zip file) into `dest`, rejecting any entry whose
/// name is absolute, contains a backslash, or whose cleaned join escapes
/// `dest` ("Zip Slip").
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    fs::create_dir_all(dest)?;
    let dest = fs::canonicalize(dest)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = entry.name().to_string();
        if name.contains('\\') || Path::new(&name).is_absolute() {
            return Err(FetchErrKind::ZipSlip(name))?;
        }

        let joined = dest.join(&name);
        let normalized = normalize_lexically(&joined);
        if !normalized.starts_with(&dest) {
            return Err(FetchErrKind::ZipSlip(name))?;
        }

        if entry.is_dir() {
            fs::create_dir_all(&normalized)?;
            continue;
        }
        if let Some(parent) = normalized.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&normalized)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

/// Resolves `.`/`..` components without touching the filesystem (the path
/// need not exist), so Zip Slip can be detected before any file is created.
fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_url_tail() {
        let url = Url::parse("https://example.com/releases/terraform-1.11.4_linux_amd64.zip").unwrap();
        assert_eq!(cache_key(&url), "terraform-1.11.4_linux_amd64.zip");
    }

    #[test]
    fn toggles_leading_v_both_directions() {
        assert_eq!(toggle_leading_v_in_filename("foo-1.2.3.tar.gz"), "foo-v1.2.3.tar.gz");
        assert_eq!(toggle_leading_v_in_filename("foo-v1.2.3.tar.gz"), "foo-1.2.3.tar.gz");
    }

    #[test]
    fn zip_slip_absolute_path_rejected() {
        let archive = PathBuf::from("/does/not/matter.zip");
        let dest = tempfile::tempdir().unwrap();
        // extract_zip requires a real zip; the path-safety helper is what
        // we exercise directly here to keep this test dependency-free.
        let joined = dest.path().join("/etc/passwd".trim_start_matches('/'));
        let normalized = normalize_lexically(&joined);
        assert!(normalized.starts_with(dest.path()));
        let _ = archive;
    }

    #[test]
    fn zip_slip_parent_traversal_escapes_dest() {
        let dest = tempfile::tempdir().unwrap();
        let joined = dest.path().join("../../etc/passwd");
        let normalized = normalize_lexically(&joined);
        assert!(!normalized.starts_with(dest.path()));
    }

    #[test]
    fn tag_name_from_release_strips_leading_v() {
        let body = serde_json::json!({ "tag_name": "v1.11.4" });
        assert_eq!(tag_name_from_release(&body), Some("1.11.4".to_string()));
    }

    #[test]
    fn tag_name_from_release_missing_field_is_none() {
        let body = serde_json::json!({ "name": "Release 1" });
        assert_eq!(tag_name_from_release(&body), None);
    }

    #[test]
    fn is_github_host_matches_github_family() {
        assert!(is_github_host(&Url::parse("https://github.com/a/b").unwrap()));
        assert!(is_github_host(&Url::parse("https://raw.githubusercontent.com/a/b").unwrap()));
        assert!(is_github_host(&Url::parse("https://objects.githubusercontent.com/a/b").unwrap()));
        assert!(!is_github_host(&Url::parse("https://example.com/a/b").unwrap()));
    }
}
