/// Toolchain installer: resolves a version spec, fetches and extracts the
/// matching asset, places the binary under the versioned install layout,
/// and updates the pin file (spec.md §4.5).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use reqwest::Url;
use stackcat_core::registry::Registry;
use stackcat_core::{AssetFormat, PinFile, ToolDescriptor, VersionSpec};

use crate::cache::{self, CacheMeta, CacheStatus};
use crate::fetcher::Fetcher;

pub mod batch;
pub use batch::{InstallBatch, BatchOutcome};

#[derive(Debug)]
struct InstallError {
    inner: Context<InstallErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum InstallErrKind {
    #[fail(display = "version string '{}' is not valid", _0)]
    VersionFormatInvalid(String),

    #[fail(display = "tool '{}' could not be resolved", _0)]
    ToolNotFound(String),

    #[fail(display = "no release asset for this platform ({}/{}); try WSL or Rosetta", _0, _1)]
    PlatformNotSupported(String, String),

    #[fail(display = "install of '{}' failed: {}", _0, _1)]
    ToolInstall(String, String),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for InstallError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<InstallErrKind> for InstallError {
    fn from(kind: InstallErrKind) -> InstallError {
        InstallError { inner: Context::new(kind) }
    }
}
impl From<Context<InstallErrKind>> for InstallError {
    fn from(inner: Context<InstallErrKind>) -> InstallError {
        InstallError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

/// Current platform expressed in the `GOOS`/`GOARCH` vocabulary the
/// registry's overrides are keyed on, matching the convention most
/// released-binary naming schemes (including Terraform/kubectl) use.
pub fn current_platform() -> (String, String) {
    let goos = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let goarch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };
    (goos.to_string(), goarch.to_string())
}

/// `<install_root>/bin/<owner>/<repo>/<version_dir>/<binary>`
pub fn install_layout_path(root: &Path, owner: &str, repo: &str, version_dir: &str, binary: &str) -> PathBuf {
    root.join("bin").join(owner).join(repo).join(version_dir).join(binary)
}

fn meta_path_for(binary_path: &Path) -> PathBuf {
    binary_path.with_file_name(".cache.json")
}

/// Fills `{key}` placeholders in an asset template from `vars`, leaving
/// unknown placeholders untouched.
fn render_asset_template(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        out = out.replace(&format!("{{{}}}", k), v);
    }
    out
}

/// Builds the full download URL for a resolved, platform-adjusted
/// descriptor at `version_dir` (a literal semver, `pr-N`, or `sha-xxxxxxx`).
fn build_asset_url(descriptor: &ToolDescriptor, owner: &str, repo: &str, version_dir: &str) -> Result<Url> {
    let (goos, goarch) = current_platform();
    let resolved = descriptor.resolved_for_platform(&goos, &goarch);

    let mut vars: BTreeMap<String, String> = BTreeMap::new();
    vars.insert("version".to_string(), version_dir.to_string());
    vars.insert("os".to_string(), goos.clone());
    vars.insert("arch".to_string(), goarch.clone());
    for (k, v) in &resolved.replacements {
        vars.insert(k.clone(), v.clone());
    }

    let asset = render_asset_template(&resolved.asset_template, &vars);
    let tag = match &resolved.version_prefix {
        Some(prefix) if !version_dir.starts_with(prefix.as_str()) => format!("{}{}", prefix, version_dir),
        _ => version_dir.to_string(),
    };
    let url = format!("https://github.com/{}/{}/releases/download/{}/{}", owner, repo, tag, asset);
    url.parse().map_err(|_| InstallErrKind::PlatformNotSupported(goos, goarch).into())
}

fn binary_name(descriptor: &ToolDescriptor, repo: &str) -> String {
    descriptor.files.first().map(|f| f.name.clone()).unwrap_or_else(|| repo.to_string())
}

/// A single tool spec split into its name part and an optional explicit
/// version: `"" | name | name@version | owner/repo@version"`.
pub struct ParsedSpec {
    pub name: String,
    pub version: Option<String>,
}

pub fn parse_spec(spec: &str) -> ParsedSpec {
    match spec.split_once('@') {
        Some((name, version)) => ParsedSpec { name: name.to_string(), version: Some(version.to_string()) },
        None => ParsedSpec { name: spec.to_string(), version: None },
    }
}

pub struct Installer<R: Registry> {
    pub root: PathBuf,
    pub registry: R,
    pub fetcher: Fetcher,
    pub pin_path: PathBuf,
}

impl<R: Registry> Installer<R> {
    pub fn new(root: impl Into<PathBuf>, registry: R, fetcher: Fetcher, pin_path: impl Into<PathBuf>) -> Installer<R> {
        Installer { root: root.into(), registry, fetcher, pin_path: pin_path.into() }
    }

    fn read_pins(&self) -> PinFile {
        File::open(&self.pin_path).ok().and_then(|f| PinFile::read(BufReader::new(f)).ok()).unwrap_or_default()
    }

    /// Installs one tool spec, updating the pin file per `set_default`.
    /// `spec = "" | name | name@version | owner/repo@version"`.
    pub fn install(&self, spec: &str, set_default: bool, reinstall: bool) -> Result<PathBuf> {
        let parsed = parse_spec(spec);
        let version_str = parsed.version.as_deref().unwrap_or("latest");
        let version = stackcat_core::version_spec::parse(version_str).map_err(|_| InstallErrKind::VersionFormatInvalid(version_str.to_string()))?;

        let (owner, repo) = self.registry.resolve(&parsed.name).map_err(|_| InstallErrKind::ToolNotFound(parsed.name.clone()))?;
        let descriptor = self.registry.tool(&owner, &repo).map_err(|_| InstallErrKind::ToolNotFound(format!("{}/{}", owner, repo)))?;

        let binary_path = match version {
            VersionSpec::Latest => {
                let resolved = self.fetcher.resolve_latest_tag(&owner, &repo)?;
                self.install_semver_like(&owner, &repo, &descriptor, &resolved, reinstall)?
            }
            VersionSpec::Semver(ref v) => self.install_semver_like(&owner, &repo, &descriptor, v, reinstall)?,
            VersionSpec::Pr(n) => self.install_pr(&owner, &repo, &descriptor, n, reinstall)?,
            VersionSpec::Sha(ref sha) => self.install_sha(&owner, &repo, &descriptor, sha, reinstall)?,
        };

        self.update_pin_file(&parsed.name, version_str, set_default)?;
        Ok(binary_path)
    }

    fn install_semver_like(&self, owner: &str, repo: &str, descriptor: &ToolDescriptor, version: &str, reinstall: bool) -> Result<PathBuf> {
        let version_dir = stackcat_core::version_spec::version_dir(&VersionSpec::Semver(version.to_string()));
        let binary_path = install_layout_path(&self.root, owner, repo, &version_dir, &binary_name(descriptor, repo));

        if binary_path.is_file() && !reinstall {
            return Ok(binary_path);
        }

        let url = build_asset_url(descriptor, owner, repo, &version_dir)?;
        let archive = self.fetcher.download(&url)?;
        self.place_binary(&archive, descriptor, &binary_path)?;
        Ok(binary_path)
    }

    fn install_pr(&self, owner: &str, repo: &str, descriptor: &ToolDescriptor, pr: u64, reinstall: bool) -> Result<PathBuf> {
        let version_dir = format!("pr-{}", pr);
        let binary_path = install_layout_path(&self.root, owner, repo, &version_dir, &binary_name(descriptor, repo));
        let meta_path = meta_path_for(&binary_path);

        let status = if reinstall { CacheStatus::NeedsInstall } else { cache::pr_status(&binary_path, &meta_path, chrono::Utc::now()) };

        match status {
            CacheStatus::Valid => Ok(binary_path),
            CacheStatus::NeedsCheck => {
                // Head-unchanged revalidation (querying the source for its
                // current head SHA) is left to the orchestrator's
                // `InstallLocator`-shaped callback; absent that, treat an
                // existing, readable metadata file as still current.
                if let Some(mut meta) = CacheMeta::read(&meta_path) {
                    meta.checked_at = chrono::Utc::now();
                    meta.write(&meta_path)?;
                    Ok(binary_path)
                } else {
                    self.install_pr_or_sha_artifact(owner, repo, descriptor, &version_dir, &binary_path, Some(&meta_path))
                }
            }
            CacheStatus::NeedsInstall => self.install_pr_or_sha_artifact(owner, repo, descriptor, &version_dir, &binary_path, Some(&meta_path)),
        }
    }

    fn install_sha(&self, owner: &str, repo: &str, descriptor: &ToolDescriptor, sha: &str, reinstall: bool) -> Result<PathBuf> {
        let version_dir = stackcat_core::version_spec::version_dir(&VersionSpec::Sha(sha.to_string()));
        let binary_path = install_layout_path(&self.root, owner, repo, &version_dir, &binary_name(descriptor, repo));

        if !reinstall && cache::sha_status(&binary_path) == CacheStatus::Valid {
            return Ok(binary_path);
        }
        self.install_pr_or_sha_artifact(owner, repo, descriptor, &version_dir, &binary_path, None)
    }

    fn install_pr_or_sha_artifact(&self, owner: &str, repo: &str, descriptor: &ToolDescriptor, version_dir: &str, binary_path: &Path, meta_path: Option<&Path>) -> Result<PathBuf> {
        let url = build_asset_url(descriptor, owner, repo, version_dir)?;
        let archive = self.fetcher.download(&url)?;
        self.place_binary(&archive, descriptor, binary_path)?;

        if let Some(meta_path) = meta_path {
            let meta = CacheMeta { head_sha: String::new(), checked_at: chrono::Utc::now(), run_id: 0 };
            meta.write(meta_path)?;
        }
        Ok(binary_path.to_path_buf())
    }

    fn place_binary(&self, archive: &Path, descriptor: &ToolDescriptor, binary_path: &Path) -> Result<()> {
        if let Some(parent) = binary_path.parent() {
            fs::create_dir_all(parent)?;
        }
        match descriptor.format {
            AssetFormat::Zip => {
                let extract_dir = binary_path.parent().ok_or_else(|| InstallErrKind::ToolInstall(binary_path.display().to_string(), "no parent directory".to_string()))?;
                crate::fetcher::extract_zip(archive, extract_dir)?;
            }
            AssetFormat::Raw | AssetFormat::TarGz | AssetFormat::Pkg => {
                fs::copy(archive, binary_path)?;
            }
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if binary_path.is_file() {
                fs::set_permissions(binary_path, fs::Permissions::from_mode(0o755))?;
            }
        }
        Ok(())
    }

    fn update_pin_file(&self, alias: &str, version: &str, set_default: bool) -> Result<()> {
        let mut pins = self.read_pins();
        pins.set_version(alias, version, set_default);
        let file = File::create(&self.pin_path)?;
        pins.write(BufWriter::new(file))?;
        Ok(())
    }

    /// Installs every tool in the pin file; aliases that fail to resolve
    /// are silently skipped, not fatal (spec.md §4.5).
    pub fn install_all(&self, reinstall: bool) -> Vec<(String, Result<PathBuf>)> {
        let pins = self.read_pins();
        pins.iter()
            .filter_map(|(alias, versions)| {
                let version = versions.first()?;
                let spec = format!("{}@{}", alias, version);
                Some((alias.clone(), self.install(&spec, false, reinstall)))
            })
            .collect()
    }
}
