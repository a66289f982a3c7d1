/// Tool descriptors, platform overrides, and resolution of a tool alias to
/// `(owner, repo)` plus the asset URL template to use once a version is known.

use std::collections::BTreeMap;
use url::Url;

#[derive(Debug)]
struct RegError {
    inner: Context<RegErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum RegErrKind {
    #[fail(display = "tool '{}' not found in any registry", _0)]
    ToolNotFound(String),

    #[fail(display = "registry entry for '{}/{}' is malformed: {}", _0, _1, _2)]
    MalformedEntry(String, String, String),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for RegError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for RegError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<RegErrKind> for RegError {
    fn from(kind: RegErrKind) -> RegError {
        RegError { inner: Context::new(kind) }
    }
}
impl From<Context<RegErrKind>> for RegError {
    fn from(inner: Context<RegErrKind>) -> RegError {
        RegError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

/// Archive/asset format a tool is distributed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetFormat {
    #[serde(rename = "tar.gz")]
    TarGz,
    Zip,
    Pkg,
    Raw,
}

/// One file to extract/place from a downloaded asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFile {
    pub name: String,
    pub src: String,
}

/// A platform-specific override. Empty fields act as wildcards; the first
/// override whose `(goos, goarch)` match the current platform wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Override {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goos: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goarch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<AssetFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<ToolFile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacements: Option<BTreeMap<String, String>>,
}

impl Override {
    fn matches(&self, goos: &str, goarch: &str) -> bool {
        self.goos.as_deref().map_or(true, |v| v == goos)
            && self.goarch.as_deref().map_or(true, |v| v == goarch)
    }
}

/// A tool's registry entry: how to build its asset URL and what to do with
/// the downloaded artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub registry_owner: String,
    pub registry_repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub asset_template: String,
    pub format: AssetFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_prefix: Option<String>,
    #[serde(default)]
    pub files: Vec<ToolFile>,
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
    #[serde(default)]
    pub overrides: Vec<Override>,
}

impl ToolDescriptor {
    /// Applies the first matching override (in order) on top of this
    /// descriptor, for the given `(goos, goarch)`. Only non-empty override
    /// fields are merged; `replacements` is merged key-by-key rather than
    /// replaced wholesale.
    pub fn resolved_for_platform(&self, goos: &str, goarch: &str) -> ToolDescriptor {
        let mut out = self.clone();
        if let Some(o) = self.overrides.iter().find(|o| o.matches(goos, goarch)) {
            if let Some(ref asset) = o.asset {
                out.asset_template = asset.clone();
            }
            if let Some(format) = o.format {
                out.format = format;
            }
            if let Some(ref files) = o.files {
                out.files = files.clone();
            }
            if let Some(ref repl) = o.replacements {
                for (k, v) in repl {
                    out.replacements.insert(k.clone(), v.clone());
                }
            }
        }
        out
    }
}

/// A fully resolved tool ready for asset-URL construction: owner, repo,
/// version and the platform-adjusted descriptor.
#[derive(Debug, Clone)]
pub struct ResolvedTool {
    pub owner: String,
    pub repo: String,
    pub version: String,
    pub descriptor: ToolDescriptor,
}

/// Index-style registry: a flat list of packages, as you'd find in a
/// `registry.yaml` loaded wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryIndex {
    pub packages: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub owner: String,
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(flatten)]
    pub descriptor_fields: ToolDescriptor,
}

/// A single registry backend: either an inline map, an index file, or a
/// directory-style base URL resolved per owner/repo.
pub trait Registry {
    fn resolve(&self, name: &str) -> Result<(String, String)>;
    fn tool(&self, owner: &str, repo: &str) -> Result<ToolDescriptor>;
    fn list_all(&self) -> Vec<(String, String)>;
}

/// An inline, in-memory registry keyed by alias.
#[derive(Debug, Clone, Default)]
pub struct InlineRegistry {
    pub entries: BTreeMap<String, (String, String, ToolDescriptor)>,
}

impl Registry for InlineRegistry {
    fn resolve(&self, name: &str) -> Result<(String, String)> {
        if let Some((owner, repo, _)) = self.entries.get(name) {
            return Ok((owner.clone(), repo.clone()));
        }
        // allow `owner/repo` direct addressing even if no alias is registered
        if let Some((owner, repo)) = name.split_once('/') {
            return Ok((owner.to_string(), repo.to_string()));
        }
        Err(RegErrKind::ToolNotFound(name.to_string()))?
    }

    fn tool(&self, owner: &str, repo: &str) -> Result<ToolDescriptor> {
        self.entries
            .values()
            .find(|(o, r, _)| o == owner && r == repo)
            .map(|(_, _, d)| d.clone())
            .ok_or_else(|| RegErrKind::ToolNotFound(format!("{}/{}", owner, repo)).into())
    }

    fn list_all(&self) -> Vec<(String, String)> {
        self.entries.values().map(|(o, r, _)| (o.clone(), r.clone())).collect()
    }
}

/// Composite registry consulting backends in descending priority; the
/// first hit wins. `list_all`/`search` dedupe by `owner/repo`, keeping the
/// higher-priority copy.
pub struct CompositeRegistry {
    backends: Vec<Box<dyn Registry + Send + Sync>>,
}

impl CompositeRegistry {
    pub fn new(backends: Vec<Box<dyn Registry + Send + Sync>>) -> Self {
        CompositeRegistry { backends }
    }

    pub fn resolve(&self, name: &str) -> Result<(String, String)> {
        for b in &self.backends {
            if let Ok(hit) = b.resolve(name) {
                return Ok(hit);
            }
        }
        Err(RegErrKind::ToolNotFound(name.to_string()))?
    }

    pub fn tool(&self, owner: &str, repo: &str) -> Result<ToolDescriptor> {
        for b in &self.backends {
            if let Ok(hit) = b.tool(owner, repo) {
                return Ok(hit);
            }
        }
        Err(RegErrKind::ToolNotFound(format!("{}/{}", owner, repo)))?
    }

    pub fn list_all(&self) -> Vec<(String, String)> {
        let mut seen = BTreeMap::new();
        for b in &self.backends {
            for (owner, repo) in b.list_all() {
                seen.entry(format!("{}/{}", owner, repo)).or_insert((owner, repo));
            }
        }
        seen.into_values().collect()
    }

    pub fn search(&self, needle: &str) -> Vec<(String, String)> {
        self.list_all()
            .into_iter()
            .filter(|(o, r)| o.contains(needle) || r.contains(needle))
            .collect()
    }
}

impl Registry for CompositeRegistry {
    fn resolve(&self, name: &str) -> Result<(String, String)> {
        CompositeRegistry::resolve(self, name)
    }

    fn tool(&self, owner: &str, repo: &str) -> Result<ToolDescriptor> {
        CompositeRegistry::tool(self, owner, repo)
    }

    fn list_all(&self) -> Vec<(String, String)> {
        CompositeRegistry::list_all(self)
    }
}

/// An index-style registry: fetches one YAML document (`packages: [...]`)
/// up front and resolves entirely in memory from then on -- the "one-shot
/// index fetch" spec.md §5 carves out as the one blocking exception among
/// registry-resolution operations.
#[derive(Debug, Clone, Default)]
pub struct IndexRegistry {
    entries: BTreeMap<String, (String, String, ToolDescriptor)>,
}

impl IndexRegistry {
    /// Builds a registry directly from an already-parsed index, keyed by
    /// each entry's alias (falling back to `owner/repo`).
    pub fn from_index(index: RegistryIndex) -> IndexRegistry {
        let mut entries = BTreeMap::new();
        for entry in index.packages {
            let key = entry.alias.clone().unwrap_or_else(|| format!("{}/{}", entry.owner, entry.repo));
            entries.insert(key, (entry.owner, entry.repo, entry.descriptor_fields));
        }
        IndexRegistry { entries }
    }

    /// Fetches and parses `url` as a YAML `RegistryIndex`.
    pub fn fetch(url: &str) -> Result<IndexRegistry> {
        let body = reqwest::blocking::get(url)
            .and_then(|r| r.error_for_status())
            .map_err(|e| RegErrKind::MalformedEntry(url.to_string(), String::new(), e.to_string()))?
            .text()
            .map_err(|e| RegErrKind::MalformedEntry(url.to_string(), String::new(), e.to_string()))?;
        let index: RegistryIndex = serde_yaml::from_str(&body)
            .map_err(|e| RegErrKind::MalformedEntry(url.to_string(), String::new(), e.to_string()))?;
        Ok(IndexRegistry::from_index(index))
    }
}

impl Registry for IndexRegistry {
    fn resolve(&self, name: &str) -> Result<(String, String)> {
        if let Some((owner, repo, _)) = self.entries.get(name) {
            return Ok((owner.clone(), repo.clone()));
        }
        if let Some((owner, repo)) = name.split_once('/') {
            return Ok((owner.to_string(), repo.to_string()));
        }
        Err(RegErrKind::ToolNotFound(name.to_string()))?
    }

    fn tool(&self, owner: &str, repo: &str) -> Result<ToolDescriptor> {
        self.entries
            .values()
            .find(|(o, r, _)| o == owner && r == repo)
            .map(|(_, _, d)| d.clone())
            .ok_or_else(|| RegErrKind::ToolNotFound(format!("{}/{}", owner, repo)).into())
    }

    fn list_all(&self) -> Vec<(String, String)> {
        self.entries.values().map(|(o, r, _)| (o.clone(), r.clone())).collect()
    }
}

/// A directory-style registry: no index is ever fetched wholesale. `resolve`
/// only understands direct `owner/repo` addressing (there being no alias
/// table to consult), and `tool` fetches `<base>/<owner>/<repo>/registry.yaml`
/// lazily, once per call.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    base_url: String,
}

impl DirectoryRegistry {
    pub fn new(base_url: impl Into<String>) -> DirectoryRegistry {
        DirectoryRegistry { base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    fn entry_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/{}/{}/registry.yaml", self.base_url, owner, repo)
    }
}

impl Registry for DirectoryRegistry {
    fn resolve(&self, name: &str) -> Result<(String, String)> {
        name.split_once('/')
            .map(|(o, r)| (o.to_string(), r.to_string()))
            .ok_or_else(|| RegErrKind::ToolNotFound(name.to_string()).into())
    }

    fn tool(&self, owner: &str, repo: &str) -> Result<ToolDescriptor> {
        let url = self.entry_url(owner, repo);
        let body = reqwest::blocking::get(&url)
            .and_then(|r| r.error_for_status())
            .map_err(|e| RegErrKind::MalformedEntry(owner.to_string(), repo.to_string(), e.to_string()))?
            .text()
            .map_err(|e| RegErrKind::MalformedEntry(owner.to_string(), repo.to_string(), e.to_string()))?;
        serde_yaml::from_str(&body).map_err(|e| RegErrKind::MalformedEntry(owner.to_string(), repo.to_string(), e.to_string()).into())
    }

    /// Directory-style backends have nothing to enumerate without an index.
    fn list_all(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Whether a registry source string should be treated as an index (a
/// wholesale `packages: [...]` YAML document) or a directory base URL, per
/// spec.md §4.2: `.yaml`/`.yml` selects index mode, anything else directory
/// mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrySourceKind {
    Index,
    Directory,
}

pub fn classify_registry_source(source: &str) -> RegistrySourceKind {
    if source.ends_with(".yaml") || source.ends_with(".yml") {
        RegistrySourceKind::Index
    } else {
        RegistrySourceKind::Directory
    }
}

/// Rewrites a GitHub blob/raw URL for `owner/repo` at `path` to point at a
/// specific ref (tag or SHA), per spec.md §4.2: a
/// `github.com/<o>/<r>/<p>` URL becomes
/// `raw.githubusercontent.com/<o>/<r>/<ref>/<p>`.
pub fn rewrite_github_ref(url: &Url, owner: &str, repo: &str, git_ref: &str) -> Result<Url> {
    let prefix = format!("/{}/{}/", owner, repo);
    let path = url.path();
    if let Some(rest) = path.strip_prefix(&prefix) {
        let new_path = format!("/{}/{}/{}/{}", owner, repo, git_ref, rest);
        let mut out = url.clone();
        out.set_host(Some("raw.githubusercontent.com")).ok();
        out.set_path(&new_path);
        return Ok(out);
    }
    Ok(url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> ToolDescriptor {
        ToolDescriptor {
            registry_owner: "hashicorp".into(),
            registry_repo: "terraform".into(),
            alias: Some("terraform".into()),
            asset_template: "terraform_{version}_{os}_{arch}.zip".into(),
            format: AssetFormat::Zip,
            version_prefix: None,
            files: vec![],
            replacements: BTreeMap::new(),
            overrides: vec![],
        }
    }

    #[test]
    fn override_first_match_wins() {
        let mut d = desc();
        d.overrides = vec![
            Override { goos: Some("darwin".into()), ..Default::default() },
            Override { asset: Some("fallback.zip".into()), ..Default::default() },
        ];
        let resolved = d.resolved_for_platform("darwin", "arm64");
        assert_eq!(resolved.asset_template, d.asset_template); // darwin override has no asset set
        let resolved2 = d.resolved_for_platform("windows", "amd64");
        assert_eq!(resolved2.asset_template, "fallback.zip");
    }

    #[test]
    fn replacements_merge_not_replace() {
        let mut d = desc();
        d.replacements.insert("os".into(), "linux".into());
        let mut repl = BTreeMap::new();
        repl.insert("arch".into(), "x86_64".into());
        d.overrides = vec![Override { replacements: Some(repl), ..Default::default() }];
        let resolved = d.resolved_for_platform("linux", "amd64");
        assert_eq!(resolved.replacements.get("os").unwrap(), "linux");
        assert_eq!(resolved.replacements.get("arch").unwrap(), "x86_64");
    }

    #[test]
    fn inline_registry_owner_repo_passthrough() {
        let reg = InlineRegistry::default();
        assert_eq!(reg.resolve("hashicorp/terraform").unwrap(), ("hashicorp".into(), "terraform".into()));
        assert!(reg.resolve("terraform").is_err());
    }

    #[test]
    fn composite_dedupes_by_owner_repo() {
        let mut a = InlineRegistry::default();
        a.entries.insert("tf".into(), ("hashicorp".into(), "terraform".into(), desc()));
        let mut b = InlineRegistry::default();
        b.entries.insert("tf2".into(), ("hashicorp".into(), "terraform".into(), desc()));
        let composite = CompositeRegistry::new(vec![Box::new(a), Box::new(b)]);
        assert_eq!(composite.list_all().len(), 1);
    }

    #[test]
    fn classify_registry_source_by_extension() {
        assert_eq!(classify_registry_source("https://example.com/registry.yaml"), RegistrySourceKind::Index);
        assert_eq!(classify_registry_source("https://example.com/registry.yml"), RegistrySourceKind::Index);
        assert_eq!(classify_registry_source("https://example.com/registries"), RegistrySourceKind::Directory);
    }

    #[test]
    fn index_registry_resolves_by_alias_and_owner_repo() {
        let index = RegistryIndex {
            packages: vec![IndexEntry { owner: "hashicorp".into(), repo: "terraform".into(), alias: Some("terraform".into()), descriptor_fields: desc() }],
        };
        let reg = IndexRegistry::from_index(index);
        assert_eq!(reg.resolve("terraform").unwrap(), ("hashicorp".into(), "terraform".into()));
        assert_eq!(reg.resolve("hashicorp/terraform").unwrap(), ("hashicorp".into(), "terraform".into()));
        assert!(reg.tool("hashicorp", "terraform").is_ok());
        assert_eq!(reg.list_all().len(), 1);
    }

    #[test]
    fn index_registry_falls_back_to_owner_repo_key_without_alias() {
        let index = RegistryIndex {
            packages: vec![IndexEntry { owner: "kubernetes".into(), repo: "kubectl".into(), alias: None, descriptor_fields: desc() }],
        };
        let reg = IndexRegistry::from_index(index);
        assert_eq!(reg.resolve("kubernetes/kubectl").unwrap(), ("kubernetes".into(), "kubectl".into()));
    }

    #[test]
    fn directory_registry_resolve_requires_owner_repo_form() {
        let reg = DirectoryRegistry::new("https://example.com/registries");
        assert_eq!(reg.resolve("hashicorp/terraform").unwrap(), ("hashicorp".into(), "terraform".into()));
        assert!(reg.resolve("terraform").is_err());
        assert!(reg.list_all().is_empty());
    }

    #[test]
    fn directory_registry_entry_url_shape() {
        let reg = DirectoryRegistry::new("https://example.com/registries/");
        assert_eq!(reg.entry_url("hashicorp", "terraform"), "https://example.com/registries/hashicorp/terraform/registry.yaml");
    }
}
