/// The `.tool-versions` pin file: an ordered map from alias (or
/// `owner/repo`) to a non-empty ordered list of version strings, index 0
/// being the active/default version.

use indexmap::IndexMap;
use std::io::{BufRead, Write};

#[derive(Debug)]
struct PinError {
    inner: Context<PinErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum PinErrKind {
    #[fail(display = "pin file line '{}' has no version entries", _0)]
    EmptyVersionList(String),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for PinError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<PinErrKind> for PinError {
    fn from(kind: PinErrKind) -> PinError {
        PinError { inner: Context::new(kind) }
    }
}
impl From<Context<PinErrKind>> for PinError {
    fn from(inner: Context<PinErrKind>) -> PinError {
        PinError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

/// An ordered alias -> version-list map, preserving both the insertion
/// order of aliases and the order of versions within each alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinFile {
    entries: IndexMap<String, Vec<String>>,
}

impl PinFile {
    pub fn new() -> Self {
        PinFile { entries: IndexMap::new() }
    }

    /// Reads a `.tool-versions`-shaped reader. Blank lines and `#`-comments
    /// are ignored. Unknown-alias entries (there being no such concept at
    /// this layer) are all tolerated; resolution-time filtering happens in
    /// the installer, not here.
    pub fn read<R: BufRead>(r: R) -> Result<PinFile> {
        let mut pf = PinFile::new();
        for line in r.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut parts = trimmed.split_whitespace();
            let alias = match parts.next() {
                Some(a) => a.to_string(),
                None => continue,
            };
            let versions: Vec<String> = parts.map(|p| p.to_string()).collect();
            if versions.is_empty() {
                return Err(PinErrKind::EmptyVersionList(alias))?;
            }
            pf.entries.insert(alias, versions);
        }
        Ok(pf)
    }

    /// Writes back out in `<alias> <v1> [v2 ...]` form, preserving
    /// insertion order of both aliases and within-alias version lists.
    pub fn write<W: Write>(&self, mut w: W) -> Result<()> {
        for (alias, versions) in &self.entries {
            writeln!(w, "{} {}", alias, versions.join(" "))?;
        }
        Ok(())
    }

    pub fn get(&self, alias: &str) -> Option<&[String]> {
        self.entries.get(alias).map(|v| v.as_slice())
    }

    pub fn default_version(&self, alias: &str) -> Option<&str> {
        self.entries.get(alias).and_then(|v| v.first()).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Updates the version list for `alias`. If `set_default`, the version
    /// is prepended (and de-duplicated if already present further down the
    /// list); otherwise it's appended only if not already present.
    pub fn set_version(&mut self, alias: &str, version: &str, set_default: bool) {
        let versions = self.entries.entry(alias.to_string()).or_insert_with(Vec::new);
        versions.retain(|v| v != version);
        if set_default {
            versions.insert(0, version.to_string());
        } else if versions.is_empty() {
            versions.push(version.to_string());
        } else {
            versions.push(version.to_string());
        }
    }

    /// Removes `alias` from the pin file. If `version` is empty, removes
    /// the alias regardless of what versions are pinned; if non-empty,
    /// removes only when the given version is pinned, erroring on a
    /// mismatch.
    ///
    /// This preserves the original tool's documented-but-debatable
    /// behavior (spec.md §9 open question): empty `version` means "remove
    /// regardless", a mismatched non-empty `version` is an error.
    pub fn remove_tool(&mut self, alias: &str, version: &str) -> Result<()> {
        if version.is_empty() {
            self.entries.shift_remove(alias);
            return Ok(());
        }
        match self.entries.get(alias) {
            Some(versions) if versions.iter().any(|v| v == version) => {
                self.entries.shift_remove(alias);
                Ok(())
            }
            Some(_) => bail!("tool '{}' is not pinned at version '{}'", alias, version),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_preserves_order() {
        let src = "terraform 1.11.4 1.10.0\n# a comment\n\nkubectl 1.28.0\n";
        let pf = PinFile::read(Cursor::new(src)).unwrap();
        let mut out = Vec::new();
        pf.write(&mut out).unwrap();
        let pf2 = PinFile::read(Cursor::new(out)).unwrap();
        assert_eq!(pf, pf2);
        assert_eq!(pf2.aliases().collect::<Vec<_>>(), vec!["terraform", "kubectl"]);
        assert_eq!(pf2.default_version("terraform"), Some("1.11.4"));
    }

    #[test]
    fn blank_and_comment_lines_ignored() {
        let pf = PinFile::read(Cursor::new("\n# nothing here\n  \nhelm 3.12.0\n")).unwrap();
        assert_eq!(pf.len(), 1);
    }

    #[test]
    fn empty_version_list_is_error() {
        assert!(PinFile::read(Cursor::new("terraform\n")).is_err());
    }

    #[test]
    fn set_default_prepends() {
        let mut pf = PinFile::new();
        pf.set_version("terraform", "1.0.0", false);
        pf.set_version("terraform", "1.1.0", true);
        assert_eq!(pf.get("terraform").unwrap(), &["1.1.0".to_string(), "1.0.0".to_string()]);
    }

    #[test]
    fn remove_tool_empty_version_removes_regardless() {
        let mut pf = PinFile::new();
        pf.set_version("terraform", "1.0.0", true);
        pf.remove_tool("terraform", "").unwrap();
        assert!(pf.get("terraform").is_none());
    }

    #[test]
    fn remove_tool_mismatch_errors() {
        let mut pf = PinFile::new();
        pf.set_version("terraform", "1.0.0", true);
        assert!(pf.remove_tool("terraform", "9.9.9").is_err());
        assert!(pf.get("terraform").is_some());
    }

    #[test]
    fn remove_tool_unknown_alias_is_ok() {
        let mut pf = PinFile::new();
        assert!(pf.remove_tool("nope", "1.0.0").is_ok());
    }
}
