/// Classifies a user-supplied version string into one of semver / PR number /
/// commit SHA / `latest` / invalid.

use regex::Regex;

// New failure error type
#[derive(Debug)]
struct VSError {
    inner: Context<VSErrKind>,
}
// its associated enum
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum VSErrKind {
    #[fail(display = "version string '{}' does not parse as semver, PR, SHA or 'latest'", _0)]
    VersionFormatInvalid(String),
}
use failure::{Error, Fail, Context, Backtrace, ResultExt};
use std::fmt::{self, Display};

impl Fail for VSError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for VSError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<VSErrKind> for VSError {
    fn from(kind: VSErrKind) -> VSError {
        VSError { inner: Context::new(kind) }
    }
}
impl From<Context<VSErrKind>> for VSError {
    fn from(inner: Context<VSErrKind>) -> VSError {
        VSError { inner: inner }
    }
}
type Result<T> = std::result::Result<T, Error>;

/// A classified version specifier.
///
/// `Pr` and `Sha` variants hold the un-prefixed value (the bare integer or
/// the bare hex string); `Semver` holds the original string verbatim
/// (including a leading `v` if present, or the literal `latest`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionSpec {
    Semver(String),
    Pr(u64),
    Sha(String),
    Latest,
}

/// All-digit strings of any length are PR numbers (must be non-zero).
pub fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// `[v]N.N[.N...]` or the literal `latest`.
pub fn is_valid_semver(s: &str) -> bool {
    if s.eq_ignore_ascii_case("latest") {
        return true;
    }
    lazy_static_semver_re().is_match(s)
}

/// 7-40 lowercase hex characters containing at least one `a-f`, to
/// disambiguate from an all-digit PR number.
pub fn is_valid_sha(s: &str) -> bool {
    if s.len() < 7 || s.len() > 40 {
        return false;
    }
    if !s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
        return false;
    }
    s.chars().any(|c| matches!(c, 'a'..='f'))
}

fn lazy_static_semver_re() -> Regex {
    // v?N(.N)*  -- permissive shape check only, not full semver grammar
    Regex::new(r"^v?\d+(\.\d+){0,3}([-+][0-9A-Za-z.-]+)?$").expect("static regex is valid")
}

/// Parses `s` per spec.md §4.1, in order: empty -> error; `pr:` prefix ->
/// positive integer suffix required; `sha:` prefix -> bare suffix; all-digit
/// -> PR; semver shape -> Semver; 7-40 lowercase hex with an `a-f` -> SHA;
/// otherwise invalid.
///
/// Total and pure: every input maps to either `Ok(VersionSpec)` or an error
/// wrapping `VSErrKind::VersionFormatInvalid`, and calling `parse` twice on
/// the same input always yields the same classification.
pub fn parse(s: &str) -> Result<VersionSpec> {
    if s.is_empty() {
        return Err(VSErrKind::VersionFormatInvalid(s.to_string()))?;
    }

    if let Some(rest) = s.strip_prefix("pr:") {
        return match rest.parse::<u64>() {
            Ok(n) if n > 0 => Ok(VersionSpec::Pr(n)),
            _ => Err(VSErrKind::VersionFormatInvalid(s.to_string()))?,
        };
    }

    if let Some(rest) = s.strip_prefix("sha:") {
        return if is_valid_sha(rest) || (rest.len() >= 7 && rest.len() <= 40 && rest.chars().all(|c| c.is_ascii_hexdigit())) {
            Ok(VersionSpec::Sha(rest.to_lowercase()))
        } else {
            Err(VSErrKind::VersionFormatInvalid(s.to_string()))?
        };
    }

    if is_all_digits(s) {
        let n: u64 = s.parse().context(VSErrKind::VersionFormatInvalid(s.to_string()))?;
        if n == 0 {
            return Err(VSErrKind::VersionFormatInvalid(s.to_string()))?;
        }
        return Ok(VersionSpec::Pr(n));
    }

    if s.eq_ignore_ascii_case("latest") {
        return Ok(VersionSpec::Latest);
    }

    if is_valid_semver(s) {
        return Ok(VersionSpec::Semver(s.to_string()));
    }

    if is_valid_sha(s) {
        return Ok(VersionSpec::Sha(s.to_string()));
    }

    Err(VSErrKind::VersionFormatInvalid(s.to_string()))?
}

/// The directory-name component of an install path, computed only from
/// the version-spec type (spec.md §8 invariant).
pub fn version_dir(spec: &VersionSpec) -> String {
    match spec {
        VersionSpec::Semver(v) => v.clone(),
        VersionSpec::Pr(n) => format!("pr-{}", n),
        VersionSpec::Sha(sha) => format!("sha-{}", short_sha(sha)),
        VersionSpec::Latest => "latest".to_string(),
    }
}

/// The short (7-char) form of a commit SHA used in directory names and
/// `.cache.json` metadata.
pub fn short_sha(sha: &str) -> String {
    sha.chars().take(7).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_invalid() {
        assert!(parse("").is_err());
    }

    #[test]
    fn pr_prefix() {
        assert_eq!(parse("pr:42").unwrap(), VersionSpec::Pr(42));
        assert!(parse("pr:0").is_err());
        assert!(parse("pr:abc").is_err());
    }

    #[test]
    fn sha_prefix() {
        assert_eq!(parse("sha:abc1234").unwrap(), VersionSpec::Sha("abc1234".into()));
    }

    #[test]
    fn all_digits_is_pr() {
        assert_eq!(parse("123456").unwrap(), VersionSpec::Pr(123456));
        assert!(parse("0").is_err());
    }

    #[test]
    fn semver_shapes() {
        assert_eq!(parse("1.11.4").unwrap(), VersionSpec::Semver("1.11.4".into()));
        assert_eq!(parse("v1.11.4").unwrap(), VersionSpec::Semver("v1.11.4".into()));
        assert_eq!(parse("latest").unwrap(), VersionSpec::Latest);
        assert_eq!(parse("LATEST").unwrap(), VersionSpec::Latest);
    }

    #[test]
    fn sha_needs_a_hex_letter() {
        // 7 digits only -- classifies as PR since it's all-digit and checked first
        assert_eq!(parse("1234567").unwrap(), VersionSpec::Pr(1234567));
        // with a hex letter it's unambiguously a SHA
        assert_eq!(parse("123456a").unwrap(), VersionSpec::Sha("123456a".into()));
    }

    #[test]
    fn invalid_garbage() {
        assert!(parse("!!!not-a-version").is_err());
    }

    #[test]
    fn parse_is_idempotent() {
        for s in &["1.2.3", "pr:7", "sha:deadbee", "99999", "latest", "garbage!!"] {
            let a = parse(s).map(|v| format!("{:?}", v)).unwrap_or_else(|e| e.to_string());
            let b = parse(s).map(|v| format!("{:?}", v)).unwrap_or_else(|e| e.to_string());
            assert_eq!(a, b);
        }
    }
}
