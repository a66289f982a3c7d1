/// Realm: an opaque namespace label partitioning the credential keyring
/// keyspace. Source precedence: env var > config > auto (empty).

#[derive(Debug)]
struct RealmError {
    inner: Context<RealmErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum RealmErrKind {
    #[fail(display = "invalid realm '{}' from {}: {}", _0, _1, _2)]
    InvalidRealm(String, String, String),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for RealmError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for RealmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<RealmErrKind> for RealmError {
    fn from(kind: RealmErrKind) -> RealmError {
        RealmError { inner: Context::new(kind) }
    }
}
impl From<Context<RealmErrKind>> for RealmError {
    fn from(inner: Context<RealmErrKind>) -> RealmError {
        RealmError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum realm length. Kept as a named constant per spec.md §9's guidance
/// to keep behavioral-but-not-load-bearing constants configurable.
pub const MAX_REALM_LENGTH: usize = 64;

/// A validated realm string: lowercase `[a-z0-9]([a-z0-9_-]*[a-z0-9])?`, no
/// consecutive `-`/`_`, no leading/trailing `-`/`_`, no `..`, `/`, `\`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realm(String);

impl Realm {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The empty realm is legal and signals "no namespace".
    pub fn empty() -> Realm {
        Realm(String::new())
    }

    pub fn validate(s: &str, source: &str) -> Result<Realm> {
        if s.is_empty() {
            return Ok(Realm::empty());
        }
        if s.len() > MAX_REALM_LENGTH {
            return Err(RealmErrKind::InvalidRealm(s.to_string(), source.to_string(), format!("longer than {} characters", MAX_REALM_LENGTH)))?;
        }
        if s.contains("..") || s.contains('/') || s.contains('\\') {
            return Err(RealmErrKind::InvalidRealm(s.to_string(), source.to_string(), "contains a path separator or '..'".to_string()))?;
        }
        let bytes: Vec<char> = s.chars().collect();
        let is_alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
        if !is_alnum(bytes[0]) || !is_alnum(*bytes.last().unwrap()) {
            return Err(RealmErrKind::InvalidRealm(s.to_string(), source.to_string(), "must start and end with a lowercase alphanumeric".to_string()))?;
        }
        for c in &bytes {
            if !(is_alnum(*c) || *c == '-' || *c == '_') {
                return Err(RealmErrKind::InvalidRealm(s.to_string(), source.to_string(), format!("disallowed character '{}'", c)))?;
            }
        }
        for w in bytes.windows(2) {
            if (w[0] == '-' && w[1] == '-') || (w[0] == '_' && w[1] == '_') || (w[0] == '-' && w[1] == '_') || (w[0] == '_' && w[1] == '-') {
                return Err(RealmErrKind::InvalidRealm(s.to_string(), source.to_string(), "contains consecutive '-'/'_' ".to_string()))?;
            }
        }
        Ok(Realm(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealmSource {
    Env,
    Config,
    Auto,
}

#[derive(Debug, Clone)]
pub struct RealmInfo {
    pub realm: Realm,
    pub source: RealmSource,
}

/// Resolves the effective realm, preferring (in order): the env var
/// `env_var_name` (configured by the caller), then `config_realm`, then the
/// empty "no namespace" realm.
pub fn get_realm(env_var_name: &str, config_realm: Option<&str>) -> Result<RealmInfo> {
    if let Ok(v) = std::env::var(env_var_name) {
        if !v.is_empty() {
            let realm = Realm::validate(&v, &format!("env:{}", env_var_name))?;
            return Ok(RealmInfo { realm, source: RealmSource::Env });
        }
    }
    if let Some(v) = config_realm {
        if !v.is_empty() {
            let realm = Realm::validate(v, "config")?;
            return Ok(RealmInfo { realm, source: RealmSource::Config });
        }
    }
    Ok(RealmInfo { realm: Realm::empty(), source: RealmSource::Auto })
}

/// Builds the realm-scoped keyring key for `alias`: `<prefix>:<realm>:<alias>`
/// when the realm is non-empty, otherwise the bare alias.
pub fn scoped_key(prefix: &str, realm: &Realm, alias: &str) -> String {
    if realm.is_empty() {
        alias.to_string()
    } else {
        format!("{}:{}:{}", prefix, realm.as_str(), alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_valid() {
        assert!(Realm::validate("", "test").unwrap().is_empty());
    }

    #[test]
    fn basic_valid_realm() {
        let r = Realm::validate("prod-us-east", "test").unwrap();
        assert_eq!(r.as_str(), "prod-us-east");
    }

    #[test]
    fn rejects_leading_dash() {
        assert!(Realm::validate("-prod", "test").is_err());
    }

    #[test]
    fn rejects_trailing_underscore() {
        assert!(Realm::validate("prod_", "test").is_err());
    }

    #[test]
    fn rejects_consecutive_separators() {
        assert!(Realm::validate("prod--us", "test").is_err());
        assert!(Realm::validate("prod__us", "test").is_err());
    }

    #[test]
    fn rejects_path_traversal_like_strings() {
        assert!(Realm::validate("a/b", "test").is_err());
        assert!(Realm::validate("a..b", "test").is_err());
        assert!(Realm::validate("a\\b", "test").is_err());
    }

    #[test]
    fn rejects_uppercase() {
        assert!(Realm::validate("Prod", "test").is_err());
    }

    #[test]
    fn env_takes_precedence_over_config() {
        std::env::set_var("STACKCAT_TEST_REALM_PRECEDENCE", "from-env");
        let info = get_realm("STACKCAT_TEST_REALM_PRECEDENCE", Some("from-config")).unwrap();
        assert_eq!(info.realm.as_str(), "from-env");
        assert_eq!(info.source, RealmSource::Env);
        std::env::remove_var("STACKCAT_TEST_REALM_PRECEDENCE");
    }

    #[test]
    fn falls_back_to_config_then_auto() {
        std::env::remove_var("STACKCAT_TEST_REALM_FALLBACK");
        let info = get_realm("STACKCAT_TEST_REALM_FALLBACK", Some("from-config")).unwrap();
        assert_eq!(info.realm.as_str(), "from-config");
        assert_eq!(info.source, RealmSource::Config);

        let info2 = get_realm("STACKCAT_TEST_REALM_FALLBACK", None).unwrap();
        assert!(info2.realm.is_empty());
        assert_eq!(info2.source, RealmSource::Auto);
    }

    #[test]
    fn scoped_key_format() {
        let realm = Realm::validate("team-a", "test").unwrap();
        assert_eq!(scoped_key("stackcat", &realm, "aws-prod"), "stackcat:team-a:aws-prod");
        assert_eq!(scoped_key("stackcat", &Realm::empty(), "aws-prod"), "aws-prod");
    }

    #[test]
    fn disjoint_listing_by_realm() {
        use std::collections::BTreeSet;
        let a = Realm::validate("team-a", "t").unwrap();
        let b = Realm::validate("team-b", "t").unwrap();
        let keys_a: BTreeSet<_> = vec![scoped_key("p", &a, "x"), scoped_key("p", &a, "y")].into_iter().collect();
        let keys_b: BTreeSet<_> = vec![scoped_key("p", &b, "x"), scoped_key("p", &b, "y")].into_iter().collect();
        assert!(keys_a.is_disjoint(&keys_b));
    }
}
