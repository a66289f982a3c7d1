/// Auth configuration data model and validator: providers, identities, the
/// `via` chain between them, and DFS cycle detection over the identity
/// graph.

use std::collections::BTreeMap;
use petgraph::graphmap::DiGraphMap;
use petgraph::algo::is_cyclic_directed;

#[derive(Debug)]
struct AuthError {
    inner: Context<AuthErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum AuthErrKind {
    #[fail(display = "invalid auth config: {}", _0)]
    InvalidAuthConfig(String),

    #[fail(display = "invalid provider '{}': {}", _0, _1)]
    InvalidProviderConfig(String, String),

    #[fail(display = "invalid identity '{}': {}", _0, _1)]
    InvalidIdentityConfig(String, String),

    #[fail(display = "unknown provider kind '{}'", _0)]
    InvalidProviderKind(String),

    #[fail(display = "identity graph contains a cycle reachable from '{}'", _0)]
    IdentityCycle(String),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for AuthError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<AuthErrKind> for AuthError {
    fn from(kind: AuthErrKind) -> AuthError {
        AuthError { inner: Context::new(kind) }
    }
}
impl From<Context<AuthErrKind>> for AuthError {
    fn from(inner: Context<AuthErrKind>) -> AuthError {
        AuthError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Logs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Sso,
    Saml,
    Oidc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

impl Provider {
    fn validate(&self, name: &str) -> Result<()> {
        match self.kind {
            ProviderKind::Sso => {
                if self.start_url.is_none() {
                    return Err(AuthErrKind::InvalidProviderConfig(name.to_string(), "sso provider requires start_url".to_string()))?;
                }
            }
            ProviderKind::Saml => {
                if self.url.is_none() {
                    return Err(AuthErrKind::InvalidProviderConfig(name.to_string(), "saml provider requires url".to_string()))?;
                }
            }
            ProviderKind::Oidc => {
                if self.audience.is_none() {
                    return Err(AuthErrKind::InvalidProviderConfig(name.to_string(), "oidc provider requires audience".to_string()))?;
                }
            }
        }
        if self.region.is_empty() {
            return Err(AuthErrKind::InvalidProviderConfig(name.to_string(), "region is required".to_string()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityKind {
    AwsUser,
    AwsAssumeRole,
    AwsPermissionSet,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Via {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub kind: IdentityKind,
    #[serde(default)]
    pub via: Via,
    #[serde(default)]
    pub principal: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub env: Vec<EnvEntry>,
}

impl Identity {
    fn validate(&self, name: &str, providers: &BTreeMap<String, Provider>, identities: &BTreeMap<String, Identity>) -> Result<()> {
        let has_provider = self.via.provider.is_some();
        let has_identity = self.via.identity.is_some();

        if has_provider && has_identity {
            return Err(AuthErrKind::InvalidIdentityConfig(name.to_string(), "via.provider and via.identity are mutually exclusive".to_string()))?;
        }
        if !has_provider && !has_identity && self.kind != IdentityKind::AwsUser {
            return Err(AuthErrKind::InvalidIdentityConfig(name.to_string(), "via is required unless kind is aws/user".to_string()))?;
        }

        if let Some(p) = &self.via.provider {
            if !providers.contains_key(p) {
                return Err(AuthErrKind::InvalidIdentityConfig(name.to_string(), format!("via.provider '{}' does not exist", p)))?;
            }
        }
        if let Some(i) = &self.via.identity {
            if !identities.contains_key(i) {
                return Err(AuthErrKind::InvalidIdentityConfig(name.to_string(), format!("via.identity '{}' does not exist", i)))?;
            }
        }

        match self.kind {
            IdentityKind::AwsUser => {}
            IdentityKind::AwsAssumeRole => {
                if !self.principal.contains_key("assume_role") {
                    return Err(AuthErrKind::InvalidIdentityConfig(name.to_string(), "aws/assume-role requires principal.assume_role".to_string()))?;
                }
            }
            IdentityKind::AwsPermissionSet => {
                if !self.principal.contains_key("name") || !self.principal.contains_key("account") {
                    return Err(AuthErrKind::InvalidIdentityConfig(name.to_string(), "aws/permission-set requires principal.name and principal.account".to_string()))?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub logs: Logs,
    #[serde(default)]
    pub providers: BTreeMap<String, Provider>,
    #[serde(default)]
    pub identities: BTreeMap<String, Identity>,
}

impl AuthConfig {
    /// Validates providers, identities, `via` shape, and DFS-checks the
    /// `via.identity` graph for cycles, in the order spec.md §4.8
    /// describes.
    pub fn validate(&self) -> Result<()> {
        for (name, provider) in &self.providers {
            provider.validate(name)?;
        }
        for (name, identity) in &self.identities {
            identity.validate(name, &self.providers, &self.identities)?;
        }
        self.check_acyclic()?;
        Ok(())
    }

    /// DFS cycle detection over the `via.identity` adjacency map.
    pub fn check_acyclic(&self) -> Result<()> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.identities.keys() {
            graph.add_node(name.as_str());
        }
        for (name, identity) in &self.identities {
            if let Some(parent) = &identity.via.identity {
                graph.add_edge(name.as_str(), parent.as_str(), ());
            }
        }
        if is_cyclic_directed(&graph) {
            // Identify one offending identity for a more useful error message.
            let offender = self
                .identities
                .keys()
                .find(|name| self.is_on_cycle(name, &mut Vec::new()))
                .cloned()
                .unwrap_or_default();
            return Err(AuthErrKind::IdentityCycle(offender))?;
        }
        Ok(())
    }

    fn is_on_cycle(&self, start: &str, stack: &mut Vec<String>) -> bool {
        if stack.iter().any(|s| s == start) {
            return true;
        }
        stack.push(start.to_string());
        let result = match self.identities.get(start).and_then(|i| i.via.identity.as_ref()) {
            Some(parent) => self.is_on_cycle(parent, stack),
            None => false,
        };
        stack.pop();
        result
    }
}
