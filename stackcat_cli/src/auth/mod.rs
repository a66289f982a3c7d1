/// Identity-chain walker (spec.md §4.9): for a target identity, resolves a
/// terminal `Credentials` value by walking `via` back to a provider,
/// consulting the credential store for a cached hit first and the retry
/// executor for transient-only STS/SSO failures, then projects the result
/// into per-profile AWS files and the process environment.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;

use stackcat_core::{AuthConfig, CancellationToken, Credentials, Identity, Provider, Realm, RetryConfig};

pub mod aws_files;

#[derive(Debug)]
struct ChainError {
    inner: Context<ChainErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ChainErrKind {
    #[fail(display = "identity '{}' is not defined in the auth configuration", _0)]
    UnknownIdentity(String),

    #[fail(display = "provider '{}' is not defined in the auth configuration", _0)]
    UnknownProvider(String),

    #[fail(display = "authentication for '{}' failed: {}", _0, _1)]
    AuthenticateFailed(String, String),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for ChainError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<ChainErrKind> for ChainError {
    fn from(kind: ChainErrKind) -> ChainError {
        ChainError { inner: Context::new(kind) }
    }
}
impl From<Context<ChainErrKind>> for ChainError {
    fn from(inner: Context<ChainErrKind>) -> ChainError {
        ChainError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum length and allowed character set for an STS session name.
const MAX_SESSION_NAME_LEN: usize = 64;

/// Sanitizes `raw` into the STS session-name character set
/// (`[A-Za-z0-9+=,.@-]`), truncates to 64 characters, collapses runs of
/// disallowed characters into a single `-`, strips a trailing `-`, and
/// falls back to the literal `atmos-session` if the result is empty
/// (spec.md §4.9).
pub fn sanitize_session_name(raw: &str) -> String {
    let mut out = String::new();
    let mut last_was_replacement = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || "+=,.@-".contains(c) {
            out.push(c);
            last_was_replacement = false;
        } else if !last_was_replacement {
            out.push('-');
            last_was_replacement = true;
        }
    }
    let truncated: String = out.chars().take(MAX_SESSION_NAME_LEN).collect();
    let trimmed = truncated.trim_end_matches('-').to_string();
    if trimmed.is_empty() {
        "atmos-session".to_string()
    } else {
        trimmed
    }
}

/// Classifies an authentication error as transient (worth retrying) by
/// matching the substrings AWS STS/SSO APIs commonly use for throttling and
/// transient service failures. Callers needing stricter classification can
/// supply their own predicate to `retry::with_predicate` directly.
pub fn is_transient_auth_error(err: &Error) -> bool {
    let msg = err.to_string().to_lowercase();
    ["throttl", "timeout", "timed out", "temporarily", "service unavailable", "internal error", "too many requests"]
        .iter()
        .any(|needle| msg.contains(needle))
}

/// Invokes a provider's authenticate primitive (SSO/SAML/OIDC token
/// exchange). The concrete SDK call is an external collaborator (spec.md
/// §1); this trait is the seam.
pub trait ProviderBackend {
    fn authenticate(&self, name: &str, provider: &Provider) -> Result<Credentials>;
}

/// Invokes an identity's `Authenticate(parentCreds)` (e.g. STS AssumeRole).
/// The concrete SDK call is an external collaborator; this trait is the
/// seam, with `session_name` pre-sanitized by the walker.
pub trait IdentityBackend {
    fn authenticate(&self, name: &str, identity: &Identity, parent: Option<&Credentials>, session_name: &str) -> Result<Credentials>;
}

/// Where per-identity AWS profile files get written, and what gets
/// projected into the process environment (spec.md §4.9, §6).
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub aws_profile: String,
    pub aws_shared_credentials_file: PathBuf,
    pub aws_config_file: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl AuthContext {
    /// The env vars produced by this projection, merged with the
    /// identity's own configured `env:` entries (spec.md §6); identity
    /// entries take precedence on key collision since they're explicit
    /// user configuration.
    pub fn to_env_map(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("AWS_PROFILE".to_string(), self.aws_profile.clone());
        out.insert("AWS_SHARED_CREDENTIALS_FILE".to_string(), self.aws_shared_credentials_file.display().to_string());
        out.insert("AWS_CONFIG_FILE".to_string(), self.aws_config_file.display().to_string());
        for (k, v) in &self.env {
            out.insert(k.clone(), v.clone());
        }
        out
    }
}

/// Walks an `AuthConfig`'s identity graph to produce terminal credentials,
/// caching in `store` under `realm` and projecting AWS file/env state on
/// success.
pub struct ChainWalker<'a> {
    pub config: &'a AuthConfig,
    pub store: &'a dyn crate::credential_store::CredentialStore,
    pub realm: Realm,
    pub providers: &'a dyn ProviderBackend,
    pub identities: &'a dyn IdentityBackend,
    pub retry: Option<RetryConfig>,
    pub profiles_root: PathBuf,
}

impl<'a> ChainWalker<'a> {
    /// Resolves `name` to terminal credentials, recursing through `via`, and
    /// surfaces the `AuthContext` (AWS profile/file/env projection)
    /// `post_authenticate` produces so callers can export it (spec.md §4.9
    /// step 4, §6). A cache hit skips re-running `post_authenticate`, so its
    /// `AuthContext` slot is `None`; the profile files it would have written
    /// were already written on the resolve that populated the cache.
    pub fn resolve(&self, name: &str) -> Result<(Credentials, Option<AuthContext>)> {
        if let Ok(cached) = self.store.retrieve(name, &self.realm) {
            if !cached.is_expired(Utc::now()) {
                return Ok((cached, None));
            }
        }

        let identity = self.config.identities.get(name).ok_or_else(|| ChainErrKind::UnknownIdentity(name.to_string()))?;

        let parent = match (&identity.via.identity, &identity.via.provider) {
            (Some(parent_name), _) => Some(self.resolve(parent_name)?.0),
            (None, Some(provider_name)) => {
                let provider = self.config.providers.get(provider_name).ok_or_else(|| ChainErrKind::UnknownProvider(provider_name.clone()))?;
                Some(self.providers.authenticate(provider_name, provider)?)
            }
            (None, None) => None,
        };

        let session_name = sanitize_session_name(name);
        let token = CancellationToken::new();
        let creds = stackcat_core::retry::with_predicate(self.retry.as_ref(), &token, is_transient_auth_error, || {
            self.identities.authenticate(name, identity, parent.as_ref(), &session_name).map_err(|e| ChainErrKind::AuthenticateFailed(name.to_string(), e.to_string()).into())
        })?;

        self.store.store(name, &creds, &self.realm)?;
        let ctx = self.post_authenticate(name, identity, &creds)?;
        Ok((creds, ctx))
    }

    /// Writes per-profile AWS `credentials`/`config` files and builds the
    /// `AuthContext` that would be projected into the environment, when
    /// `creds` is an AWS credential. OIDC credentials have no file
    /// projection and are skipped.
    fn post_authenticate(&self, name: &str, identity: &Identity, creds: &Credentials) -> Result<Option<AuthContext>> {
        let aws_creds = match creds {
            Credentials::Aws(c) => c,
            Credentials::Oidc(_) => return Ok(None),
        };

        let provider_namespace = identity.via.provider.as_deref().or(identity.via.identity.as_deref()).unwrap_or("default");
        let profile_dir = self.profiles_root.join(provider_namespace);
        std::fs::create_dir_all(&profile_dir)?;
        let credentials_file = profile_dir.join("credentials");
        let config_file = profile_dir.join("config");

        aws_files::write_credentials_file(&credentials_file, name, aws_creds)?;
        aws_files::write_config_file(&config_file, name, aws_creds)?;

        let mut env: BTreeMap<String, String> = BTreeMap::new();
        for entry in &identity.env {
            env.insert(entry.key.clone(), entry.value.clone());
        }

        Ok(Some(AuthContext { aws_profile: name.to_string(), aws_shared_credentials_file: credentials_file, aws_config_file: config_file, env }))
    }
}
