/// Pluggable credential keyring (spec.md §4.7): a shared `CredentialStore`
/// trait over four backends (system keychain, encrypted file, in-memory,
/// noop), all speaking the realm-scoped envelope format from
/// `stackcat_core::credential_model`.

use stackcat_core::{CredentialEnvelope, Credentials, Realm};

pub mod system;
pub mod file;
pub mod memory;
pub mod noop;

#[derive(Debug)]
struct StoreError {
    inner: Context<StoreErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum StoreErrKind {
    #[fail(display = "credential store operation failed: {}", _0)]
    CredentialStore(String),

    #[fail(display = "no credentials found for '{}'", _0)]
    CredentialsNotFound(String),

    #[fail(display = "this backend does not support listing keys")]
    ListNotSupported,

    #[fail(display = "operation not supported by this backend")]
    NotSupported,
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for StoreError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<StoreErrKind> for StoreError {
    fn from(kind: StoreErrKind) -> StoreError {
        StoreError { inner: Context::new(kind) }
    }
}
impl From<Context<StoreErrKind>> for StoreError {
    fn from(inner: Context<StoreErrKind>) -> StoreError {
        StoreError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

/// Prefix used when scoping a keyring key to a realm:
/// `<prefix>:<realm>:<alias>` (spec.md §3/§6).
pub const KEYRING_REALM_PREFIX: &str = "stackcat";

/// Backend tag, surfaced by `CredentialStore::kind()` for diagnostics and
/// tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    System,
    File,
    Memory,
    Noop,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::System => "system",
            StoreKind::File => "file",
            StoreKind::Memory => "memory",
            StoreKind::Noop => "noop",
        }
    }
}

/// The keyring abstraction every backend implements identically (spec.md
/// §4.7). `Delete` is idempotent: deleting an absent alias succeeds.
pub trait CredentialStore {
    fn store(&self, alias: &str, creds: &Credentials, realm: &Realm) -> Result<()>;
    fn retrieve(&self, alias: &str, realm: &Realm) -> Result<Credentials>;
    fn delete(&self, alias: &str, realm: &Realm) -> Result<()>;
    fn list(&self, realm: &Realm) -> Result<Vec<String>>;
    fn is_expired(&self, alias: &str, realm: &Realm) -> Result<bool>;
    fn get_any(&self, key: &str) -> Result<Vec<u8>>;
    fn set_any(&self, key: &str, value: &[u8]) -> Result<()>;
    fn kind(&self) -> StoreKind;
}

/// Builds the realm-scoped key for `alias` under the shared keyring prefix.
pub fn scoped_key(realm: &Realm, alias: &str) -> String {
    stackcat_core::realm::scoped_key(KEYRING_REALM_PREFIX, realm, alias)
}

/// Seals `creds` into the on-disk envelope shape (spec.md §6).
pub fn seal(creds: &Credentials) -> Result<Vec<u8>> {
    let envelope = CredentialEnvelope::seal(creds)?;
    Ok(serde_json::to_vec(&envelope)?)
}

/// Opens an envelope back into `Credentials`.
pub fn open(bytes: &[u8]) -> Result<Credentials> {
    let envelope: CredentialEnvelope = serde_json::from_slice(bytes)?;
    Ok(envelope.open()?)
}

/// Selects a backend per spec.md §4.7's precedence: env
/// `ATMOS_KEYRING_TYPE` > `config_type` > default `system`. An unknown
/// type, or a backend whose construction fails, silently falls back to
/// `system`; if `system` also fails to construct, falls back to `noop`.
pub fn select(config_type: Option<&str>, file_path: Option<std::path::PathBuf>) -> Box<dyn CredentialStore> {
    let requested = std::env::var("ATMOS_KEYRING_TYPE").ok().filter(|v| !v.is_empty()).or_else(|| config_type.map(|s| s.to_string())).unwrap_or_else(|| "system".to_string());

    let built: Option<Box<dyn CredentialStore>> = match requested.as_str() {
        "memory" => Some(Box::new(memory::MemoryStore::new())),
        "noop" => Some(Box::new(noop::NoopStore::new())),
        "file" => file::FileStore::new(file_path.clone()).ok().map(|s| Box::new(s) as Box<dyn CredentialStore>),
        "system" => system::SystemStore::new().ok().map(|s| Box::new(s) as Box<dyn CredentialStore>),
        _ => None, // unknown type: fall through to the system/noop fallback chain below
    };

    if let Some(store) = built {
        return store;
    }
    if let Ok(store) = system::SystemStore::new() {
        return Box::new(store);
    }
    Box::new(noop::NoopStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_key_empty_realm_is_bare_alias() {
        assert_eq!(scoped_key(&Realm::empty(), "aws-prod"), "aws-prod");
    }

    #[test]
    fn seal_and_open_round_trip() {
        let creds = Credentials::Oidc(stackcat_core::OidcCredentials {
            token: "tok".to_string(),
            provider: "github".to_string(),
            audience: "aud".to_string(),
            expiration: None,
        });
        let bytes = seal(&creds).unwrap();
        let opened = open(&bytes).unwrap();
        assert_eq!(opened.kind(), creds.kind());
    }

    #[test]
    fn unknown_keyring_type_falls_back_without_panicking() {
        std::env::set_var("ATMOS_KEYRING_TYPE", "unknown-backend-xyz");
        let store = select(None, None);
        assert!(store.kind() == StoreKind::System || store.kind() == StoreKind::Noop);
        std::env::remove_var("ATMOS_KEYRING_TYPE");
    }
}
