/// The noop backend: used when no keyring is usable but the workflow must
/// still proceed against live SDK credential chains (spec.md §4.7). `Store`
/// and `Delete` succeed without persisting anything; reads always miss.
///
/// Carries a small validation cache (spec.md §9 open question): these TTLs
/// are behavioral but not obviously load-bearing, so they're kept as
/// configurable constants rather than hardcoded magic numbers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use stackcat_core::{Credentials, Realm};

use super::{CredentialStore, StoreErrKind, StoreKind, Result};

/// How long a validated credential is considered still-valid without
/// rechecking (spec.md §9).
pub const VALIDATION_TTL: Duration = Duration::from_secs(5 * 60);
/// How long before expiration a credential is flagged in the validation
/// cache as "nearing expiry" (spec.md §9).
pub const EXPIRATION_WARNING_THRESHOLD: Duration = Duration::from_secs(15 * 60);

pub struct NoopStore {
    validated_at: Mutex<HashMap<String, Instant>>,
}

impl NoopStore {
    pub fn new() -> NoopStore {
        NoopStore { validated_at: Mutex::new(HashMap::new()) }
    }

    /// Records that `key` was just validated, for `was_recently_validated`.
    pub fn mark_validated(&self, key: &str) {
        if let Ok(mut map) = self.validated_at.lock() {
            map.insert(key.to_string(), Instant::now());
        }
    }

    /// Whether `key` was validated within `VALIDATION_TTL`.
    pub fn was_recently_validated(&self, key: &str) -> bool {
        self.validated_at
            .lock()
            .ok()
            .and_then(|map| map.get(key).copied())
            .map_or(false, |at| at.elapsed() < VALIDATION_TTL)
    }
}

impl CredentialStore for NoopStore {
    fn store(&self, _alias: &str, _creds: &Credentials, _realm: &Realm) -> Result<()> {
        Ok(())
    }

    fn retrieve(&self, alias: &str, _realm: &Realm) -> Result<Credentials> {
        Err(StoreErrKind::CredentialsNotFound(alias.to_string()))?
    }

    fn delete(&self, _alias: &str, _realm: &Realm) -> Result<()> {
        Ok(())
    }

    fn list(&self, _realm: &Realm) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn is_expired(&self, alias: &str, _realm: &Realm) -> Result<bool> {
        Err(StoreErrKind::CredentialsNotFound(alias.to_string()))?
    }

    fn get_any(&self, key: &str) -> Result<Vec<u8>> {
        Err(StoreErrKind::CredentialsNotFound(key.to_string()))?
    }

    fn set_any(&self, _key: &str, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Noop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackcat_core::OidcCredentials;

    fn creds() -> Credentials {
        Credentials::Oidc(OidcCredentials { token: "t".to_string(), provider: "p".to_string(), audience: "a".to_string(), expiration: None })
    }

    #[test]
    fn store_and_delete_succeed_without_persisting() {
        let store = NoopStore::new();
        let realm = Realm::empty();
        store.store("x", &creds(), &realm).unwrap();
        assert!(store.retrieve("x", &realm).is_err());
        store.delete("x", &realm).unwrap();
        store.delete("x", &realm).unwrap();
    }

    #[test]
    fn list_is_always_empty() {
        let store = NoopStore::new();
        assert!(store.list(&Realm::empty()).unwrap().is_empty());
    }

    #[test]
    fn validation_cache_respects_ttl_marker() {
        let store = NoopStore::new();
        assert!(!store.was_recently_validated("k"));
        store.mark_validated("k");
        assert!(store.was_recently_validated("k"));
    }
}
