/// Process-local credential store, `RwLock`-guarded (spec.md §4.7, §5):
/// writes require exclusive access, reads share. Realm scoping is the same
/// `scoped_key` every backend uses; with an empty realm `list` returns the
/// raw (unscoped) keys.

use std::collections::BTreeMap;
use std::sync::RwLock;

use stackcat_core::{Credentials, Realm};

use super::{scoped_key, seal, open, CredentialStore, StoreErrKind, StoreKind, Result};

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl CredentialStore for MemoryStore {
    fn store(&self, alias: &str, creds: &Credentials, realm: &Realm) -> Result<()> {
        let key = scoped_key(realm, alias);
        let bytes = seal(creds)?;
        let mut map = self.entries.write().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        map.insert(key, bytes);
        Ok(())
    }

    fn retrieve(&self, alias: &str, realm: &Realm) -> Result<Credentials> {
        let key = scoped_key(realm, alias);
        let map = self.entries.read().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        match map.get(&key) {
            Some(bytes) => open(bytes),
            None => Err(StoreErrKind::CredentialsNotFound(alias.to_string()))?,
        }
    }

    fn delete(&self, alias: &str, realm: &Realm) -> Result<()> {
        let key = scoped_key(realm, alias);
        let mut map = self.entries.write().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        map.remove(&key);
        Ok(())
    }

    fn list(&self, realm: &Realm) -> Result<Vec<String>> {
        let map = self.entries.read().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        if realm.is_empty() {
            return Ok(map.keys().cloned().collect());
        }
        let prefix = format!("{}:{}:", super::KEYRING_REALM_PREFIX, realm.as_str());
        Ok(map.keys().filter(|k| k.starts_with(&prefix)).map(|k| k[prefix.len()..].to_string()).collect())
    }

    fn is_expired(&self, alias: &str, realm: &Realm) -> Result<bool> {
        let creds = self.retrieve(alias, realm)?;
        Ok(creds.is_expired(chrono::Utc::now()))
    }

    fn get_any(&self, key: &str) -> Result<Vec<u8>> {
        let map = self.entries.read().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        map.get(key).cloned().ok_or_else(|| StoreErrKind::CredentialsNotFound(key.to_string()).into())
    }

    fn set_any(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut map = self.entries.write().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackcat_core::AwsCredentials;

    fn creds() -> Credentials {
        Credentials::Aws(AwsCredentials {
            access_key_id: "AKIA".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
            region: "us-east-1".to_string(),
            expiration: None,
        })
    }

    #[test]
    fn store_then_retrieve_round_trips() {
        let store = MemoryStore::new();
        let realm = Realm::empty();
        store.store("aws-prod", &creds(), &realm).unwrap();
        let got = store.retrieve("aws-prod", &realm).unwrap();
        assert_eq!(got.kind(), creds().kind());
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemoryStore::new();
        let realm = Realm::empty();
        store.delete("never-stored", &realm).unwrap();
        store.store("aws-prod", &creds(), &realm).unwrap();
        store.delete("aws-prod", &realm).unwrap();
        store.delete("aws-prod", &realm).unwrap();
        assert!(store.retrieve("aws-prod", &realm).is_err());
    }

    #[test]
    fn realm_listing_is_disjoint() {
        let store = MemoryStore::new();
        let realm_a = Realm::validate("team-a", "test").unwrap();
        let realm_b = Realm::validate("team-b", "test").unwrap();
        store.store("x", &creds(), &realm_a).unwrap();
        store.store("y", &creds(), &realm_b).unwrap();
        let list_a = store.list(&realm_a).unwrap();
        let list_b = store.list(&realm_b).unwrap();
        assert_eq!(list_a, vec!["x".to_string()]);
        assert_eq!(list_b, vec!["y".to_string()]);
    }

    #[test]
    fn concurrent_writers_do_not_corrupt_map() {
        use std::sync::Arc;
        use std::thread;
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store.store(&format!("alias-{}", i), &creds(), &Realm::empty()).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.list(&Realm::empty()).unwrap().len(), 8);
    }
}
