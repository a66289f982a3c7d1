/// Encrypted file-based keyring (spec.md §4.7). The whole keyspace lives in
/// one AES-256-GCM-encrypted JSON file; the key is derived from a password
/// via Argon2. The password comes from an env var (default
/// `ATMOS_KEYRING_PASSWORD`) or, failing that, an interactive TTY prompt
/// requiring at least 8 characters; construction fails in a non-TTY
/// context when neither source provides one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use rand::RngCore;

use stackcat_core::{Credentials, Realm};

use super::{scoped_key, seal, open, CredentialStore, StoreErrKind, StoreKind, Result};

const PASSWORD_ENV_VAR: &str = "ATMOS_KEYRING_PASSWORD";
const MIN_PASSWORD_LEN: usize = 8;
const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileKeyringData {
    #[serde(default)]
    salt: String,
    #[serde(default)]
    entries: std::collections::BTreeMap<String, String>,
}

pub struct FileStore {
    path: PathBuf,
    cipher: Aes256Gcm,
    data: Mutex<FileKeyringData>,
}

fn default_path() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".stackcat").join("credentials.enc")
}

fn is_stdin_tty() -> bool {
    #[cfg(unix)]
    unsafe {
        libc::isatty(libc::STDIN_FILENO) != 0
    }
    #[cfg(not(unix))]
    {
        false
    }
}

fn resolve_password() -> Result<String> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV_VAR) {
        if !pw.is_empty() {
            return Ok(pw);
        }
    }
    if !is_stdin_tty() {
        return Err(StoreErrKind::CredentialStore(format!("no {} set and stdin is not a TTY for an interactive prompt", PASSWORD_ENV_VAR)))?;
    }
    let pw = rpassword::prompt_password("stackcat keyring password: ").map_err(|e| StoreErrKind::CredentialStore(e.to_string()))?;
    if pw.len() < MIN_PASSWORD_LEN {
        return Err(StoreErrKind::CredentialStore(format!("password must be at least {} characters", MIN_PASSWORD_LEN)))?;
    }
    Ok(pw)
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default().hash_password_into(password.as_bytes(), salt, &mut key).map_err(|e| StoreErrKind::CredentialStore(e.to_string()))?;
    Ok(key)
}

fn load_or_init(path: &Path) -> Result<(FileKeyringData, Vec<u8>)> {
    if path.is_file() {
        let raw = fs::read(path)?;
        let data: FileKeyringData = serde_json::from_slice(&raw).map_err(|e| StoreErrKind::CredentialStore(e.to_string()))?;
        let salt = base64::decode(&data.salt).map_err(|e| StoreErrKind::CredentialStore(e.to_string()))?;
        Ok((data, salt))
    } else {
        let mut salt = vec![0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Ok((FileKeyringData { salt: base64::encode(&salt), entries: Default::default() }, salt))
    }
}

impl FileStore {
    pub fn new(path: Option<PathBuf>) -> Result<FileStore> {
        let path = path.unwrap_or_else(default_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let password = resolve_password()?;
        let (data, salt) = load_or_init(&path)?;
        let key = derive_key(&password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| StoreErrKind::CredentialStore(e.to_string()))?;
        Ok(FileStore { path, cipher, data: Mutex::new(data) })
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self.cipher.encrypt(nonce, plaintext).map_err(|e| StoreErrKind::CredentialStore(e.to_string()))?;
        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);
        Ok(base64::encode(&combined))
    }

    fn decrypt(&self, encoded: &str) -> Result<Vec<u8>> {
        let combined = base64::decode(encoded).map_err(|e| StoreErrKind::CredentialStore(e.to_string()))?;
        if combined.len() < NONCE_LEN {
            return Err(StoreErrKind::CredentialStore("ciphertext too short".to_string()))?;
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher.decrypt(nonce, ciphertext).map_err(|e| StoreErrKind::CredentialStore(format!("decryption failed (wrong password?): {}", e)).into())
    }

    fn flush(&self, data: &FileKeyringData) -> Result<()> {
        let body = serde_json::to_vec_pretty(data)?;
        fs::write(&self.path, body)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn store(&self, alias: &str, creds: &Credentials, realm: &Realm) -> Result<()> {
        let key = scoped_key(realm, alias);
        let bytes = seal(creds)?;
        let encrypted = self.encrypt(&bytes)?;
        let mut data = self.data.lock().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        data.entries.insert(key, encrypted);
        self.flush(&data)
    }

    fn retrieve(&self, alias: &str, realm: &Realm) -> Result<Credentials> {
        let key = scoped_key(realm, alias);
        let data = self.data.lock().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        let encrypted = data.entries.get(&key).ok_or_else(|| StoreErrKind::CredentialsNotFound(alias.to_string()))?;
        let bytes = self.decrypt(encrypted)?;
        open(&bytes)
    }

    fn delete(&self, alias: &str, realm: &Realm) -> Result<()> {
        let key = scoped_key(realm, alias);
        let mut data = self.data.lock().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        data.entries.remove(&key);
        self.flush(&data)
    }

    fn list(&self, realm: &Realm) -> Result<Vec<String>> {
        let data = self.data.lock().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        if realm.is_empty() {
            return Ok(data.entries.keys().cloned().collect());
        }
        let prefix = format!("{}:{}:", super::KEYRING_REALM_PREFIX, realm.as_str());
        Ok(data.entries.keys().filter(|k| k.starts_with(&prefix)).map(|k| k[prefix.len()..].to_string()).collect())
    }

    fn is_expired(&self, alias: &str, realm: &Realm) -> Result<bool> {
        let creds = self.retrieve(alias, realm)?;
        Ok(creds.is_expired(chrono::Utc::now()))
    }

    fn get_any(&self, key: &str) -> Result<Vec<u8>> {
        let data = self.data.lock().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        let encrypted = data.entries.get(key).ok_or_else(|| StoreErrKind::CredentialsNotFound(key.to_string()))?;
        self.decrypt(encrypted)
    }

    fn set_any(&self, key: &str, value: &[u8]) -> Result<()> {
        let encrypted = self.encrypt(value)?;
        let mut data = self.data.lock().map_err(|_| StoreErrKind::CredentialStore("lock poisoned".to_string()))?;
        data.entries.insert(key.to_string(), encrypted);
        self.flush(&data)
    }

    fn kind(&self) -> StoreKind {
        StoreKind::File
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

    fn store_at(dir: &Path) -> FileStore {
        std::env::set_var(PASSWORD_ENV_VAR, "super-secret-password");
        let store = FileStore::new(Some(dir.join("credentials.enc"))).unwrap();
        std::env::remove_var(PASSWORD_ENV_VAR);
        store
    }

    #[test]
    fn store_then_retrieve_round_trips_through_encryption() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path());
        let realm = Realm::empty();
        store.store("aws-prod", &creds(), &realm).unwrap();
        let got = store.retrieve("aws-prod", &realm).unwrap();
        assert_eq!(got.kind(), creds().kind());
    }

    #[test]
    fn survives_reopen_with_same_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.enc");
        std::env::set_var(PASSWORD_ENV_VAR, "super-secret-password");
        {
            let store = FileStore::new(Some(path.clone())).unwrap();
            store.store("aws-prod", &creds(), &Realm::empty()).unwrap();
        }
        {
            let store = FileStore::new(Some(path.clone())).unwrap();
            let got = store.retrieve("aws-prod", &Realm::empty()).unwrap();
            assert_eq!(got.kind(), creds().kind());
        }
        std::env::remove_var(PASSWORD_ENV_VAR);
    }

    #[test]
    fn wrong_password_fails_to_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.enc");
        std::env::set_var(PASSWORD_ENV_VAR, "super-secret-password");
        {
            let store = FileStore::new(Some(path.clone())).unwrap();
            store.store("aws-prod", &creds(), &Realm::empty()).unwrap();
        }
        std::env::set_var(PASSWORD_ENV_VAR, "a-different-password");
        {
            let store = FileStore::new(Some(path.clone())).unwrap();
            assert!(store.retrieve("aws-prod", &Realm::empty()).is_err());
        }
        std::env::remove_var(PASSWORD_ENV_VAR);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path());
        let realm = Realm::empty();
        store.delete("nope", &realm).unwrap();
        store.store("aws-prod", &creds(), &realm).unwrap();
        store.delete("aws-prod", &realm).unwrap();
        store.delete("aws-prod", &realm).unwrap();
    }
}
