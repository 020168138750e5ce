use crate::types::User;
use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

const SESSION_FILE: &str = "session.json";
const KEY_FILE: &str = ".secret_key";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
    #[serde(default)]
    pub google_ads_connected: bool,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.user.is_some()
    }

    pub fn clear(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.user = None;
        self.google_ads_connected = false;
    }
}

/// Encrypted on-disk home of the [`Session`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn default_location() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "adsight", "adsight")
            .ok_or_else(|| anyhow!("Could not determine project directories"))?;
        Ok(Self::new(proj_dirs.data_dir()))
    }

    pub fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    pub fn load(&self) -> Result<Option<Session>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }

        let encrypted = fs::read(&path)?;
        let decrypted = self.decrypt(&encrypted)?;
        let session: Session = serde_json::from_slice(&decrypted)?;
        Ok(Some(session))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec(session)?;
        let encrypted = self.encrypt(&json)?;
        write_secure_file(&self.session_path(), &encrypted)?;
        Ok(())
    }

    pub fn remove(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn get_or_create_key(&self) -> Result<[u8; 32]> {
        let path = self.dir.join(KEY_FILE);

        if path.exists() {
            let key_bytes = fs::read(&path)?;
            if key_bytes.len() == 32 {
                let mut key = [0u8; 32];
                key.copy_from_slice(&key_bytes);
                return Ok(key);
            }
        }

        fs::create_dir_all(&self.dir)?;
        let mut key = [0u8; 32];
        rand::thread_rng().fill(&mut key);
        write_secure_file(&path, &key)?;
        Ok(key)
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        use aes_gcm::{
            aead::{Aead, KeyInit},
            Aes256Gcm, Nonce,
        };

        let key = self.get_or_create_key()?;
        let cipher = Aes256Gcm::new(aes_gcm::aead::Key::<Aes256Gcm>::from_slice(&key));

        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| anyhow!("Encryption failed"))?;

        let mut result = nonce_bytes.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        use aes_gcm::{
            aead::{Aead, KeyInit},
            Aes256Gcm, Nonce,
        };

        if ciphertext.len() < 12 {
            return Err(anyhow!("Invalid ciphertext"));
        }

        let key = self.get_or_create_key()?;
        let cipher = Aes256Gcm::new(aes_gcm::aead::Key::<Aes256Gcm>::from_slice(&key));

        let nonce = Nonce::from_slice(&ciphertext[..12]);
        cipher
            .decrypt(nonce, &ciphertext[12..])
            .map_err(|_| anyhow!("Decryption failed"))
    }
}

fn write_secure_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata()?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// Shared, write-through handle on the current session. Clones see the same
/// state; every mutation is persisted when a store is attached.
#[derive(Clone, Default)]
pub struct Credentials {
    inner: Arc<RwLock<Session>>,
    store: Option<SessionStore>,
}

impl Credentials {
    pub fn in_memory(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
            store: None,
        }
    }

    pub fn load(store: SessionStore) -> Result<Self> {
        let session = store.load()?.unwrap_or_default();
        Ok(Self {
            inner: Arc::new(RwLock::new(session)),
            store: Some(store),
        })
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner.read().await.access_token.clone()
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.inner.read().await.refresh_token.clone()
    }

    pub async fn user(&self) -> Option<User> {
        self.inner.read().await.user.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.is_authenticated()
    }

    pub async fn is_google_ads_connected(&self) -> bool {
        self.inner.read().await.google_ads_connected
    }

    pub async fn sign_in(
        &self,
        access_token: Option<String>,
        refresh_token: Option<String>,
        user: User,
    ) -> Result<()> {
        self.update(|s| {
            if access_token.is_some() {
                s.access_token = access_token;
            }
            if refresh_token.is_some() {
                s.refresh_token = refresh_token;
            }
            s.user = Some(user);
        })
        .await
    }

    pub async fn set_access_token(&self, token: String) -> Result<()> {
        self.update(|s| s.access_token = Some(token)).await
    }

    pub async fn set_google_ads_connected(&self, connected: bool) -> Result<()> {
        self.update(|s| s.google_ads_connected = connected).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.update(Session::clear).await
    }

    async fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Session),
    {
        let mut session = self.inner.write().await;
        mutate(&mut session);
        if let Some(store) = &self.store {
            store.save(&session)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "7".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
        }
    }

    #[test]
    fn store_round_trips_encrypted_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = Session {
            access_token: Some("access".into()),
            refresh_token: Some("refresh".into()),
            user: Some(user()),
            google_ads_connected: true,
        };

        store.save(&session).unwrap();
        let raw = fs::read(store.session_path()).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("access"));

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token.as_deref(), Some("access"));
        assert!(loaded.google_ads_connected);
    }

    #[test]
    fn missing_session_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SessionStore::new(dir.path()).load().unwrap().is_none());
    }

    #[tokio::test]
    async fn credentials_persist_every_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let creds = Credentials::load(store.clone()).unwrap();

        creds
            .sign_in(Some("a1".into()), Some("r1".into()), user())
            .await
            .unwrap();
        creds.set_access_token("a2".into()).await.unwrap();

        let on_disk = store.load().unwrap().unwrap();
        assert_eq!(on_disk.access_token.as_deref(), Some("a2"));
        assert_eq!(on_disk.refresh_token.as_deref(), Some("r1"));
        assert!(creds.is_authenticated().await);

        creds.clear().await.unwrap();
        let cleared = store.load().unwrap().unwrap();
        assert!(cleared.access_token.is_none());
        assert!(cleared.user.is_none());
        assert!(!creds.is_authenticated().await);
    }
}
