//! Session context: the signed-in user, persisted in a key-value store.
//!
//! Replaces ambient global auth state. A `SessionContext` is created once at
//! startup with [`SessionContext::restore`], passed to whatever needs the
//! current user, and torn down with [`SessionContext::sign_out`].

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use crm_core::CrmResult;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::identity::IdentityClaims;

/// Persisted key-value blob storage.
pub trait SessionStore {
    fn get(&self, key: &str) -> CrmResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> CrmResult<()>;
    fn remove(&self, key: &str) -> CrmResult<()>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> CrmResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> CrmResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CrmResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Stores all keys in one JSON object file. A missing file is an empty store.
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// A file that does not parse is removed and read as an empty store.
    fn read_all(&self) -> CrmResult<HashMap<String, String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable session file");
                self.write_all(&HashMap::new())?;
                Ok(HashMap::new())
            }
        }
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> CrmResult<()> {
        if entries.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }
        // write-then-rename: readers never see a partial blob
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> CrmResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> CrmResult<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> CrmResult<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all()?;
        entries.remove(key);
        self.write_all(&entries)
    }
}

pub struct SessionContext<S: SessionStore> {
    store: S,
    key: String,
    user: Option<IdentityClaims>,
    signed_in_at: Option<DateTime<Utc>>,
}

impl<S: SessionStore> SessionContext<S> {
    /// Read the persisted user, if any. A blob that does not parse is
    /// removed and the session starts signed out.
    pub fn restore(store: S, key: impl Into<String>) -> CrmResult<Self> {
        let key = key.into();
        let user = match store.get(&key)? {
            None => None,
            Some(raw) => match serde_json::from_str::<IdentityClaims>(&raw) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding unreadable session blob");
                    store.remove(&key)?;
                    None
                }
            },
        };
        if let Some(u) = &user {
            info!(user = %u.display_name(), "Session restored");
        }
        Ok(Self {
            store,
            key,
            user,
            signed_in_at: None,
        })
    }

    pub fn sign_in(&mut self, claims: IdentityClaims) -> CrmResult<&IdentityClaims> {
        let raw = serde_json::to_string(&claims)?;
        self.store.set(&self.key, &raw)?;
        info!(user = %claims.display_name(), "Signed in");
        self.signed_in_at = Some(Utc::now());
        Ok(self.user.insert(claims))
    }

    pub fn sign_out(&mut self) -> CrmResult<()> {
        self.store.remove(&self.key)?;
        if let Some(u) = self.user.take() {
            info!(user = %u.display_name(), "Signed out");
        }
        self.signed_in_at = None;
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&IdentityClaims> {
        self.user.as_ref()
    }

    /// Set only when sign-in happened in this process.
    pub fn signed_in_at(&self) -> Option<DateTime<Utc>> {
        self.signed_in_at
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
