// src/credential.rs
//! Session-scoped API credential (the "credential gate").
//!
//! The store is passed around as context (router state, controller) instead of living
//! in a global. It is initialised once on load (`init_from_env`) and cleared when the
//! session ends.

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::info;

pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("API key must not be empty")]
    Empty,
    #[error("API key already captured for this session")]
    AlreadySet,
}

/// An API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Trims the input; rejects empty keys.
    pub fn new(raw: &str) -> Result<Self, CredentialError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(CredentialError::Empty);
        }
        Ok(Self(key.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short SHA-256 prefix, safe for logs and API responses.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(self.0.as_bytes());
        let mut out = String::with_capacity(12);
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.fingerprint())
    }
}

#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<Credential>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with a key (tests, demo).
    pub fn with_key(raw: &str) -> Result<Self, CredentialError> {
        let store = Self::new();
        store.set(raw)?;
        Ok(store)
    }

    /// Initialise from `GEMINI_API_KEY` if present and non-empty.
    pub fn init_from_env() -> Self {
        let store = Self::new();
        if let Ok(raw) = std::env::var(ENV_GEMINI_API_KEY) {
            if store.set(&raw).is_ok() {
                info!(target: "credential", "credential initialised from env");
            }
        }
        store
    }

    /// Capture the key for this session. A second capture requires `clear` first.
    pub fn set(&self, raw: &str) -> Result<(), CredentialError> {
        let cred = Credential::new(raw)?;
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return Err(CredentialError::AlreadySet);
        }
        info!(target: "credential", fingerprint = %cred.fingerprint(), "credential captured");
        *guard = Some(cred);
        Ok(())
    }

    pub fn get(&self) -> Option<Credential> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_present(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// End of session: forget the key.
    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            info!(target: "credential", "credential cleared");
        }
    }
}
