//! Per-account credentials
//!
//! A [`Credential`] is built once at startup and never mutated. The
//! [`CredentialStore`] is handed to the hub at construction time; replacing
//! it means building a new store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::HubConfig;
use crate::crypto::{self, AesKey, RANDOM_LEN};
use crate::error::AesResult;
use crate::signature;

/// Token, AES key and owner id of one configured account
#[derive(Clone)]
pub struct Credential {
    token: String,
    aes_key: AesKey,
    owner_id: String,
}

impl Credential {
    /// Create from token, 43-character EncodingAESKey and owner id
    /// (AppID for official accounts, CorpID for WeCom)
    pub fn new(token: &str, encoding_aes_key: &str, owner_id: &str) -> AesResult<Self> {
        Ok(Self {
            token: token.to_string(),
            aes_key: AesKey::from_encoding_key(encoding_aes_key)?,
            owner_id: owner_id.to_string(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn encrypt(&self, plaintext: &str) -> AesResult<String> {
        crypto::encrypt(&self.aes_key, &self.owner_id, plaintext, None)
    }

    /// Encrypt with a caller-chosen random prefix
    pub fn encrypt_with_random(&self, plaintext: &str, random: [u8; RANDOM_LEN]) -> AesResult<String> {
        crypto::encrypt(&self.aes_key, &self.owner_id, plaintext, Some(random))
    }

    pub fn decrypt(&self, ciphertext: &str) -> AesResult<String> {
        crypto::decrypt(&self.aes_key, &self.owner_id, ciphertext)
    }

    pub fn sign(&self, timestamp: &str, nonce: &str, extra: Option<&str>) -> String {
        signature::sign(&self.token, timestamp, nonce, extra)
    }

    pub fn check_signature(
        &self,
        timestamp: &str,
        nonce: &str,
        extra: Option<&str>,
        candidate: &str,
    ) -> AesResult<()> {
        signature::check(&self.token, timestamp, nonce, extra, candidate)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("owner_id", &self.owner_id)
            .field("token", &"<redacted>")
            .field("aes_key", &self.aes_key)
            .finish()
    }
}

/// What to do with callbacks for owners that have no credential
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaintextMode {
    /// Drop them
    #[default]
    Reject,
    /// Treat the body as the unencrypted inner message
    PassThrough,
}

/// Credentials keyed by owner id
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    credentials: HashMap<String, Arc<Credential>>,
    plaintext_mode: PlaintextMode,
}

impl CredentialStore {
    pub fn new(plaintext_mode: PlaintextMode) -> Self {
        Self {
            credentials: HashMap::new(),
            plaintext_mode,
        }
    }

    /// Build every configured account, failing on the first bad key
    pub fn from_config(config: &HubConfig) -> AesResult<Self> {
        let mode = if config.allow_plaintext {
            PlaintextMode::PassThrough
        } else {
            PlaintextMode::Reject
        };

        let mut store = Self::new(mode);
        for account in &config.accounts {
            let credential =
                Credential::new(&account.token, &account.encoding_aes_key, &account.owner_id)?;
            info!("Loaded credential for owner {}", account.owner_id);
            store.insert(credential);
        }
        Ok(store)
    }

    /// Add a credential, replacing any previous one for the same owner
    pub fn insert(&mut self, credential: Credential) {
        self.credentials
            .insert(credential.owner_id.clone(), Arc::new(credential));
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.insert(credential);
        self
    }

    pub fn get(&self, owner_id: &str) -> Option<Arc<Credential>> {
        self.credentials.get(owner_id).cloned()
    }

    pub fn plaintext_mode(&self) -> PlaintextMode {
        self.plaintext_mode
    }

    pub fn owner_ids(&self) -> impl Iterator<Item = &str> {
        self.credentials.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}
