//! Credential vault: AES-256-GCM seal/open of credential maps at rest.
//!
//! `seal` of an empty map returns `""` (the "no credential" sentinel); `open`
//! of anything unreadable returns an empty map. Callers treat an empty map as
//! "not authenticated", never as an error to propagate.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Decrypted credential blob: arbitrary JSON map.
pub type CredentialMap = serde_json::Map<String, serde_json::Value>;

// Well-known credential map keys.
pub const ACCESS_TOKEN: &str = "access_token";
pub const REFRESH_TOKEN: &str = "refresh_token";
pub const EXPIRES_AT: &str = "expires_at";
pub const API_KEY: &str = "api_key";

/// Environment variable holding the base64 process-wide vault key.
pub const VAULT_KEY_ENV: &str = "VOXGATE_VAULT_KEY";

const ENC_PREFIX: &str = "enc:";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const DEV_KEY_PASSPHRASE: &[u8] = b"voxgate-dev-vault-key";

#[derive(Debug)]
pub enum VaultError {
    Key(String),
    Cipher(String),
}

impl std::fmt::Display for VaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultError::Key(s) => write!(f, "vault key: {}", s),
            VaultError::Cipher(s) => write!(f, "vault cipher: {}", s),
        }
    }
}

impl std::error::Error for VaultError {}

/// 32-byte symmetric key for the vault.
#[derive(Clone)]
pub struct VaultKey([u8; 32]);

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

impl VaultKey {
    /// Read the key from `VOXGATE_VAULT_KEY`. `Ok(None)` if the variable is
    /// unset; an error if it is set but not base64 of exactly 32 bytes.
    pub fn from_env() -> Result<Option<Self>, VaultError> {
        match std::env::var(VAULT_KEY_ENV) {
            Ok(s) => Self::from_base64(&s).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Decode a base64 key; must decode to exactly 32 bytes.
    pub fn from_base64(s: &str) -> Result<Self, VaultError> {
        let bytes = B64
            .decode(s.trim())
            .map_err(|e| VaultError::Key(format!("base64: {}", e)))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VaultError::Key("key must decode to 32 bytes".into()))?;
        Ok(Self(key))
    }

    /// Deterministic development-only key derived from a fixed passphrase.
    /// Deployment config is responsible for flagging dev-key use loudly.
    pub fn dev() -> Self {
        let digest = Sha256::digest(DEV_KEY_PASSPHRASE);
        Self(digest.into())
    }
}

/// Symmetric encrypt/decrypt of credential maps.
pub struct Vault {
    cipher: Aes256Gcm,
}

impl Vault {
    pub fn new(key: VaultKey) -> Self {
        // new_from_slice cannot fail for a 32-byte key.
        let cipher = Aes256Gcm::new_from_slice(&key.0).expect("32-byte key");
        Self { cipher }
    }

    /// Encrypt a credential map. Empty map => `""`.
    /// Output is `"enc:" + base64(nonce || ciphertext+tag)`.
    pub fn seal(&self, map: &CredentialMap) -> Result<String, VaultError> {
        if map.is_empty() {
            return Ok(String::new());
        }
        let plaintext =
            serde_json::to_vec(map).map_err(|e| VaultError::Cipher(format!("serialize: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| VaultError::Cipher(format!("encrypt: {}", e)))?;

        let mut packed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", ENC_PREFIX, B64.encode(packed)))
    }

    /// Decrypt a sealed blob. `""` => empty map; malformed or wrong-key
    /// ciphertext also => empty map (logged, never raised).
    pub fn open(&self, sealed: &str) -> CredentialMap {
        if sealed.is_empty() {
            return CredentialMap::new();
        }
        match self.try_open(sealed) {
            Some(map) => map,
            None => {
                warn!("vault: unreadable credential blob; treating as not authenticated");
                CredentialMap::new()
            }
        }
    }

    fn try_open(&self, sealed: &str) -> Option<CredentialMap> {
        let encoded = sealed.strip_prefix(ENC_PREFIX)?;
        let packed = B64.decode(encoded).ok()?;
        if packed.len() < NONCE_LEN + TAG_LEN {
            return None;
        }
        let (nonce_bytes, ciphertext) = packed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self.cipher.decrypt(nonce, ciphertext).ok()?;
        match serde_json::from_slice::<serde_json::Value>(&plaintext).ok()? {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        }
    }
}
