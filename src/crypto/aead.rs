//! Image Vault - AEAD Encryption
//!
//! AES-256-GCM over whole buffers. Stored layout is `nonce || ciphertext || tag`.

use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use super::keys::{KeyStore, VaultKey, NONCE_LEN};
use crate::error::{VaultError, VaultResult};

/// GCM authentication tag size
pub const TAG_LEN: usize = 16;

/// Generate a random nonce for AES-GCM
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt data with AES-256-GCM, returning `nonce || ciphertext`
pub fn encrypt_aes_gcm(key: &VaultKey, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `nonce || ciphertext` produced by [`encrypt_aes_gcm`]
pub fn decrypt_aes_gcm(key: &VaultKey, data: &[u8]) -> VaultResult<Vec<u8>> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::Decryption("Data too short".into()));
    }

    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| VaultError::Decryption(e.to_string()))?;

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| VaultError::Decryption("Authentication failed".into()))
}

/// Stateless encrypt/decrypt wrapper over the key store.
///
/// Every call asks the [`KeyStore`] for the current key.
#[derive(Clone)]
pub struct Cipher {
    keys: Arc<KeyStore>,
}

impl Cipher {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
        let key = self.keys.load_or_create()?;
        encrypt_aes_gcm(&key, plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> VaultResult<Vec<u8>> {
        let key = self.keys.load_or_create()?;
        decrypt_aes_gcm(&key, ciphertext)
    }
}
