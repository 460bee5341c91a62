//! Image Vault - Key Management
//!
//! A single AES-256 key lives in a file at a well-known location. The first
//! caller generates it if absent; everyone after that reads it back verbatim.

use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// Secure key wrapper, zeroized on drop
pub struct VaultKey {
    inner: Secret<[u8; KEY_LEN]>,
}

impl VaultKey {
    /// Create a new vault key from bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }

    /// Short, non-reversible identifier for log lines
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.expose());
        hex::encode(&digest[..6])
    }

    fn from_slice(bytes: &[u8], path: &Path) -> VaultResult<Self> {
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| VaultError::KeyFormat {
            path: path.display().to_string(),
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::new(array))
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Key store backed by a single key file
///
/// The key is cached after the first successful load. The artifact is never
/// rewritten once it exists, so the cached value always matches disk.
pub struct KeyStore {
    path: PathBuf,
    cached: Mutex<Option<Arc<VaultKey>>>,
}

impl KeyStore {
    /// Create a key store for the artifact at `path`. Nothing is read yet.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cached: Mutex::new(None),
        }
    }

    /// Return the active key, reading or generating the artifact on first use
    pub fn load_or_create(&self) -> VaultResult<Arc<VaultKey>> {
        let mut cached = self.cached.lock();
        if let Some(key) = cached.as_ref() {
            return Ok(Arc::clone(key));
        }

        let key = Arc::new(self.read_or_generate()?);
        *cached = Some(Arc::clone(&key));
        Ok(key)
    }

    fn read_or_generate(&self) -> VaultResult<VaultKey> {
        match self.read_existing()? {
            Some(key) => {
                log::debug!("Loaded encryption key {} from {}", key.fingerprint(), self.path.display());
                Ok(key)
            }
            None => self.generate_and_publish(),
        }
    }

    fn read_existing(&self) -> VaultResult<Option<VaultKey>> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let bytes = Zeroizing::new(bytes);
                VaultKey::from_slice(&bytes, &self.path).map(Some)
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a fresh key next to the artifact and link it into place without
    /// clobbering. If another process got there first, its key wins.
    fn generate_and_publish(&self) -> VaultResult<VaultKey> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let key = VaultKey::generate();

        let mut staged = tempfile::Builder::new()
            .prefix(".key-")
            .tempfile_in(&dir)?;
        staged.write_all(key.expose())?;
        staged.as_file().sync_all()?;

        match staged.persist_noclobber(&self.path) {
            Ok(_) => {
                log::info!(
                    "Generated new encryption key {} at {}",
                    key.fingerprint(),
                    self.path.display()
                );
                Ok(key)
            }
            Err(e) if e.error.kind() == IoErrorKind::AlreadyExists => {
                log::warn!(
                    "Key file {} appeared concurrently, using the existing key",
                    self.path.display()
                );
                self.read_existing()?
                    .ok_or_else(|| VaultError::Io(e.error))
            }
            Err(e) => Err(VaultError::Io(e.error)),
        }
    }
}
