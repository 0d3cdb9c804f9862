//! Secure key-share storage
//!
//! Key shares are stored encrypted, keyed by profile. Two backends are
//! provided:
//!
//! - **MemoryShareStore**: in-memory, for tests and composition roots
//!   that supply their own persistence
//! - **EncryptedFileStore**: ChaCha20-Poly1305-sealed records on disk
//!
//! A `put` is all-or-nothing: the file backend writes a temp file and
//! renames it into place, so a crash mid-write leaves the previous
//! record intact. A missing share is `Ok(None)`, never an error, so it
//! is never confused with a storage failure.

use crate::{Error, KeyShare, ProfileId, Result};
use async_trait::async_trait;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Trait for secure key-share storage backends
///
/// Implementations must be safe for concurrent reads across profiles;
/// the facade serializes writes to the same profile.
#[async_trait]
pub trait KeyShareStore: Send + Sync {
    /// Store or overwrite the share for a profile (atomic)
    async fn put(&self, profile_id: &str, share: &KeyShare) -> Result<()>;

    /// Load the current share, or `None` if never generated
    async fn get(&self, profile_id: &str) -> Result<Option<KeyShare>>;

    /// Securely erase the share (best-effort zeroing on disk backends)
    async fn delete(&self, profile_id: &str) -> Result<()>;

    /// Check whether a share exists without decrypting it
    async fn exists(&self, profile_id: &str) -> Result<bool>;
}

/// An encrypted key-share record as written to disk
///
/// Public summary fields stay readable without the store key so tooling
/// can identify a wallet without opening it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedShareRecord {
    /// Record format version
    pub version: u32,
    /// Nonce used for encryption
    pub nonce: [u8; 12],
    /// Encrypted [`KeyShare`]
    pub ciphertext: Vec<u8>,
    /// Joint public key (not encrypted)
    pub public_key: Vec<u8>,
    /// Derived address (not encrypted)
    pub address: String,
    /// Creation timestamp
    pub created_at: i64,
}

impl SealedShareRecord {
    /// Current version of the record format
    pub const CURRENT_VERSION: u32 = 1;

    /// Encrypt a key share under the store key
    pub fn seal(share: &KeyShare, store_key: &[u8; 32]) -> Result<Self> {
        let cipher = ChaCha20Poly1305::new(store_key.into());
        let nonce_bytes: [u8; 12] = rand::random();

        let plaintext = serde_json::to_vec(share)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_ref())
            .map_err(|e| Error::Encryption(e.to_string()))?;

        Ok(Self {
            version: Self::CURRENT_VERSION,
            nonce: nonce_bytes,
            ciphertext,
            public_key: share.public_key.clone(),
            address: share.derived_address.clone(),
            created_at: share.created_at,
        })
    }

    /// Decrypt the key share with the store key
    pub fn unseal(&self, store_key: &[u8; 32]) -> Result<KeyShare> {
        if self.version != Self::CURRENT_VERSION {
            return Err(Error::Serialization(format!(
                "unsupported share record version {}",
                self.version
            )));
        }
        let cipher = ChaCha20Poly1305::new(store_key.into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_ref())
            .map_err(|_| {
                Error::Encryption("decryption failed - wrong store key or corrupted record".into())
            })?;

        let share: KeyShare = serde_json::from_slice(&plaintext)?;
        Ok(share)
    }
}

/// In-memory store for tests
#[derive(Debug, Default)]
pub struct MemoryShareStore {
    shares: Arc<RwLock<HashMap<ProfileId, KeyShare>>>,
}

impl MemoryShareStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyShareStore for MemoryShareStore {
    async fn put(&self, profile_id: &str, share: &KeyShare) -> Result<()> {
        let mut shares = self.shares.write().await;
        shares.insert(profile_id.to_string(), share.clone());
        Ok(())
    }

    async fn get(&self, profile_id: &str) -> Result<Option<KeyShare>> {
        let shares = self.shares.read().await;
        Ok(shares.get(profile_id).cloned())
    }

    async fn delete(&self, profile_id: &str) -> Result<()> {
        let mut shares = self.shares.write().await;
        shares.remove(profile_id);
        Ok(())
    }

    async fn exists(&self, profile_id: &str) -> Result<bool> {
        let shares = self.shares.read().await;
        Ok(shares.contains_key(profile_id))
    }
}

/// File-backed store with per-record encryption
#[derive(Debug)]
pub struct EncryptedFileStore {
    base_path: PathBuf,
    store_key: [u8; 32],
}

impl EncryptedFileStore {
    /// Create a store rooted at `base_path`, sealing records under
    /// `store_key` (typically derived from platform secure storage)
    pub fn new(base_path: impl Into<PathBuf>, store_key: [u8; 32]) -> Result<Self> {
        let base_path = base_path.into();

        if !base_path.exists() {
            std::fs::create_dir_all(&base_path).map_err(map_io)?;
        }

        Ok(Self {
            base_path,
            store_key,
        })
    }

    fn record_path(&self, profile_id: &str) -> PathBuf {
        // Sanitize the profile id to prevent path traversal
        let safe_id = profile_id.replace(['/', '\\', '.', '~'], "_");
        self.base_path.join(format!("{}.share", safe_id))
    }
}

#[async_trait]
impl KeyShareStore for EncryptedFileStore {
    async fn put(&self, profile_id: &str, share: &KeyShare) -> Result<()> {
        let path = self.record_path(profile_id);
        let record = SealedShareRecord::seal(share, &self.store_key)?;
        let data = serde_json::to_vec_pretty(&record)?;

        // Write to a temp file and rename so the record is never
        // observable half-written
        let tmp = path.with_extension("share.tmp");
        tokio::fs::write(&tmp, &data).await.map_err(map_io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp, perms)
                .await
                .map_err(map_io)?;
        }

        tokio::fs::rename(&tmp, &path).await.map_err(map_io)?;
        debug!(profile_id, path = %path.display(), "key share stored");
        Ok(())
    }

    async fn get(&self, profile_id: &str) -> Result<Option<KeyShare>> {
        let path = self.record_path(profile_id);

        if !path.exists() {
            return Ok(None);
        }

        let data = tokio::fs::read(&path).await.map_err(map_io)?;
        let record: SealedShareRecord = serde_json::from_slice(&data)?;
        Ok(Some(record.unseal(&self.store_key)?))
    }

    async fn delete(&self, profile_id: &str) -> Result<()> {
        let path = self.record_path(profile_id);

        if path.exists() {
            // Overwrite with zeros before unlinking
            let size = tokio::fs::metadata(&path).await.map_err(map_io)?.len() as usize;
            let zeros = vec![0u8; size];
            tokio::fs::write(&path, zeros).await.map_err(map_io)?;
            tokio::fs::remove_file(&path).await.map_err(map_io)?;
            debug!(profile_id, "key share erased");
        }

        Ok(())
    }

    async fn exists(&self, profile_id: &str) -> Result<bool> {
        Ok(self.record_path(profile_id).exists())
    }
}

fn map_io(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => Error::AccessDenied(e.to_string()),
        _ => Error::StorageUnavailable(e.to_string()),
    }
}
