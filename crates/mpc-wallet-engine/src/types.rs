//! Core types for the 2-of-2 MPC wallet engine
//!
//! Defines the key share held by this device, the read-only wallet
//! projection exposed to callers, signing requests, and the opaque
//! payloads returned by backup and export sessions.

use crate::{curve, seal::SealedBlob, Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Owning profile identifier for a wallet
pub type ProfileId = String;

/// Threshold-signature algorithm for a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// secp256k1 wallets (Ethereum-style addresses)
    Ecdsa,
    /// ed25519 wallets (Solana-style addresses)
    Eddsa,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Ecdsa => write!(f, "ECDSA"),
            Algorithm::Eddsa => write!(f, "EdDSA"),
        }
    }
}

/// Type of an MPC session with the co-signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    KeyGeneration,
    Signing,
    Backup,
    Export,
    KeyRotation,
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionType::KeyGeneration => write!(f, "key_generation"),
            SessionType::Signing => write!(f, "signing"),
            SessionType::Backup => write!(f, "backup"),
            SessionType::Export => write!(f, "export"),
            SessionType::KeyRotation => write!(f, "key_rotation"),
        }
    }
}

/// This device's half of a 2-of-2 threshold key
///
/// `share_data` is the only secret field; it is zeroized on drop and
/// never logged or transmitted. At most one share exists per
/// (profile, algorithm), and a share is only ever persisted whole.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare {
    /// Owning profile (exclusive)
    #[zeroize(skip)]
    pub profile_id: ProfileId,

    /// Algorithm this share belongs to
    #[zeroize(skip)]
    pub algorithm: Algorithm,

    /// Opaque secret share bytes
    pub share_data: Vec<u8>,

    /// Joint public key (compressed encoding)
    #[zeroize(skip)]
    pub public_key: Vec<u8>,

    /// Address derived from the joint public key
    #[zeroize(skip)]
    pub derived_address: String,

    /// Creation timestamp (Unix seconds)
    #[zeroize(skip)]
    pub created_at: i64,

    /// Last rotation timestamp (Unix seconds)
    #[zeroize(skip)]
    pub rotated_at: Option<i64>,
}

impl KeyShare {
    /// Read-only projection for callers
    pub fn wallet_info(&self) -> WalletInfo {
        let mut metadata = HashMap::new();
        metadata.insert("created_at".to_string(), self.created_at.to_string());
        metadata.insert("algorithm".to_string(), self.algorithm.to_string());
        if let Some(rotated_at) = self.rotated_at {
            metadata.insert("rotated_at".to_string(), rotated_at.to_string());
        }

        WalletInfo {
            address: self.derived_address.clone(),
            public_key: hex::encode(&self.public_key),
            metadata,
        }
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("profile_id", &self.profile_id)
            .field("algorithm", &self.algorithm)
            .field("share_data", &"[REDACTED]")
            .field("public_key", &hex::encode(&self.public_key))
            .field("derived_address", &self.derived_address)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Read-only wallet projection derived from a [`KeyShare`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    /// Wallet address
    pub address: String,
    /// Joint public key, hex-encoded
    pub public_key: String,
    /// Opaque metadata (creation timestamp, algorithm, ...)
    pub metadata: HashMap<String, String>,
}

/// A transaction payload submitted for MPC signing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningRequest {
    /// Caller-assigned request identifier
    pub request_id: String,
    /// Raw transaction bytes
    pub payload: Vec<u8>,
}

impl SigningRequest {
    /// Create a request with a fresh identifier
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            payload,
        }
    }

    /// Digest actually signed by the two parties
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.payload);
        hasher.finalize().into()
    }
}

/// A combined threshold signature over a [`SigningRequest`] digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// `R || s`: aggregate nonce point followed by the 32-byte response
    pub bytes: Vec<u8>,
}

impl Signature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// Encrypted wallet backup returned by a Backup session
///
/// Ownership transfers to the caller on return; the engine never
/// persists it. Both halves are sealed to the recipient key supplied by
/// the caller, so the engine itself cannot reopen the backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupData {
    /// Backup format version
    pub version: u32,
    /// Caller-supplied label
    pub label: String,
    /// Algorithm of the backed-up wallet
    pub algorithm: Algorithm,
    /// Joint public key, for identification without opening the backup
    pub public_key: Vec<u8>,
    /// This device's share, sealed to the recipient public key
    pub client_blob: SealedBlob,
    /// The co-signer's sealed contribution (opaque to this engine)
    pub cosigner_blob: Vec<u8>,
    /// Creation timestamp (Unix seconds)
    pub created_at: i64,
}

impl BackupData {
    pub const CURRENT_VERSION: u32 = 1;
}

/// Encrypted full private key returned by an Export session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    /// Export format version
    pub version: u32,
    /// Algorithm of the exported key
    pub algorithm: Algorithm,
    /// Joint public key the exported secret corresponds to
    pub public_key: Vec<u8>,
    /// Nonce for the symmetric seal
    pub nonce: [u8; 12],
    /// Full private key, sealed under the caller's symmetric key
    pub ciphertext: Vec<u8>,
}

impl ExportData {
    pub const CURRENT_VERSION: u32 = 1;

    /// Check that an exported ciphertext looks structurally sound
    pub fn validate(&self) -> Result<()> {
        if self.version != Self::CURRENT_VERSION {
            return Err(Error::Serialization(format!(
                "unsupported export version {}",
                self.version
            )));
        }
        if self.ciphertext.is_empty() {
            return Err(Error::Serialization("empty export ciphertext".into()));
        }
        curve::derive_address(self.algorithm, &self.public_key)?;
        Ok(())
    }
}
