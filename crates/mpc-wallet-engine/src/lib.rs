//! # MPC Wallet Engine
//!
//! Core library for client-side 2-of-2 threshold wallets: this device
//! holds one additive key share, a remote co-signer holds the other,
//! and the full private key never exists in one place.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Protocol Engines**: Pure round-by-round transforms for key
//!   generation, signing, rotation, backup, and export
//! - **Key Share Storage**: Encrypted at-rest storage for the local
//!   share, keyed by profile
//! - **Curve Primitives**: Additive share arithmetic over secp256k1
//!   and ed25519
//! - **Sealing**: Recipient-key and symmetric encryption for backup
//!   and export payloads
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mpc_wallet_engine::{Algorithm, KeygenEngine, Advance};
//!
//! let mut engine = KeygenEngine::new(Algorithm::Ecdsa)?;
//! let outbound = engine.initial_messages()?;
//! // ...send outbound to the co-signer, collect its reply...
//! match engine.advance(inbound)? {
//!     Advance::Next(more) => { /* another round */ }
//!     Advance::Finalized(result) => { /* done */ }
//! }
//! ```
//!
//! ## Security Model
//!
//! - A single share reveals nothing about the full key
//! - The combined signature is verified locally before it is reported
//! - Share rotation invalidates old shares without changing the
//!   wallet address
//! - Secret material is zeroed on drop and redacted from Debug output
//!
//! Networking lives in the companion `mpc-wallet-session` crate; this
//! crate performs no I/O beyond the storage backends.

pub mod curve;
pub mod error;
pub mod protocol;
pub mod seal;
pub mod storage;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use protocol::{
    Advance, BackupEngine, ExportEngine, Finalized, KeygenEngine, RotationEngine, RoundBody,
    RoundEngine, RoundEnvelope, SigningEngine, PROTOCOL_VERSION,
};
pub use seal::SealedBlob;
pub use storage::{EncryptedFileStore, KeyShareStore, MemoryShareStore, SealedShareRecord};
pub use types::{
    Algorithm, BackupData, ExportData, KeyShare, ProfileId, SessionType, Signature,
    SigningRequest, WalletInfo,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed party count: this device plus the remote co-signer
pub const N_PARTIES: usize = 2;
