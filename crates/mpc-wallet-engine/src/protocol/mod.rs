//! Protocol message engine
//!
//! Pure round-by-round computation for every MPC session type. The
//! engines produce outbound envelopes and consume counterparty
//! envelopes until the protocol converges; they perform no I/O, so the
//! session manager only needs to know "send what the engine gives you,
//! hand back what the co-signer returns, repeat until finalized".
//!
//! Round ordering, correlation ids, algorithm tags, and the protocol
//! version are all enforced here; a violation is a hard,
//! non-retryable error.

mod keygen;
mod messages;
mod recovery;
mod rotation;
mod signing;

pub use keygen::KeygenEngine;
pub use messages::{RoundBody, RoundEnvelope, PROTOCOL_VERSION};
pub use recovery::{BackupEngine, ExportEngine};
pub use rotation::RotationEngine;
pub use signing::SigningEngine;

use crate::{Algorithm, BackupData, Error, ExportData, Result, SessionType, Signature};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Result of consuming one round of counterparty messages
#[derive(Debug)]
pub enum Advance {
    /// The next outbound round
    Next(Vec<RoundEnvelope>),
    /// The protocol has converged
    Finalized(Finalized),
}

/// Terminal output of a protocol run
pub enum Finalized {
    /// Key generation or rotation produced a share
    KeyShare {
        share_data: Zeroizing<Vec<u8>>,
        public_key: Vec<u8>,
        address: String,
    },
    /// Signing produced a combined signature
    Signature(Signature),
    /// Backup produced an encrypted payload for the caller
    Backup(BackupData),
    /// Export produced the sealed full private key
    Export(ExportData),
}

impl std::fmt::Debug for Finalized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Finalized::KeyShare { address, .. } => f
                .debug_struct("Finalized::KeyShare")
                .field("share_data", &"[REDACTED]")
                .field("address", address)
                .finish(),
            Finalized::Signature(sig) => f.debug_tuple("Finalized::Signature").field(sig).finish(),
            Finalized::Backup(b) => f.debug_tuple("Finalized::Backup").field(&b.label).finish(),
            Finalized::Export(_) => f.write_str("Finalized::Export"),
        }
    }
}

/// A protocol run of any session type
///
/// Constructed by the facade, driven by the session manager.
pub enum RoundEngine {
    Keygen(KeygenEngine),
    Signing(SigningEngine),
    Rotation(RotationEngine),
    Backup(BackupEngine),
    Export(ExportEngine),
}

impl RoundEngine {
    /// Session type to request from the co-signer for this run
    pub fn session_type(&self) -> SessionType {
        match self {
            RoundEngine::Keygen(_) => SessionType::KeyGeneration,
            RoundEngine::Signing(_) => SessionType::Signing,
            RoundEngine::Rotation(_) => SessionType::KeyRotation,
            RoundEngine::Backup(_) => SessionType::Backup,
            RoundEngine::Export(_) => SessionType::Export,
        }
    }

    /// Produce the round-1 outbound messages; callable exactly once
    pub fn initial_messages(&mut self) -> Result<Vec<RoundEnvelope>> {
        match self {
            RoundEngine::Keygen(e) => e.initial_messages(),
            RoundEngine::Signing(e) => e.initial_messages(),
            RoundEngine::Rotation(e) => e.initial_messages(),
            RoundEngine::Backup(e) => e.initial_messages(),
            RoundEngine::Export(e) => e.initial_messages(),
        }
    }

    /// Consume one round of counterparty messages
    pub fn advance(&mut self, inbound: Vec<RoundEnvelope>) -> Result<Advance> {
        match self {
            RoundEngine::Keygen(e) => e.advance(inbound),
            RoundEngine::Signing(e) => e.advance(inbound),
            RoundEngine::Rotation(e) => e.advance(inbound),
            RoundEngine::Backup(e) => e.advance(inbound),
            RoundEngine::Export(e) => e.advance(inbound),
        }
    }
}

/// SHA-256 commitment to a public value, used by the commit/reveal
/// rounds
pub(crate) fn commit_to(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Validate the fixed envelope fields every inbound message must carry
pub(crate) fn check_envelope(
    env: &RoundEnvelope,
    algorithm: Algorithm,
    correlation_id: &str,
    expected_round: u32,
) -> Result<()> {
    if env.version != PROTOCOL_VERSION {
        return Err(Error::VersionMismatch {
            local: PROTOCOL_VERSION,
            remote: env.version,
        });
    }
    if env.algorithm != algorithm {
        return Err(Error::ProtocolViolation(format!(
            "algorithm mismatch: expected {}, got {}",
            algorithm, env.algorithm
        )));
    }
    if env.correlation_id != correlation_id {
        return Err(Error::ProtocolViolation(
            "correlation id does not match this run".into(),
        ));
    }
    if env.round != expected_round {
        return Err(Error::ProtocolViolation(format!(
            "expected round {}, got {}",
            expected_round, env.round
        )));
    }
    Ok(())
}

/// The 2-of-2 protocol exchanges exactly one counterparty message per
/// round
pub(crate) fn single(mut inbound: Vec<RoundEnvelope>) -> Result<RoundEnvelope> {
    if inbound.len() != 1 {
        return Err(Error::ProtocolViolation(format!(
            "expected exactly one counterparty message, got {}",
            inbound.len()
        )));
    }
    Ok(inbound.remove(0))
}
