//! Round message envelopes exchanged with the co-signer
//!
//! The transport treats payloads as opaque byte blobs; this is the
//! engine's own pinned wire format inside those blobs. The version is
//! checked on every inbound envelope; client and co-signer must agree
//! byte-exactly, and a mismatch is fatal.

use crate::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};

/// Pinned protocol version; a remote mismatch is non-retryable
pub const PROTOCOL_VERSION: u32 = 1;

/// One protocol message, tagged with its round and correlation id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundEnvelope {
    /// Protocol version (must equal [`PROTOCOL_VERSION`])
    pub version: u32,
    /// Correlation id tying all rounds of one protocol run together
    pub correlation_id: String,
    /// Algorithm of the wallet this run belongs to
    pub algorithm: Algorithm,
    /// Round number, starting at 1
    pub round: u32,
    /// Round-specific content
    pub body: RoundBody,
}

impl RoundEnvelope {
    pub fn new(
        correlation_id: String,
        algorithm: Algorithm,
        round: u32,
        body: RoundBody,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            correlation_id,
            algorithm,
            round,
            body,
        }
    }

    /// Serialize for transmission as an opaque payload
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode an inbound payload blob
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidMessage(e.to_string()))
    }
}

/// Round-specific message content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundBody {
    /// Key generation round 1: commitment to the public share
    KeygenCommit { commitment: [u8; 32] },
    /// Key generation round 2: the public share itself
    KeygenReveal { public_share: Vec<u8> },

    /// Signing round 1: digest binding plus the party's nonce point
    SignCommit {
        digest: [u8; 32],
        nonce_point: Vec<u8>,
    },
    /// Signing round 2 (outbound): this party's partial response
    SignPartial { partial: Vec<u8> },
    /// Signing round 2 (inbound): the combined signature `R || s`
    SignFinal { signature: Vec<u8> },

    /// Rotation round 1 (outbound): zero-sum delta and our new public share
    RotateOffer {
        delta: Vec<u8>,
        new_public_share: Vec<u8>,
    },
    /// Rotation round 1 (inbound): the co-signer's new public share
    RotateAck { new_public_share: Vec<u8> },

    /// Backup round 1 (outbound): label and recipient sealing key
    BackupRequest {
        label: String,
        recipient_key: [u8; 32],
    },
    /// Backup round 1 (inbound): the co-signer's sealed contribution
    BackupGrant { cosigner_blob: Vec<u8> },

    /// Export round 1 (outbound): request for the co-signer share
    ExportRequest {},
    /// Export round 1 (inbound): the co-signer's secret share
    ExportGrant { cosigner_share: Vec<u8> },
}

impl RoundBody {
    /// Short name for logging and error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            RoundBody::KeygenCommit { .. } => "keygen_commit",
            RoundBody::KeygenReveal { .. } => "keygen_reveal",
            RoundBody::SignCommit { .. } => "sign_commit",
            RoundBody::SignPartial { .. } => "sign_partial",
            RoundBody::SignFinal { .. } => "sign_final",
            RoundBody::RotateOffer { .. } => "rotate_offer",
            RoundBody::RotateAck { .. } => "rotate_ack",
            RoundBody::BackupRequest { .. } => "backup_request",
            RoundBody::BackupGrant { .. } => "backup_grant",
            RoundBody::ExportRequest {} => "export_request",
            RoundBody::ExportGrant { .. } => "export_grant",
        }
    }
}
