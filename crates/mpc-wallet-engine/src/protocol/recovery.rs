//! Backup and export protocols
//!
//! Backup seals both shares to a caller-supplied recipient key without
//! ever joining them; the engine cannot reopen its own backup. Export
//! does join them: the co-signer releases its share, the client
//! recombines the full private key, checks it against the joint public
//! key, and seals it under the caller's symmetric key. The plaintext
//! key never leaves this module unencrypted.

use super::{check_envelope, single, Advance, Finalized, RoundBody, RoundEnvelope};
use crate::{curve, seal, Algorithm, BackupData, Error, ExportData, Result};
use chrono::Utc;
use uuid::Uuid;
use zeroize::Zeroizing;

enum RecoveryState {
    Created,
    AwaitGrant,
    Done,
}

/// Client side of the single-round backup protocol
pub struct BackupEngine {
    algorithm: Algorithm,
    correlation_id: String,
    share: Zeroizing<Vec<u8>>,
    public_key: Vec<u8>,
    label: String,
    recipient_key: [u8; 32],
    state: RecoveryState,
}

impl BackupEngine {
    pub fn new(
        algorithm: Algorithm,
        share: Zeroizing<Vec<u8>>,
        public_key: Vec<u8>,
        label: String,
        recipient_key: [u8; 32],
    ) -> Self {
        Self {
            algorithm,
            correlation_id: Uuid::new_v4().to_string(),
            share,
            public_key,
            label,
            recipient_key,
            state: RecoveryState::Created,
        }
    }

    pub fn initial_messages(&mut self) -> Result<Vec<RoundEnvelope>> {
        match self.state {
            RecoveryState::Created => {
                self.state = RecoveryState::AwaitGrant;
                Ok(vec![RoundEnvelope::new(
                    self.correlation_id.clone(),
                    self.algorithm,
                    1,
                    RoundBody::BackupRequest {
                        label: self.label.clone(),
                        recipient_key: self.recipient_key,
                    },
                )])
            }
            _ => Err(Error::ProtocolViolation("backup already started".into())),
        }
    }

    pub fn advance(&mut self, inbound: Vec<RoundEnvelope>) -> Result<Advance> {
        let env = single(inbound)?;
        match std::mem::replace(&mut self.state, RecoveryState::Done) {
            RecoveryState::AwaitGrant => {
                check_envelope(&env, self.algorithm, &self.correlation_id, 1)?;
                let RoundBody::BackupGrant { cosigner_blob } = env.body else {
                    return Err(Error::ProtocolViolation(format!(
                        "expected backup grant, got {}",
                        env.body.kind_name()
                    )));
                };
                if cosigner_blob.is_empty() {
                    return Err(Error::ProtocolViolation(
                        "co-signer returned an empty backup blob".into(),
                    ));
                }
                let client_blob = seal::seal_to_recipient(&self.recipient_key, &self.share)?;
                Ok(Advance::Finalized(Finalized::Backup(BackupData {
                    version: BackupData::CURRENT_VERSION,
                    label: self.label.clone(),
                    algorithm: self.algorithm,
                    public_key: self.public_key.clone(),
                    client_blob,
                    cosigner_blob,
                    created_at: Utc::now().timestamp(),
                })))
            }
            _ => Err(Error::ProtocolViolation(
                "backup message received outside an active round".into(),
            )),
        }
    }
}

/// Client side of the single-round export protocol
pub struct ExportEngine {
    algorithm: Algorithm,
    correlation_id: String,
    share: Zeroizing<Vec<u8>>,
    public_key: Vec<u8>,
    export_key: Zeroizing<[u8; 32]>,
    state: RecoveryState,
}

impl ExportEngine {
    pub fn new(
        algorithm: Algorithm,
        share: Zeroizing<Vec<u8>>,
        public_key: Vec<u8>,
        export_key: Zeroizing<[u8; 32]>,
    ) -> Self {
        Self {
            algorithm,
            correlation_id: Uuid::new_v4().to_string(),
            share,
            public_key,
            export_key,
            state: RecoveryState::Created,
        }
    }

    pub fn initial_messages(&mut self) -> Result<Vec<RoundEnvelope>> {
        match self.state {
            RecoveryState::Created => {
                self.state = RecoveryState::AwaitGrant;
                Ok(vec![RoundEnvelope::new(
                    self.correlation_id.clone(),
                    self.algorithm,
                    1,
                    RoundBody::ExportRequest {},
                )])
            }
            _ => Err(Error::ProtocolViolation("export already started".into())),
        }
    }

    pub fn advance(&mut self, inbound: Vec<RoundEnvelope>) -> Result<Advance> {
        let env = single(inbound)?;
        match std::mem::replace(&mut self.state, RecoveryState::Done) {
            RecoveryState::AwaitGrant => {
                check_envelope(&env, self.algorithm, &self.correlation_id, 1)?;
                let RoundBody::ExportGrant { cosigner_share } = env.body else {
                    return Err(Error::ProtocolViolation(format!(
                        "expected export grant, got {}",
                        env.body.kind_name()
                    )));
                };
                let full_key =
                    curve::scalar_add(self.algorithm, &self.share, &cosigner_share)?;

                // the recombined key must reproduce the joint public key
                let derived = curve::mul_base(self.algorithm, full_key.as_ref())?;
                if derived != self.public_key {
                    return Err(Error::ProtocolViolation(
                        "recombined key does not match the joint public key".into(),
                    ));
                }
                let (nonce, ciphertext) =
                    seal::seal_symmetric(&self.export_key, full_key.as_ref())?;
                Ok(Advance::Finalized(Finalized::Export(ExportData {
                    version: ExportData::CURRENT_VERSION,
                    algorithm: self.algorithm,
                    public_key: self.public_key.clone(),
                    nonce,
                    ciphertext,
                })))
            }
            _ => Err(Error::ProtocolViolation(
                "export message received outside an active round".into(),
            )),
        }
    }
}
