//! Two-party signing
//!
//! Schnorr-style additive signing over the shared key: both parties
//! exchange nonce points in round 1, the client sends its partial
//! response in round 2, and the co-signer returns the combined
//! signature. The client verifies the combined signature against the
//! joint public key before reporting success; a signature that does
//! not verify is a protocol violation, not a valid result.

use super::{check_envelope, single, Advance, Finalized, RoundBody, RoundEnvelope};
use crate::{curve, Algorithm, Error, Result, Signature};
use uuid::Uuid;
use zeroize::Zeroizing;

enum SigningState {
    Created,
    AwaitNonce,
    AwaitFinal,
    Done,
}

/// Client side of the two-round signing protocol
pub struct SigningEngine {
    algorithm: Algorithm,
    correlation_id: String,
    share: Zeroizing<Vec<u8>>,
    public_key: Vec<u8>,
    digest: [u8; 32],
    nonce: Zeroizing<[u8; 32]>,
    nonce_point: Vec<u8>,
    state: SigningState,
}

impl SigningEngine {
    pub fn new(
        algorithm: Algorithm,
        share: Zeroizing<Vec<u8>>,
        public_key: Vec<u8>,
        digest: [u8; 32],
    ) -> Result<Self> {
        let nonce = curve::random_scalar(algorithm);
        let nonce_point = curve::mul_base(algorithm, nonce.as_ref())?;
        Ok(Self {
            algorithm,
            correlation_id: Uuid::new_v4().to_string(),
            share,
            public_key,
            digest,
            nonce,
            nonce_point,
            state: SigningState::Created,
        })
    }

    fn envelope(&self, round: u32, body: RoundBody) -> RoundEnvelope {
        RoundEnvelope::new(self.correlation_id.clone(), self.algorithm, round, body)
    }

    pub fn initial_messages(&mut self) -> Result<Vec<RoundEnvelope>> {
        match self.state {
            SigningState::Created => {
                self.state = SigningState::AwaitNonce;
                Ok(vec![self.envelope(
                    1,
                    RoundBody::SignCommit {
                        digest: self.digest,
                        nonce_point: self.nonce_point.clone(),
                    },
                )])
            }
            _ => Err(Error::ProtocolViolation("signing already started".into())),
        }
    }

    pub fn advance(&mut self, inbound: Vec<RoundEnvelope>) -> Result<Advance> {
        let env = single(inbound)?;
        match std::mem::replace(&mut self.state, SigningState::Done) {
            SigningState::AwaitNonce => {
                check_envelope(&env, self.algorithm, &self.correlation_id, 1)?;
                let RoundBody::SignCommit {
                    digest,
                    nonce_point,
                } = env.body
                else {
                    return Err(Error::ProtocolViolation(format!(
                        "expected signing nonce, got {}",
                        env.body.kind_name()
                    )));
                };
                if digest != self.digest {
                    return Err(Error::ProtocolViolation(
                        "co-signer is signing a different digest".into(),
                    ));
                }
                let aggregate =
                    curve::point_add(self.algorithm, &self.nonce_point, &nonce_point)?;
                let e = curve::challenge(
                    self.algorithm,
                    &aggregate,
                    &self.public_key,
                    &self.digest,
                )?;
                let partial = curve::partial_response(
                    self.algorithm,
                    self.nonce.as_ref(),
                    &e,
                    &self.share,
                )?;
                self.state = SigningState::AwaitFinal;
                Ok(Advance::Next(vec![self.envelope(
                    2,
                    RoundBody::SignPartial {
                        partial: partial.to_vec(),
                    },
                )]))
            }
            SigningState::AwaitFinal => {
                check_envelope(&env, self.algorithm, &self.correlation_id, 2)?;
                let RoundBody::SignFinal { signature } = env.body else {
                    return Err(Error::ProtocolViolation(format!(
                        "expected combined signature, got {}",
                        env.body.kind_name()
                    )));
                };
                if !curve::verify_signature(
                    self.algorithm,
                    &self.public_key,
                    &self.digest,
                    &signature,
                )? {
                    return Err(Error::ProtocolViolation(
                        "combined signature failed verification".into(),
                    ));
                }
                Ok(Advance::Finalized(Finalized::Signature(Signature::new(
                    signature,
                ))))
            }
            _ => Err(Error::ProtocolViolation(
                "signing message received outside an active round".into(),
            )),
        }
    }
}
