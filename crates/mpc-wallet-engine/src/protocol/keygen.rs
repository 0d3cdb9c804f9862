//! Distributed key generation
//!
//! Commit/reveal exchange producing a 2-of-2 additive key: each party
//! samples a secret share, commits to its public share, then reveals
//! it. The joint public key is the sum of the two public shares and
//! neither party ever learns the other's secret.

use super::{check_envelope, commit_to, single, Advance, Finalized, RoundBody, RoundEnvelope};
use crate::{curve, Algorithm, Error, Result};
use uuid::Uuid;
use zeroize::Zeroizing;

enum KeygenState {
    Created,
    AwaitCommit,
    AwaitReveal { their_commitment: [u8; 32] },
    Done,
}

/// Client side of the two-round key generation protocol
pub struct KeygenEngine {
    algorithm: Algorithm,
    correlation_id: String,
    secret: Zeroizing<[u8; 32]>,
    public_share: Vec<u8>,
    state: KeygenState,
}

impl KeygenEngine {
    pub fn new(algorithm: Algorithm) -> Result<Self> {
        let secret = curve::random_scalar(algorithm);
        let public_share = curve::mul_base(algorithm, secret.as_ref())?;
        Ok(Self {
            algorithm,
            correlation_id: Uuid::new_v4().to_string(),
            secret,
            public_share,
            state: KeygenState::Created,
        })
    }

    fn envelope(&self, round: u32, body: RoundBody) -> RoundEnvelope {
        RoundEnvelope::new(self.correlation_id.clone(), self.algorithm, round, body)
    }

    pub fn initial_messages(&mut self) -> Result<Vec<RoundEnvelope>> {
        match self.state {
            KeygenState::Created => {
                self.state = KeygenState::AwaitCommit;
                Ok(vec![self.envelope(
                    1,
                    RoundBody::KeygenCommit {
                        commitment: commit_to(&self.public_share),
                    },
                )])
            }
            _ => Err(Error::ProtocolViolation(
                "key generation already started".into(),
            )),
        }
    }

    pub fn advance(&mut self, inbound: Vec<RoundEnvelope>) -> Result<Advance> {
        let env = single(inbound)?;
        match std::mem::replace(&mut self.state, KeygenState::Done) {
            KeygenState::AwaitCommit => {
                check_envelope(&env, self.algorithm, &self.correlation_id, 1)?;
                let RoundBody::KeygenCommit { commitment } = env.body else {
                    return Err(Error::ProtocolViolation(format!(
                        "expected keygen commitment, got {}",
                        env.body.kind_name()
                    )));
                };
                self.state = KeygenState::AwaitReveal {
                    their_commitment: commitment,
                };
                Ok(Advance::Next(vec![self.envelope(
                    2,
                    RoundBody::KeygenReveal {
                        public_share: self.public_share.clone(),
                    },
                )]))
            }
            KeygenState::AwaitReveal { their_commitment } => {
                check_envelope(&env, self.algorithm, &self.correlation_id, 2)?;
                let RoundBody::KeygenReveal { public_share } = env.body else {
                    return Err(Error::ProtocolViolation(format!(
                        "expected keygen reveal, got {}",
                        env.body.kind_name()
                    )));
                };
                if commit_to(&public_share) != their_commitment {
                    return Err(Error::ProtocolViolation(
                        "revealed public share does not match commitment".into(),
                    ));
                }
                let public_key =
                    curve::point_add(self.algorithm, &self.public_share, &public_share)?;
                let address = curve::derive_address(self.algorithm, &public_key)?;
                Ok(Advance::Finalized(Finalized::KeyShare {
                    share_data: Zeroizing::new(self.secret.to_vec()),
                    public_key,
                    address,
                }))
            }
            _ => Err(Error::ProtocolViolation(
                "keygen message received outside an active round".into(),
            )),
        }
    }
}
