//! Share rotation
//!
//! Zero-sum refresh of the key shares: the client picks a random delta,
//! adds it to its share, and the co-signer subtracts the same delta
//! from its own. The joint public key is unchanged, so a share stolen
//! before rotation is useless together with a share stolen after.

use super::{check_envelope, single, Advance, Finalized, RoundBody, RoundEnvelope};
use crate::{curve, Algorithm, Error, Result};
use uuid::Uuid;
use zeroize::Zeroizing;

enum RotationState {
    Created,
    AwaitAck,
    Done,
}

/// Client side of the single-round rotation protocol
pub struct RotationEngine {
    algorithm: Algorithm,
    correlation_id: String,
    public_key: Vec<u8>,
    new_secret: Zeroizing<[u8; 32]>,
    new_public_share: Vec<u8>,
    delta: Zeroizing<[u8; 32]>,
    state: RotationState,
}

impl RotationEngine {
    pub fn new(
        algorithm: Algorithm,
        share: &Zeroizing<Vec<u8>>,
        public_key: Vec<u8>,
    ) -> Result<Self> {
        let delta = curve::random_scalar(algorithm);
        let new_secret = curve::scalar_add(algorithm, share, delta.as_ref())?;
        let new_public_share = curve::mul_base(algorithm, new_secret.as_ref())?;
        Ok(Self {
            algorithm,
            correlation_id: Uuid::new_v4().to_string(),
            public_key,
            new_secret,
            new_public_share,
            delta,
            state: RotationState::Created,
        })
    }

    pub fn initial_messages(&mut self) -> Result<Vec<RoundEnvelope>> {
        match self.state {
            RotationState::Created => {
                self.state = RotationState::AwaitAck;
                Ok(vec![RoundEnvelope::new(
                    self.correlation_id.clone(),
                    self.algorithm,
                    1,
                    RoundBody::RotateOffer {
                        delta: self.delta.to_vec(),
                        new_public_share: self.new_public_share.clone(),
                    },
                )])
            }
            _ => Err(Error::ProtocolViolation("rotation already started".into())),
        }
    }

    pub fn advance(&mut self, inbound: Vec<RoundEnvelope>) -> Result<Advance> {
        let env = single(inbound)?;
        match std::mem::replace(&mut self.state, RotationState::Done) {
            RotationState::AwaitAck => {
                check_envelope(&env, self.algorithm, &self.correlation_id, 1)?;
                let RoundBody::RotateAck { new_public_share } = env.body else {
                    return Err(Error::ProtocolViolation(format!(
                        "expected rotation ack, got {}",
                        env.body.kind_name()
                    )));
                };
                // the refreshed shares must still sum to the original key
                let joint =
                    curve::point_add(self.algorithm, &self.new_public_share, &new_public_share)?;
                if joint != self.public_key {
                    return Err(Error::ProtocolViolation(
                        "rotated shares do not reproduce the joint public key".into(),
                    ));
                }
                let address = curve::derive_address(self.algorithm, &self.public_key)?;
                Ok(Advance::Finalized(Finalized::KeyShare {
                    share_data: Zeroizing::new(self.new_secret.to_vec()),
                    public_key: self.public_key.clone(),
                    address,
                }))
            }
            _ => Err(Error::ProtocolViolation(
                "rotation message received outside an active round".into(),
            )),
        }
    }
}
