//! Curve primitives shared by the round engines
//!
//! The round engines only ever need a handful of group operations:
//! scalar generation, base-point multiplication, point and scalar
//! addition, a Fiat-Shamir challenge, and verification of the combined
//! signature. Everything here works on canonical byte encodings
//! (compressed SEC1 for secp256k1, compressed Edwards-Y for ed25519) so
//! the protocol layer never handles curve types directly.

use crate::{Algorithm, Error, Result};
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar as EdScalar;
use k256::elliptic_curve::{
    bigint::U256,
    ops::Reduce,
    sec1::{FromEncodedPoint, ToEncodedPoint},
    Field,
};
use k256::{AffinePoint, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

/// Length of a compressed public point for the given algorithm
pub fn point_len(algorithm: Algorithm) -> usize {
    match algorithm {
        Algorithm::Ecdsa => 33,
        Algorithm::Eddsa => 32,
    }
}

/// Generate a uniformly random scalar
pub fn random_scalar(algorithm: Algorithm) -> Zeroizing<[u8; 32]> {
    match algorithm {
        Algorithm::Ecdsa => {
            let s = Scalar::random(&mut OsRng);
            Zeroizing::new(s.to_bytes().into())
        }
        Algorithm::Eddsa => {
            let s = EdScalar::random(&mut OsRng);
            Zeroizing::new(s.to_bytes())
        }
    }
}

/// Compute the public point for a secret scalar (compressed encoding)
pub fn mul_base(algorithm: Algorithm, scalar: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        Algorithm::Ecdsa => {
            let s = decode_k256_scalar(scalar)?;
            let point = (ProjectivePoint::GENERATOR * s).to_affine();
            Ok(point.to_encoded_point(true).as_bytes().to_vec())
        }
        Algorithm::Eddsa => {
            let s = decode_ed_scalar(scalar)?;
            Ok(EdwardsPoint::mul_base(&s).compress().to_bytes().to_vec())
        }
    }
}

/// Add two compressed public points
pub fn point_add(algorithm: Algorithm, a: &[u8], b: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        Algorithm::Ecdsa => {
            let sum = decode_k256_point(a)? + decode_k256_point(b)?;
            Ok(sum.to_affine().to_encoded_point(true).as_bytes().to_vec())
        }
        Algorithm::Eddsa => {
            let sum = decode_ed_point(a)? + decode_ed_point(b)?;
            Ok(sum.compress().to_bytes().to_vec())
        }
    }
}

/// Add two scalars modulo the group order
pub fn scalar_add(algorithm: Algorithm, a: &[u8], b: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    match algorithm {
        Algorithm::Ecdsa => {
            let sum = decode_k256_scalar(a)? + decode_k256_scalar(b)?;
            Ok(Zeroizing::new(sum.to_bytes().into()))
        }
        Algorithm::Eddsa => {
            let sum = decode_ed_scalar(a)? + decode_ed_scalar(b)?;
            Ok(Zeroizing::new(sum.to_bytes()))
        }
    }
}

/// Subtract scalar `b` from scalar `a` modulo the group order
pub fn scalar_sub(algorithm: Algorithm, a: &[u8], b: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    match algorithm {
        Algorithm::Ecdsa => {
            let diff = decode_k256_scalar(a)? - decode_k256_scalar(b)?;
            Ok(Zeroizing::new(diff.to_bytes().into()))
        }
        Algorithm::Eddsa => {
            let diff = decode_ed_scalar(a)? - decode_ed_scalar(b)?;
            Ok(Zeroizing::new(diff.to_bytes()))
        }
    }
}

/// Compute a signing partial `k + e * x` over the group order
pub fn partial_response(
    algorithm: Algorithm,
    nonce: &[u8],
    challenge: &[u8],
    share: &[u8],
) -> Result<Zeroizing<[u8; 32]>> {
    match algorithm {
        Algorithm::Ecdsa => {
            let s = decode_k256_scalar(nonce)?
                + decode_k256_scalar(challenge)? * decode_k256_scalar(share)?;
            Ok(Zeroizing::new(s.to_bytes().into()))
        }
        Algorithm::Eddsa => {
            let s = decode_ed_scalar(nonce)?
                + decode_ed_scalar(challenge)? * decode_ed_scalar(share)?;
            Ok(Zeroizing::new(s.to_bytes()))
        }
    }
}

/// Fiat-Shamir challenge binding the aggregate nonce, the joint public
/// key, and the message digest
pub fn challenge(
    algorithm: Algorithm,
    nonce_point: &[u8],
    public_key: &[u8],
    digest: &[u8; 32],
) -> Result<[u8; 32]> {
    match algorithm {
        Algorithm::Ecdsa => {
            let mut hasher = Sha256::new();
            hasher.update(nonce_point);
            hasher.update(public_key);
            hasher.update(digest);
            let bytes: [u8; 32] = hasher.finalize().into();
            let e = <Scalar as Reduce<U256>>::reduce_bytes(&bytes.into());
            Ok(e.to_bytes().into())
        }
        Algorithm::Eddsa => {
            let mut hasher = Sha512::new();
            hasher.update(nonce_point);
            hasher.update(public_key);
            hasher.update(digest);
            let wide: [u8; 64] = hasher.finalize().into();
            Ok(EdScalar::from_bytes_mod_order_wide(&wide).to_bytes())
        }
    }
}

/// Verify a combined signature `R || s` against the joint public key
pub fn verify_signature(
    algorithm: Algorithm,
    public_key: &[u8],
    digest: &[u8; 32],
    signature: &[u8],
) -> Result<bool> {
    let plen = point_len(algorithm);
    if signature.len() != plen + 32 {
        return Err(Error::Crypto(format!(
            "signature must be {} bytes, got {}",
            plen + 32,
            signature.len()
        )));
    }
    let (r_bytes, s_bytes) = signature.split_at(plen);
    let e = challenge(algorithm, r_bytes, public_key, digest)?;

    // s * G == R + e * P
    match algorithm {
        Algorithm::Ecdsa => {
            let s = decode_k256_scalar(s_bytes)?;
            let lhs = ProjectivePoint::GENERATOR * s;
            let rhs =
                decode_k256_point(r_bytes)? + decode_k256_point(public_key)? * decode_k256_scalar(&e)?;
            Ok(lhs == rhs)
        }
        Algorithm::Eddsa => {
            let s = decode_ed_scalar(s_bytes)?;
            let lhs = EdwardsPoint::mul_base(&s);
            let rhs = decode_ed_point(r_bytes)? + decode_ed_point(public_key)? * decode_ed_scalar(&e)?;
            Ok(lhs == rhs)
        }
    }
}

/// Derive the wallet address for a joint public key
///
/// ECDSA wallets use the Ethereum convention (Keccak-256 of the
/// uncompressed point, last 20 bytes). EdDSA wallets use the Solana
/// convention (base58 of the 32-byte compressed point).
pub fn derive_address(algorithm: Algorithm, public_key: &[u8]) -> Result<String> {
    match algorithm {
        Algorithm::Ecdsa => {
            use tiny_keccak::{Hasher, Keccak};

            let point = decode_k256_point(public_key)?;
            let encoded = point.to_affine().to_encoded_point(false);
            let pk_bytes = encoded.as_bytes();

            // Skip the 0x04 prefix and hash with Keccak256
            let mut hasher = Keccak::v256();
            hasher.update(&pk_bytes[1..]);
            let mut hash = [0u8; 32];
            hasher.finalize(&mut hash);

            Ok(format!("0x{}", hex::encode(&hash[12..])))
        }
        Algorithm::Eddsa => {
            decode_ed_point(public_key)?;
            Ok(bs58::encode(public_key).into_string())
        }
    }
}

fn decode_k256_scalar(bytes: &[u8]) -> Result<Scalar> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Crypto("invalid scalar length".into()))?;
    Ok(<Scalar as Reduce<U256>>::reduce_bytes(&array.into()))
}

fn decode_k256_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded =
        k256::EncodedPoint::from_bytes(bytes).map_err(|e| Error::Crypto(e.to_string()))?;
    let affine_opt = AffinePoint::from_encoded_point(&encoded);
    let affine: AffinePoint =
        Option::<AffinePoint>::from(affine_opt).ok_or(Error::Crypto("invalid point".into()))?;
    Ok(ProjectivePoint::from(affine))
}

fn decode_ed_scalar(bytes: &[u8]) -> Result<EdScalar> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Crypto("invalid scalar length".into()))?;
    Ok(EdScalar::from_bytes_mod_order(array))
}

fn decode_ed_point(bytes: &[u8]) -> Result<EdwardsPoint> {
    let compressed = CompressedEdwardsY::from_slice(bytes)
        .map_err(|_| Error::Crypto("invalid point length".into()))?;
    compressed
        .decompress()
        .ok_or_else(|| Error::Crypto("invalid point".into()))
}
