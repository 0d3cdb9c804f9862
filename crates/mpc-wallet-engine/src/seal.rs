//! Envelope encryption for backup and export payloads
//!
//! Backups are sealed to a caller-supplied X25519 public key: an
//! ephemeral keypair is generated per blob, the shared secret is run
//! through SHA-256 together with both public keys, and the result keys
//! a ChaCha20-Poly1305 seal. Exports use the caller's 32-byte symmetric
//! key directly. The engine can produce blobs it cannot itself reopen;
//! `open_sealed` exists for recovery tooling that holds the recipient
//! secret.

use crate::{Error, Result};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// A blob sealed to an X25519 recipient public key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedBlob {
    /// Ephemeral public key used for this blob
    pub ephemeral_key: [u8; 32],
    /// ChaCha20-Poly1305 nonce
    pub nonce: [u8; 12],
    /// Sealed payload
    pub ciphertext: Vec<u8>,
}

/// Seal `plaintext` so that only the holder of the recipient secret can
/// open it
pub fn seal_to_recipient(recipient_key: &[u8; 32], plaintext: &[u8]) -> Result<SealedBlob> {
    let recipient = PublicKey::from(*recipient_key);
    let ephemeral = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_pk = PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&recipient);
    let key = derive_blob_key(shared.as_bytes(), ephemeral_pk.as_bytes(), recipient_key);

    let cipher = ChaCha20Poly1305::new((&*key).into());
    let nonce_bytes: [u8; 12] = rand::random();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| Error::Encryption(e.to_string()))?;

    Ok(SealedBlob {
        ephemeral_key: ephemeral_pk.to_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Open a blob with the recipient's X25519 secret key
pub fn open_sealed(recipient_secret: &[u8; 32], blob: &SealedBlob) -> Result<Zeroizing<Vec<u8>>> {
    let secret = StaticSecret::from(*recipient_secret);
    let recipient_pk = PublicKey::from(&secret);
    let ephemeral_pk = PublicKey::from(blob.ephemeral_key);

    let shared = secret.diffie_hellman(&ephemeral_pk);
    let key = derive_blob_key(
        shared.as_bytes(),
        &blob.ephemeral_key,
        recipient_pk.as_bytes(),
    );

    let cipher = ChaCha20Poly1305::new((&*key).into());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&blob.nonce), blob.ciphertext.as_ref())
        .map_err(|_| Error::Encryption("decryption failed - wrong key or corrupted blob".into()))?;

    Ok(Zeroizing::new(plaintext))
}

/// Seal under a caller-supplied symmetric key (export path)
pub fn seal_symmetric(key: &[u8; 32], plaintext: &[u8]) -> Result<([u8; 12], Vec<u8>)> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let nonce_bytes: [u8; 12] = rand::random();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| Error::Encryption(e.to_string()))?;
    Ok((nonce_bytes, ciphertext))
}

/// Open a symmetric seal produced by [`seal_symmetric`]
pub fn open_symmetric(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Encryption("decryption failed - wrong key or corrupted data".into()))?;
    Ok(Zeroizing::new(plaintext))
}

fn derive_blob_key(
    shared_secret: &[u8; 32],
    ephemeral_pk: &[u8; 32],
    recipient_pk: &[u8; 32],
) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret);
    hasher.update(ephemeral_pk);
    hasher.update(recipient_pk);
    Zeroizing::new(hasher.finalize().into())
}
