//! Low-level cryptographic operations.
//!
//! This module is one of exactly two places in the crate that import `ring`
//! directly (the other is `keys`). All other modules seal, open and hash
//! exclusively through the functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM with associated data
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **Tag**: 128-bit, appended to the ciphertext
//! - **Digest**: SHA-256, hex-encoded, for ledger keys

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::EnvelopeError;

/// The AEAD algorithm used for every envelope.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Size of a derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Fill a fixed-size array from the system CSPRNG.
pub(crate) fn random_array<const N: usize>() -> Result<[u8; N], EnvelopeError> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| EnvelopeError::CryptographicFault("randomness source failed"))?;
    Ok(buf)
}

fn bind_key(key_bytes: &[u8; KEY_LEN]) -> Result<LessSafeKey, EnvelopeError> {
    let unbound = UnboundKey::new(ALGORITHM, key_bytes)
        .map_err(|_| EnvelopeError::CryptographicFault("invalid AES-256 key"))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key_bytes`, authenticating `aad` alongside it.
///
/// # Layout of returned bytes
/// ```text
/// [ nonce (12 bytes) ][ ciphertext ][ GCM tag (16 bytes) ]
/// ```
pub fn seal(
    key_bytes: &[u8; KEY_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let key = bind_key(key_bytes)?;
    let nonce_bytes = random_array::<NONCE_LEN>()?;

    let mut in_out = Vec::with_capacity(plaintext.len() + TAG_LEN);
    in_out.extend_from_slice(plaintext);
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::from(aad),
        &mut in_out,
    )
    .map_err(|_| EnvelopeError::CryptographicFault("AES-GCM seal failed"))?;

    let mut output = Vec::with_capacity(NONCE_LEN + in_out.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&in_out);
    Ok(output)
}

/// Decrypt bytes produced by [`seal`].
///
/// `ring` verifies the tag before any plaintext is exposed; on failure the
/// in-place buffer is dropped and the caller receives only
/// `AuthenticationFailure`. Short input reports the same error so that
/// truncation is not distinguishable from a bad key.
pub fn open(
    key_bytes: &[u8; KEY_LEN],
    sealed: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(EnvelopeError::AuthenticationFailure);
    }

    let nonce_bytes: [u8; NONCE_LEN] = sealed[..NONCE_LEN]
        .try_into()
        .map_err(|_| EnvelopeError::AuthenticationFailure)?;
    let key = bind_key(key_bytes)?;

    let mut payload = sealed[NONCE_LEN..].to_vec();
    let plaintext_len = key
        .open_in_place(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from(aad),
            &mut payload,
        )
        .map_err(|_| EnvelopeError::AuthenticationFailure)?
        .len();

    payload.truncate(plaintext_len);
    Ok(payload)
}

/// SHA-256 of `data`, lower-case hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data).as_ref())
}

/// Raw SHA-256 of `data`.
pub(crate) fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest::digest(&digest::SHA256, data).as_ref());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip_with_aad() {
        let key = [7u8; KEY_LEN];
        let sealed = seal(&key, b"attack at dawn", b"context").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + 14 + TAG_LEN);
        assert_eq!(open(&key, &sealed, b"context").unwrap(), b"attack at dawn");
    }

    #[test]
    fn test_open_rejects_wrong_aad() {
        let key = [7u8; KEY_LEN];
        let sealed = seal(&key, b"payload", b"counter=1").unwrap();
        assert!(matches!(
            open(&key, &sealed, b"counter=2"),
            Err(EnvelopeError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_open_rejects_truncated_input() {
        let key = [7u8; KEY_LEN];
        assert!(matches!(
            open(&key, &[0u8; NONCE_LEN + TAG_LEN - 1], b""),
            Err(EnvelopeError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let key = [7u8; KEY_LEN];
        let a = seal(&key, b"same", b"").unwrap();
        let b = seal(&key, b"same", b"").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
