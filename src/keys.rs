//! Key material and derivation.
//!
//! This module owns two responsibilities:
//! 1. Holding input keying material (IKM) and derived keys in types that are
//!    opaque, non-cloneable, and zeroised on drop.
//! 2. Deriving the per-message AES key from IKM and a fresh salt using
//!    HKDF-SHA256.
//!
//! This is one of exactly two modules permitted to import `ring` directly
//! (the other is `crypto`).
//!
//! ## Derivation structure
//!
//! ```text
//! HKDF-SHA256(
//!     ikm  = barcode-derived secret,
//!     salt = 16 random bytes stored in the envelope,
//!     info = <empty>
//! )
//! ```
//!
//! The salt is unique per envelope, so every message gets an independent key
//! even when the same contact key is used for thousands of messages. `info`
//! stays empty for the v4 scheme; later schemes can use it for domain
//! separation.

use std::fmt;

use ring::hkdf;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{self, KEY_LEN};
use crate::error::EnvelopeError;

/// Salt length stored in every envelope.
pub const SALT_LEN: usize = 16;

/// Largest output HKDF-SHA256 can produce (255 * hash length).
pub const MAX_OKM_LEN: usize = 255 * 32;

const NO_INFO: &[&[u8]] = &[];

// ---------------------------------------------------------------------------
// Input keying material
// ---------------------------------------------------------------------------

/// The secret a contact key is built from: one or more scanned barcode
/// values, optionally strengthened with a password.
///
/// - Not `Clone`.
/// - Zeroised on drop.
/// - `Debug` never prints the bytes.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Ikm {
    bytes: Vec<u8>,
}

impl Ikm {
    /// Wrap raw secret bytes supplied by the key store.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// IKM for a single barcode value with no password: the value's UTF-8
    /// bytes, unchanged.
    pub fn from_barcode(value: &str) -> Self {
        Self::from_bytes(value.as_bytes().to_vec())
    }

    /// IKM for a key assembled from several barcodes and/or a password.
    ///
    /// A single value without a password is the same as [`Ikm::from_barcode`].
    /// Otherwise the result is
    ///
    /// ```text
    /// SHA-256( u32_be(len(v0)) || v0 || u32_be(len(v1)) || v1 || ...
    ///          [ || 0x01 || SHA-256(password) ] )
    /// ```
    ///
    /// Length framing keeps `["ab", "c"]` and `["a", "bc"]` apart. The
    /// password only ever enters as its digest.
    pub fn from_barcodes(values: &[&str], password: Option<&str>) -> Self {
        if let ([single], None) = (values, password) {
            return Self::from_barcode(single);
        }

        let mut framed = Zeroizing::new(Vec::new());
        for value in values {
            framed.extend_from_slice(&(value.len() as u32).to_be_bytes());
            framed.extend_from_slice(value.as_bytes());
        }
        if let Some(password) = password {
            let mut digest = crypto::sha256(password.as_bytes());
            framed.push(0x01);
            framed.extend_from_slice(&digest);
            digest.zeroize();
        }

        Self::from_bytes(crypto::sha256(&framed).to_vec())
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Ikm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ikm").field("len", &self.bytes.len()).finish()
    }
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// The AES-256 key for exactly one envelope.
///
/// Raw bytes are `pub(crate)` only and are wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Output length adapter for `ring`'s HKDF expand.
struct OkmLen(usize);

impl hkdf::KeyType for OkmLen {
    fn len(&self) -> usize {
        self.0
    }
}

/// HKDF-SHA256 extract-and-expand with an empty info string.
///
/// `output_len` must be in `1..=MAX_OKM_LEN`.
pub fn derive(
    ikm: &[u8],
    salt: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
    if output_len == 0 || output_len > MAX_OKM_LEN {
        return Err(EnvelopeError::CryptographicFault("HKDF output length out of range"));
    }

    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(ikm);
    let okm = prk
        .expand(NO_INFO, OkmLen(output_len))
        .map_err(|_| EnvelopeError::CryptographicFault("HKDF expand failed"))?;

    let mut out = Zeroizing::new(vec![0u8; output_len]);
    okm.fill(&mut out)
        .map_err(|_| EnvelopeError::CryptographicFault("HKDF fill failed"))?;
    Ok(out)
}

/// Derive the 256-bit message key for `salt`.
pub(crate) fn derive_key(ikm: &Ikm, salt: &[u8; SALT_LEN]) -> Result<DerivedKey, EnvelopeError> {
    let okm = derive(ikm.as_bytes(), salt, KEY_LEN)?;
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&okm);
    Ok(DerivedKey { bytes })
}

/// A fresh random salt for one encryption.
pub(crate) fn generate_salt() -> Result<[u8; SALT_LEN], EnvelopeError> {
    crypto::random_array::<SALT_LEN>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_rfc5869_empty_salt_and_info() {
        // RFC 5869 test case A.3.
        let okm = derive(&[0x0bu8; 22], &[], 42).unwrap();
        assert_eq!(
            hex::encode(&*okm),
            "8da4e775a563c18f715f802a063c5a31b8a11f5c5ee1879ec3454e5f3c738d2d9d201395faa4b61a96c8"
        );
    }

    #[test]
    fn test_derive_is_deterministic() {
        let a = derive(b"ikm", b"salt", 32).unwrap();
        let b = derive(b"ikm", b"salt", 32).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_different_salts_different_keys() {
        let ikm = Ikm::from_barcode("QR123");
        let a = derive_key(&ikm, &[1u8; SALT_LEN]).unwrap();
        let b = derive_key(&ikm, &[2u8; SALT_LEN]).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_derive_rejects_out_of_range_length() {
        assert!(derive(b"ikm", b"salt", 0).is_err());
        assert!(derive(b"ikm", b"salt", MAX_OKM_LEN + 1).is_err());
        assert_eq!(derive(b"ikm", b"salt", MAX_OKM_LEN).unwrap().len(), MAX_OKM_LEN);
    }

    #[test]
    fn test_single_barcode_is_verbatim() {
        assert_eq!(Ikm::from_barcodes(&["QR123"], None).as_bytes(), b"QR123");
    }

    #[test]
    fn test_barcode_framing_and_password() {
        let split_a = Ikm::from_barcodes(&["ab", "c"], None);
        let split_b = Ikm::from_barcodes(&["a", "bc"], None);
        assert_ne!(split_a.as_bytes(), split_b.as_bytes());

        let plain = Ikm::from_barcodes(&["QR123"], Some("hunter2"));
        let other = Ikm::from_barcodes(&["QR123"], Some("hunter3"));
        assert_eq!(plain.as_bytes().len(), 32);
        assert_ne!(plain.as_bytes(), other.as_bytes());
        assert_ne!(plain.as_bytes(), b"QR123");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", Ikm::from_barcode("QR123"));
        assert!(!rendered.contains("QR123"));
        assert!(rendered.contains("len"));
    }
}
