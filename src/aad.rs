//! Associated data for the v4 scheme.
//!
//! The four metadata fields are serialised as a JSON object whose key order
//! is fixed by the field order of [`AssociatedData`]. `serde_json` writes
//! struct fields in declaration order and never reorders or pretty-prints,
//! so the same metadata always yields the same bytes:
//!
//! ```text
//! {"keyName":"Alice","counter":1,"options":["single-use"],"maxAttempts":0}
//! ```
//!
//! The encoder and decoder both go through [`build`]; nothing else in the
//! crate produces AAD.

use serde::Serialize;

use crate::error::EnvelopeError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssociatedData<'a> {
    key_name: &'a str,
    counter: u64,
    options: &'a [String],
    max_attempts: u32,
}

/// Canonical AAD bytes for the given metadata.
pub fn build(
    key_name: &str,
    counter: u64,
    options: &[String],
    max_attempts: u32,
) -> Result<Vec<u8>, EnvelopeError> {
    let aad = AssociatedData {
        key_name,
        counter,
        options,
        max_attempts,
    };
    serde_json::to_vec(&aad)
        .map_err(|_| EnvelopeError::CryptographicFault("associated data serialisation failed"))
}
