//! The `~BCEv4~` wire format.
//!
//! ```text
//! "~BCEv4~" + base64( JSON {
//!     "salt":        <16 bytes>,
//!     "ciphertext":  <nonce || ciphertext || tag>,
//!     "keyName":     string,
//!     "counter":     u64,
//!     "options":     [string],
//!     "maxAttempts": u32
//! } )
//! ```
//!
//! Byte fields are written as padded standard base64 strings. On input they
//! may also be JSON arrays of byte values, signed (-128..=127) or unsigned,
//! which is how JVM serialisers emit byte arrays. The outer base64 layer is
//! accepted with or without padding.
//!
//! Nothing in this module touches key material.

use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::aad;
use crate::crypto::{NONCE_LEN, TAG_LEN};
use crate::error::{EnvelopeError, Malformed};
use crate::keys::SALT_LEN;

/// Header token identifying the v4 scheme. Exact and case-sensitive.
pub const HEADER: &str = "~BCEv4~";

/// Standard alphabet, padding optional on decode.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The structured payload carried inside a v4 envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMessage {
    #[serde(with = "wire_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "wire_bytes")]
    pub ciphertext: Vec<u8>,
    pub key_name: String,
    pub counter: u64,
    pub options: Vec<String>,
    /// `0` means unlimited.
    pub max_attempts: u32,
}

impl EnvelopeMessage {
    /// The associated data this message's tag was computed over.
    pub fn associated_data(&self) -> Result<Vec<u8>, EnvelopeError> {
        aad::build(&self.key_name, self.counter, &self.options, self.max_attempts)
    }
}

/// Result of trying to read a string as a v4 envelope.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// The input does not start with [`HEADER`]; another scheme may own it.
    NotThisScheme,
    Message(EnvelopeMessage),
}

/// Serialise a message to its wire string.
pub fn encode(message: &EnvelopeMessage) -> Result<String, EnvelopeError> {
    let json = serde_json::to_vec(message)
        .map_err(|_| EnvelopeError::CryptographicFault("envelope serialisation failed"))?;
    Ok(format!("{HEADER}{}", STANDARD.encode(json)))
}

/// Parse a wire string.
///
/// Returns `Ok(Decoded::NotThisScheme)` for foreign input, and
/// `Err(MalformedEnvelope)` when the header matches but the rest is unusable.
pub fn decode(input: &str) -> Result<Decoded, EnvelopeError> {
    let Some(body) = input.trim().strip_prefix(HEADER) else {
        return Ok(Decoded::NotThisScheme);
    };

    let json = LENIENT
        .decode(body.trim())
        .map_err(|_| EnvelopeError::malformed(Malformed::Encoding))?;
    let message: EnvelopeMessage = serde_json::from_slice(&json)
        .map_err(|_| EnvelopeError::malformed(Malformed::Payload))?;

    if message.salt.len() != SALT_LEN || message.ciphertext.len() < NONCE_LEN + TAG_LEN {
        return Err(EnvelopeError::malformed(Malformed::FieldLength));
    }

    Ok(Decoded::Message(message))
}

/// Serde adapter for byte fields: base64 out, base64 or byte array in.
mod wire_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::LENIENT;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireBytes {
        Text(String),
        Array(Vec<i16>),
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match WireBytes::deserialize(deserializer)? {
            WireBytes::Text(text) => LENIENT.decode(text).map_err(D::Error::custom),
            WireBytes::Array(values) => values
                .into_iter()
                .map(|v| match v {
                    -128..=255 => Ok(v as u8),
                    _ => Err(D::Error::custom(format!("byte value out of range: {v}"))),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EnvelopeMessage {
        EnvelopeMessage {
            salt: vec![0xAB; SALT_LEN],
            ciphertext: vec![0x11; NONCE_LEN + TAG_LEN + 5],
            key_name: "Alice".to_string(),
            counter: 7,
            options: vec!["single-use".to_string(), "ttl_hours=2".to_string()],
            max_attempts: 3,
        }
    }

    fn wrap(json: &str) -> String {
        format!("{HEADER}{}", STANDARD.encode(json))
    }

    #[test]
    fn test_encode_decode() {
        let encoded = encode(&sample()).unwrap();
        assert!(encoded.starts_with(HEADER));
        assert!(!encoded.contains('\n'));
        assert_eq!(decode(&encoded).unwrap(), Decoded::Message(sample()));
    }

    #[test]
    fn test_foreign_header_is_not_an_error() {
        assert_eq!(decode("hello there").unwrap(), Decoded::NotThisScheme);
        assert_eq!(decode("~bcev4~AAAA").unwrap(), Decoded::NotThisScheme);
        assert_eq!(decode("~BCEv3~AAAA").unwrap(), Decoded::NotThisScheme);
    }

    #[test]
    fn test_surrounding_whitespace_and_missing_padding() {
        let encoded = encode(&sample()).unwrap();
        let unpadded = encoded.trim_end_matches('=');
        let scanned = format!("  {unpadded}\n");
        assert_eq!(decode(&scanned).unwrap(), Decoded::Message(sample()));
    }

    #[test]
    fn test_bad_base64_is_malformed() {
        assert!(matches!(
            decode("~BCEv4~not base64!!"),
            Err(EnvelopeError::MalformedEnvelope(Malformed::Encoding))
        ));
    }

    #[test]
    fn test_incomplete_payload_is_malformed() {
        let missing_counter = wrap(
            r#"{"salt":"q6urq6urq6urq6urq6urqw==","ciphertext":"","keyName":"A","options":[],"maxAttempts":0}"#,
        );
        assert!(matches!(
            decode(&missing_counter),
            Err(EnvelopeError::MalformedEnvelope(Malformed::Payload))
        ));
        assert!(matches!(
            decode(&wrap("[1,2,3]")),
            Err(EnvelopeError::MalformedEnvelope(Malformed::Payload))
        ));
    }

    #[test]
    fn test_negative_counter_is_malformed() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value["counter"] = serde_json::json!(-1);
        assert!(matches!(
            decode(&wrap(&value.to_string())),
            Err(EnvelopeError::MalformedEnvelope(Malformed::Payload))
        ));
    }

    #[test]
    fn test_short_salt_is_rejected() {
        let mut message = sample();
        message.salt.truncate(8);
        let encoded = encode(&message).unwrap();
        assert!(matches!(
            decode(&encoded),
            Err(EnvelopeError::MalformedEnvelope(Malformed::FieldLength))
        ));
    }

    #[test]
    fn test_signed_byte_arrays_are_accepted() {
        let mut value = serde_json::to_value(sample()).unwrap();
        let salt: Vec<i16> = vec![-85; SALT_LEN];
        let ciphertext: Vec<i16> = vec![17; NONCE_LEN + TAG_LEN + 5];
        value["salt"] = serde_json::json!(salt);
        value["ciphertext"] = serde_json::json!(ciphertext);
        assert_eq!(
            decode(&wrap(&value.to_string())).unwrap(),
            Decoded::Message(sample())
        );
    }
}
