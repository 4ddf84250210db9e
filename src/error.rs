//! Error types for bcenvelope.
//!
//! Two layers live here. `EnvelopeError` is the internal taxonomy: every
//! component returns it and the engine logs and audits it. `EncryptError` and
//! `DecryptError` are what callers of [`crate::Engine`] see. They carry no
//! cause on purpose, so a wrong key, a tampered payload and a revoked message
//! are indistinguishable from the outside.

use thiserror::Error;

/// Why an envelope string could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    /// No registered scheme recognises the leading header token.
    UnknownHeader,
    /// The text after the header is not valid base64.
    Encoding,
    /// The decoded bytes are not a complete structured payload.
    Payload,
    /// A byte field has an impossible length (salt, ciphertext).
    FieldLength,
}

/// Why the policy engine refused to attempt decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The envelope digest is in the revocation ledger.
    Revoked,
    /// The capped attempt budget for this ciphertext is spent.
    AttemptsExhausted,
}

/// Internal error taxonomy for all envelope operations.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0:?}")]
    MalformedEnvelope(Malformed),

    /// Tag verification failed. Wrong key, tampered data and tampered
    /// metadata all land here.
    #[error("authentication failed")]
    AuthenticationFailure,

    #[error("rejected by policy: {0:?}")]
    PolicyRejection(Rejection),

    /// An underlying primitive failed. Indicates a platform problem rather
    /// than bad input.
    #[error("cryptographic fault: {0}")]
    CryptographicFault(&'static str),

    /// A revocation ledger or attempt counter could not be read or written.
    #[error("policy store failure: {0}")]
    Store(String),
}

impl EnvelopeError {
    pub(crate) fn malformed(kind: Malformed) -> Self {
        Self::MalformedEnvelope(kind)
    }
}

/// The only failure an encrypting caller observes.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("could not encrypt")]
pub struct EncryptError;

/// The only failure a decrypting caller observes.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("incorrect key or message unavailable")]
pub struct DecryptError;

impl From<EnvelopeError> for EncryptError {
    fn from(_: EnvelopeError) -> Self {
        EncryptError
    }
}

impl From<EnvelopeError> for DecryptError {
    fn from(_: EnvelopeError) -> Self {
        DecryptError
    }
}

/// Errors loading an [`crate::config::EngineConfig`] or opening the stores
/// it names.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}
