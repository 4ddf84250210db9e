//! # bcenvelope
//!
//! Self-describing authenticated-encryption envelopes for contact keys that
//! come from scanned barcodes.
//!
//! An envelope is a single printable string:
//!
//! ```text
//! ~BCEv4~eyJzYWx0IjoiLi4uIiwiY2lwaGVydGV4dCI6Ii4uLiIsImtleU5hbWUiOiJBbGljZSIs...
//! ```
//!
//! It carries the salt, the AES-256-GCM output and the message metadata (key
//! name, counter, options, attempt cap). The metadata travels in the clear but
//! is bound into the authentication tag, so changing any of it breaks
//! decryption.
//!
//! [`Engine`] is the entry point. Besides sealing and opening it enforces the
//! per-message policy: single-use revocation, capped decryption attempts, and
//! TTL directives handed back to the caller. Every decryption failure looks the
//! same to the caller; the reason is only visible in the [`audit`] log.
//!
//! ```no_run
//! use bcenvelope::{Engine, Ikm, MessageMetadata, MessageOptions};
//!
//! let engine = Engine::in_memory();
//! let ikm = Ikm::from_barcode("QR123");
//! let metadata = MessageMetadata::new("Alice", 1)
//!     .with_options(MessageOptions::new().single_use());
//!
//! let envelope = engine.encrypt(b"hello", &ikm, &metadata)?;
//! let opened = engine.decrypt(&envelope, &ikm)?;
//! assert_eq!(opened.text(), Some("hello"));
//! assert!(engine.decrypt(&envelope, &ikm).is_err());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod aad;
pub mod audit;
pub mod config;
pub(crate) mod crypto;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod policy;
pub mod scheme;
pub mod store;

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;

use audit::{AuditLog, AuditRecord, AuditSink, FileAuditSink, Outcome};
use error::{ConfigError, Rejection};
use store::{FileRevocationLedger, MemoryAttemptCounter, MemoryRevocationLedger};

pub use config::EngineConfig;
pub use error::{DecryptError, EncryptError, EnvelopeError};
pub use keys::Ikm;
pub use policy::{AttemptCounter, MessageOptions, MessagePolicy, RevocationLedger};
pub use scheme::{DecryptedMessage, MessageMetadata, Scheme, SchemeRegistry, V4Scheme};

/// Policy-enforcing envelope engine.
///
/// Owns the scheme registry and the audit log; shares the revocation ledger
/// and attempt counter with whoever else needs them. All methods take
/// `&self` and the engine is `Send + Sync`.
pub struct Engine {
    schemes: SchemeRegistry,
    revocations: Arc<dyn RevocationLedger>,
    attempts: Arc<dyn AttemptCounter>,
    audit: Mutex<AuditLog>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("schemes", &self.schemes)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// An engine over the given policy stores, using the default registry.
    pub fn new(
        revocations: Arc<dyn RevocationLedger>,
        attempts: Arc<dyn AttemptCounter>,
    ) -> Self {
        Self {
            schemes: SchemeRegistry::default(),
            revocations,
            attempts,
            audit: Mutex::new(AuditLog::new()),
        }
    }

    /// An engine whose policy state lives only in process memory.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryRevocationLedger::new()),
            Arc::new(MemoryAttemptCounter::new()),
        )
    }

    /// Build an engine from configuration, opening any files it names.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let revocations: Arc<dyn RevocationLedger> = match &config.revocation_ledger {
            Some(path) => Arc::new(FileRevocationLedger::open(path)?),
            None => Arc::new(MemoryRevocationLedger::new()),
        };

        let mut audit = AuditLog::with_capacity(config.audit_capacity);
        if let Some(path) = &config.audit_log {
            audit.add_forward_sink(Box::new(FileAuditSink::new(path)?));
        }

        Ok(Self {
            schemes: SchemeRegistry::default(),
            revocations,
            attempts: Arc::new(MemoryAttemptCounter::new()),
            audit: Mutex::new(audit),
        })
    }

    /// Replace the scheme registry.
    pub fn with_schemes(mut self, schemes: SchemeRegistry) -> Self {
        self.schemes = schemes;
        self
    }

    pub fn schemes(&self) -> &SchemeRegistry {
        &self.schemes
    }

    /// Forward every future audit record to `sink` as well.
    pub fn add_audit_sink(&self, sink: Box<dyn AuditSink>) {
        self.audit_log().add_forward_sink(sink);
    }

    /// A copy of the retained audit records, oldest first.
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit_log().iter().cloned().collect()
    }

    fn audit_log(&self) -> std::sync::MutexGuard<'_, AuditLog> {
        // A panic in a sink must not disable auditing for everyone else.
        self.audit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seal `plaintext` into an envelope string with the current scheme.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        ikm: &Ikm,
        metadata: &MessageMetadata,
    ) -> Result<String, EncryptError> {
        self.schemes.encrypt(plaintext, ikm, metadata).map_err(|err| {
            tracing::error!(
                key_name = %metadata.key_name,
                counter = metadata.counter,
                error = %err,
                "encryption failed"
            );
            EncryptError
        })
    }

    /// Open an envelope, applying revocation, attempt budget and single-use
    /// policy around the cryptographic check.
    pub fn decrypt(&self, envelope: &str, ikm: &Ikm) -> Result<DecryptedMessage, DecryptError> {
        let envelope = envelope.trim();
        let mut record = AuditRecord {
            outcome: Outcome::Opened,
            envelope_hash: policy::envelope_digest(envelope),
            key_name: None,
            counter: None,
            remaining_attempts: None,
            timestamp: Utc::now(),
        };

        let result = self.decrypt_checked(envelope, ikm, &mut record);
        match &result {
            Ok(message) => tracing::debug!(
                key_name = %message.key_name(),
                counter = message.counter(),
                single_use = message.single_use(),
                "envelope opened"
            ),
            Err(err) => {
                record.outcome = Outcome::from(err);
                log_failure(err, &record);
            }
        }
        self.audit_log().append(record);

        result.map_err(DecryptError::from)
    }

    fn decrypt_checked(
        &self,
        envelope: &str,
        ikm: &Ikm,
        record: &mut AuditRecord,
    ) -> Result<DecryptedMessage, EnvelopeError> {
        let (scheme, message) = self.schemes.decode(envelope)?;
        record.envelope_hash = policy::message_digest(scheme, &message)?;
        record.key_name = Some(message.key_name.clone());
        record.counter = Some(message.counter);

        if self.revocations.is_revoked(&record.envelope_hash)? {
            return Err(EnvelopeError::PolicyRejection(Rejection::Revoked));
        }

        let max_attempts = message.max_attempts;
        let attempt_key =
            (max_attempts != 0).then(|| policy::attempt_digest(&message.ciphertext, max_attempts));
        if let Some(hash) = &attempt_key {
            let remaining = self.remaining_for(hash, max_attempts)?;
            record.remaining_attempts = Some(remaining);
            if remaining == 0 {
                return Err(EnvelopeError::PolicyRejection(Rejection::AttemptsExhausted));
            }
        }

        let opened = match scheme::open_message(scheme, ikm, message) {
            Ok(opened) => opened,
            Err(err) => {
                if let (EnvelopeError::AuthenticationFailure, Some(hash)) = (&err, &attempt_key) {
                    self.attempts.record_failure(hash, max_attempts)?;
                    record.remaining_attempts = Some(self.remaining_for(hash, max_attempts)?);
                }
                return Err(err);
            }
        };

        // Burn only after a successful open. If the write fails the plaintext
        // is dropped (and wiped) rather than released unburned.
        if opened.policy.single_use {
            self.revocations.revoke(&record.envelope_hash)?;
        }

        Ok(opened)
    }

    /// Stored budget, never above the cap the message was sealed with.
    fn remaining_for(&self, hash: &str, max_attempts: u32) -> Result<u32, EnvelopeError> {
        Ok(self.attempts.remaining(hash, max_attempts)?.min(max_attempts))
    }

    /// Attempts left for a capped envelope, or `None` if it is unlimited.
    pub fn remaining_attempts(&self, envelope: &str) -> Result<Option<u32>, DecryptError> {
        let (_, message) = self.schemes.decode(envelope)?;
        if message.max_attempts == 0 {
            return Ok(None);
        }
        let hash = policy::attempt_digest(&message.ciphertext, message.max_attempts);
        Ok(Some(self.remaining_for(&hash, message.max_attempts)?))
    }

    /// Restore the full attempt budget of a capped envelope.
    pub fn reset_attempts(&self, envelope: &str) -> Result<(), DecryptError> {
        let (_, message) = self.schemes.decode(envelope)?;
        if message.max_attempts != 0 {
            self.attempts
                .reset(&policy::attempt_digest(&message.ciphertext, message.max_attempts))?;
        }
        Ok(())
    }

    /// Whether an envelope has been burned, under any spelling the decoder
    /// accepts.
    ///
    /// Administrative: [`Engine::decrypt`] never tells its caller why it
    /// failed, and this answer should stay with the key store or operator
    /// tooling rather than be shown to whoever presented the envelope.
    pub fn is_revoked(&self, envelope: &str) -> Result<bool, DecryptError> {
        let hash = match self.schemes.decode(envelope) {
            Ok((scheme, message)) => policy::message_digest(scheme, &message)?,
            Err(_) => policy::envelope_digest(envelope),
        };
        Ok(self.revocations.is_revoked(&hash)?)
    }
}

fn log_failure(err: &EnvelopeError, record: &AuditRecord) {
    let hash_prefix = record.envelope_hash.get(..12).unwrap_or_default();
    match err {
        EnvelopeError::CryptographicFault(_) => tracing::error!(
            envelope = hash_prefix,
            error = %err,
            "cryptographic fault during decryption"
        ),
        EnvelopeError::Store(_) => tracing::warn!(
            envelope = hash_prefix,
            error = %err,
            "policy store unavailable"
        ),
        _ => tracing::debug!(
            envelope = hash_prefix,
            key_name = record.key_name.as_deref(),
            remaining_attempts = record.remaining_attempts,
            outcome = ?record.outcome,
            "decryption refused"
        ),
    }
}
