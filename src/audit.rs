//! Decryption outcome auditing.
//!
//! Callers of [`crate::Engine::decrypt`] only ever learn "it worked" or "it
//! didn't". The reason lives here: every decryption appends one record to a
//! bounded in-memory log, and optionally to forward sinks (a file, a
//! telemetry pipe). Records never contain key material or plaintext.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EnvelopeError, Malformed, Rejection};

/// How a decryption attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Opened,
    Revoked,
    AttemptsExhausted,
    AuthenticationFailed,
    UnknownScheme,
    Malformed,
    Fault,
    StoreFailure,
}

impl From<&EnvelopeError> for Outcome {
    fn from(err: &EnvelopeError) -> Self {
        match err {
            EnvelopeError::MalformedEnvelope(Malformed::UnknownHeader) => Self::UnknownScheme,
            EnvelopeError::MalformedEnvelope(_) => Self::Malformed,
            EnvelopeError::AuthenticationFailure => Self::AuthenticationFailed,
            EnvelopeError::PolicyRejection(Rejection::Revoked) => Self::Revoked,
            EnvelopeError::PolicyRejection(Rejection::AttemptsExhausted) => {
                Self::AttemptsExhausted
            }
            EnvelopeError::CryptographicFault(_) => Self::Fault,
            EnvelopeError::Store(_) => Self::StoreFailure,
        }
    }
}

/// A sink that receives audit records. Implement this to forward records
/// to a file, database, or telemetry pipeline.
pub trait AuditSink: Send {
    /// Append a record. Called once per decryption attempt.
    fn append(&mut self, record: AuditRecord);
}

/// A record of one decryption attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub outcome: Outcome,
    /// Revocation key of the envelope. Canonical once the payload decodes,
    /// otherwise the digest of the raw string.
    pub envelope_hash: String,
    /// Only present once the payload has been decoded.
    pub key_name: Option<String>,
    pub counter: Option<u64>,
    /// Attempts left after this attempt, for capped messages.
    pub remaining_attempts: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

/// A bounded, append-only log of decryption outcomes.
/// Oldest records fall off once `capacity` is reached; forward sinks see
/// every record regardless.
pub struct AuditLog {
    records: VecDeque<AuditRecord>,
    capacity: usize,
    forward_sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("records", &self.records)
            .field("capacity", &self.capacity)
            .field("forward_sinks", &self.forward_sinks.len())
            .finish()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl AuditLog {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            capacity,
            forward_sinks: Vec::new(),
        }
    }

    /// Add a sink to receive a copy of every record.
    pub fn add_forward_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.forward_sinks.push(sink);
    }

    /// Append a new record to the log and forward to any attached sinks.
    pub fn append(&mut self, record: AuditRecord) {
        for sink in self.forward_sinks.iter_mut() {
            sink.append(record.clone());
        }
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over retained records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &AuditRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&AuditRecord> {
        self.records.back()
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes audit records as JSON lines (one per record) to a file.
/// Creates the file if it doesn't exist; appends if it does.
pub struct FileAuditSink {
    file: std::fs::File,
}

impl FileAuditSink {
    /// Open or create a file for append-only audit logging.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, record: AuditRecord) {
        let written = serde_json::to_string(&record)
            .map_err(std::io::Error::from)
            .and_then(|line| writeln!(self.file, "{line}"))
            .and_then(|()| self.file.flush());
        if let Err(err) = written {
            tracing::warn!(error = %err, "audit record not persisted");
        }
    }
}
