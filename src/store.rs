//! Built-in policy stores.
//!
//! The engine only needs the two small traits in [`crate::policy`]; these are
//! the implementations that ship with the crate. Platform stores (a database
//! table, shared preferences) implement the same traits.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;
use crate::policy::{AttemptCounter, RevocationLedger};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, EnvelopeError> {
    mutex
        .lock()
        .map_err(|_| EnvelopeError::Store("store lock poisoned".to_string()))
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Revocation ledger held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRevocationLedger {
    revoked: Mutex<HashSet<String>>,
}

impl MemoryRevocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.revoked.lock().map(|set| set.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RevocationLedger for MemoryRevocationLedger {
    fn is_revoked(&self, hash: &str) -> Result<bool, EnvelopeError> {
        Ok(lock(&self.revoked)?.contains(hash))
    }

    fn revoke(&self, hash: &str) -> Result<(), EnvelopeError> {
        lock(&self.revoked)?.insert(hash.to_string());
        Ok(())
    }
}

/// Attempt counter held in process memory. Unlimited messages never reach
/// it, so it only ever holds capped ciphertexts that have seen a failure.
#[derive(Debug, Default)]
pub struct MemoryAttemptCounter {
    remaining: Mutex<HashMap<String, u32>>,
}

impl MemoryAttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttemptCounter for MemoryAttemptCounter {
    fn remaining(&self, hash: &str, max: u32) -> Result<u32, EnvelopeError> {
        let remaining = lock(&self.remaining)?;
        Ok(remaining.get(hash).map_or(max, |&left| left.min(max)))
    }

    fn record_failure(&self, hash: &str, max: u32) -> Result<(), EnvelopeError> {
        let mut remaining = lock(&self.remaining)?;
        let left = remaining.entry(hash.to_string()).or_insert(max);
        *left = (*left).min(max).saturating_sub(1);
        Ok(())
    }

    fn reset(&self, hash: &str) -> Result<(), EnvelopeError> {
        lock(&self.remaining)?.remove(hash);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed revocation ledger
// ---------------------------------------------------------------------------

/// One line of the revocation file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationRecord {
    pub hash: String,
    pub revoked_at: DateTime<Utc>,
}

struct LedgerFile {
    file: File,
    revoked: HashSet<String>,
}

/// Revocation ledger persisted as JSON lines, one [`RevocationRecord`] per
/// burned envelope. The file is append-only; existing lines are loaded on
/// open. Unparseable lines are skipped with a warning rather than failing
/// the whole ledger.
pub struct FileRevocationLedger {
    inner: Mutex<LedgerFile>,
}

impl FileRevocationLedger {
    /// Open or create the ledger file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let mut revoked = HashSet::new();
        for (index, line) in BufReader::new(&file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RevocationRecord>(&line) {
                Ok(record) => {
                    revoked.insert(record.hash);
                }
                Err(err) => tracing::warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %err,
                    "skipping unreadable revocation record"
                ),
            }
        }
        tracing::debug!(
            path = %path.display(),
            entries = revoked.len(),
            "revocation ledger loaded"
        );

        Ok(Self {
            inner: Mutex::new(LedgerFile { file, revoked }),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.revoked.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RevocationLedger for FileRevocationLedger {
    fn is_revoked(&self, hash: &str) -> Result<bool, EnvelopeError> {
        Ok(lock(&self.inner)?.revoked.contains(hash))
    }

    fn revoke(&self, hash: &str) -> Result<(), EnvelopeError> {
        let mut inner = lock(&self.inner)?;
        if inner.revoked.contains(hash) {
            return Ok(());
        }

        let record = RevocationRecord {
            hash: hash.to_string(),
            revoked_at: Utc::now(),
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| EnvelopeError::Store(e.to_string()))?;
        writeln!(inner.file, "{line}")
            .and_then(|()| inner.file.flush())
            .map_err(|e| EnvelopeError::Store(e.to_string()))?;

        // Only remember the hash once it is durable.
        inner.revoked.insert(record.hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_ledger_is_idempotent() {
        let ledger = MemoryRevocationLedger::new();
        assert!(!ledger.is_revoked("h").unwrap());
        ledger.revoke("h").unwrap();
        ledger.revoke("h").unwrap();
        assert!(ledger.is_revoked("h").unwrap());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_attempt_counter_floors_at_zero() {
        let counter = MemoryAttemptCounter::new();
        assert_eq!(counter.remaining("c", 2).unwrap(), 2);
        counter.record_failure("c", 2).unwrap();
        assert_eq!(counter.remaining("c", 2).unwrap(), 1);
        counter.record_failure("c", 2).unwrap();
        counter.record_failure("c", 2).unwrap();
        assert_eq!(counter.remaining("c", 2).unwrap(), 0);

        counter.reset("c").unwrap();
        assert_eq!(counter.remaining("c", 2).unwrap(), 2);
    }

    #[test]
    fn test_attempt_counter_never_exceeds_cap() {
        let counter = MemoryAttemptCounter::new();
        counter.record_failure("c", 1000).unwrap();
        assert_eq!(counter.remaining("c", 1000).unwrap(), 999);
        assert_eq!(counter.remaining("c", 2).unwrap(), 2);

        counter.record_failure("c", 2).unwrap();
        assert_eq!(counter.remaining("c", 2).unwrap(), 1);
    }

    #[test]
    fn test_attempt_counter_keys_are_independent() {
        let counter = MemoryAttemptCounter::new();
        counter.record_failure("a", 3).unwrap();
        assert_eq!(counter.remaining("a", 3).unwrap(), 2);
        assert_eq!(counter.remaining("b", 3).unwrap(), 3);
    }

    #[test]
    fn test_file_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revoked.jsonl");

        {
            let ledger = FileRevocationLedger::open(&path).unwrap();
            ledger.revoke("burned").unwrap();
            ledger.revoke("burned").unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);

        let reopened = FileRevocationLedger::open(&path).unwrap();
        assert!(reopened.is_revoked("burned").unwrap());
        assert!(!reopened.is_revoked("fresh").unwrap());
    }

    #[test]
    fn test_file_ledger_skips_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revoked.jsonl");
        std::fs::write(
            &path,
            "not json\n{\"hash\":\"kept\",\"revoked_at\":\"2026-01-01T00:00:00Z\"}\n\n",
        )
        .unwrap();

        let ledger = FileRevocationLedger::open(&path).unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(ledger.is_revoked("kept").unwrap());
    }
}
