//! Engine configuration.
//!
//! ```json
//! {
//!   "revocation_ledger": "/data/bce/revoked.jsonl",
//!   "audit_log": "/data/bce/audit.jsonl",
//!   "audit_capacity": 512
//! }
//! ```
//!
//! Every field is optional. With no ledger path the engine keeps revocations
//! in memory only.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audit::AuditLog;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Persist revocations to this JSON-lines file.
    pub revocation_ledger: Option<PathBuf>,
    /// Mirror every audit record to this JSON-lines file.
    pub audit_log: Option<PathBuf>,
    /// Records kept in the in-memory audit log.
    pub audit_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            revocation_ledger: None,
            audit_log: None,
            audit_capacity: AuditLog::DEFAULT_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
