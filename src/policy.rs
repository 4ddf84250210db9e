//! Per-message policy: option strings, parsed policy, and the collaborator
//! traits the engine consults around every decryption.
//!
//! Options are free-form strings carried verbatim in the envelope (and bound
//! into the AAD). Three of them mean something here:
//!
//! | option              | effect                                              |
//! |---------------------|-----------------------------------------------------|
//! | `single-use`        | revoke the envelope after its first successful open |
//! | `ttl_hours=<N>`     | vanish N hours after creation                       |
//! | `ttl_on_open=true`  | start the TTL at first open instead of creation     |
//!
//! Unknown options are preserved and ignored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::envelope::EnvelopeMessage;
use crate::error::EnvelopeError;
use crate::scheme::Scheme;

pub const OPTION_SINGLE_USE: &str = "single-use";
pub const OPTION_TTL_HOURS_PREFIX: &str = "ttl_hours=";
pub const OPTION_TTL_ON_OPEN: &str = "ttl_on_open=true";

// ---------------------------------------------------------------------------
// Option builder
// ---------------------------------------------------------------------------

/// Builds an option list in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageOptions {
    options: Vec<String>,
}

impl MessageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single_use(mut self) -> Self {
        self.options.push(OPTION_SINGLE_USE.to_string());
        self
    }

    pub fn ttl_hours(mut self, hours: u32) -> Self {
        self.options.push(format!("{OPTION_TTL_HOURS_PREFIX}{hours}"));
        self
    }

    pub fn ttl_on_open(mut self) -> Self {
        self.options.push(OPTION_TTL_ON_OPEN.to_string());
        self
    }

    /// Append an option string the engine does not interpret.
    pub fn raw(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    pub fn into_vec(self) -> Vec<String> {
        self.options
    }
}

impl From<MessageOptions> for Vec<String> {
    fn from(options: MessageOptions) -> Self {
        options.into_vec()
    }
}

// ---------------------------------------------------------------------------
// Parsed policy
// ---------------------------------------------------------------------------

/// Behaviour derived from a message's options and attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePolicy {
    pub single_use: bool,
    pub ttl_hours: Option<u32>,
    pub ttl_on_open: bool,
    /// `0` means unlimited.
    pub max_attempts: u32,
}

impl MessagePolicy {
    pub fn from_options(options: &[String], max_attempts: u32) -> Self {
        let ttl_hours = options.iter().find_map(|option| {
            option
                .strip_prefix(OPTION_TTL_HOURS_PREFIX)
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|&n| n > 0)
        });

        Self {
            single_use: options.iter().any(|o| o == OPTION_SINGLE_USE),
            ttl_hours,
            ttl_on_open: options.iter().any(|o| o == OPTION_TTL_ON_OPEN),
            max_attempts,
        }
    }

    pub fn has_attempt_cap(&self) -> bool {
        self.max_attempts != 0
    }

    /// When the message should vanish.
    ///
    /// `None` if there is no TTL, or if the countdown starts at first open
    /// and the message has not been opened yet.
    pub fn expires_at(
        &self,
        created_at: DateTime<Utc>,
        first_opened_at: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let hours = self.ttl_hours?;
        let start = if self.ttl_on_open {
            first_opened_at?
        } else {
            created_at
        };
        start.checked_add_signed(Duration::hours(i64::from(hours)))
    }

    pub fn is_expired(
        &self,
        now: DateTime<Utc>,
        created_at: DateTime<Utc>,
        first_opened_at: Option<DateTime<Utc>>,
    ) -> bool {
        self.expires_at(created_at, first_opened_at)
            .is_some_and(|deadline| now >= deadline)
    }
}

// ---------------------------------------------------------------------------
// Ledger keys
// ---------------------------------------------------------------------------

/// Revocation ledger key for an envelope string (trimmed before hashing).
///
/// Only used as-is for input no scheme can decode. Decodable input is keyed
/// by [`message_digest`].
pub fn envelope_digest(envelope: &str) -> String {
    crypto::sha256_hex(envelope.trim().as_bytes())
}

/// Revocation ledger key for a decoded message: the digest of its canonical
/// envelope string as `scheme` would emit it.
///
/// The decoder accepts several spellings of one message (missing padding,
/// byte arrays, reformatted JSON). They all share this key. For an envelope
/// produced by [`crate::Engine::encrypt`] it equals
/// `envelope_digest(envelope)`.
pub fn message_digest(
    scheme: &dyn Scheme,
    message: &EnvelopeMessage,
) -> Result<String, EnvelopeError> {
    Ok(envelope_digest(&scheme.encode(message)?))
}

/// Attempt counter key for a capped message: its ciphertext together with
/// the cap it was sealed under. An envelope whose cap has been edited gets
/// a budget of its own and never touches the original's.
pub fn attempt_digest(ciphertext: &[u8], max_attempts: u32) -> String {
    let mut keyed = Vec::with_capacity(ciphertext.len() + 4);
    keyed.extend_from_slice(ciphertext);
    keyed.extend_from_slice(&max_attempts.to_be_bytes());
    crypto::sha256_hex(&keyed)
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Store of burned envelope digests. Revocation is monotonic: once a digest
/// is in, it never comes out through this interface. `revoke` must be
/// idempotent.
pub trait RevocationLedger: Send + Sync {
    fn is_revoked(&self, hash: &str) -> Result<bool, EnvelopeError>;
    fn revoke(&self, hash: &str) -> Result<(), EnvelopeError>;
}

/// Remaining-attempt bookkeeping for capped messages.
///
/// Implementations make each call atomic per `hash`. A hash with no record
/// has `max` attempts remaining, and a stored count never reads above `max`.
pub trait AttemptCounter: Send + Sync {
    fn remaining(&self, hash: &str, max: u32) -> Result<u32, EnvelopeError>;
    /// Spend one attempt, flooring at zero.
    fn record_failure(&self, hash: &str, max: u32) -> Result<(), EnvelopeError>;
    fn reset(&self, hash: &str) -> Result<(), EnvelopeError>;
}
