//! Versioned scheme dispatch.
//!
//! A scheme owns one header token and knows how to turn plaintext into an
//! envelope string and back. The [`SchemeRegistry`] holds an ordered list of
//! schemes: encryption always uses the current one, decryption picks whichever
//! scheme's header the input starts with. Headers are checked longest first
//! so that a token which happens to prefix another never shadows it.
//!
//! The registry is a plain value. Build one at startup (or in a test) and hand
//! it to the [`crate::Engine`].

use zeroize::Zeroize;

use crate::crypto;
use crate::envelope::{self, Decoded, EnvelopeMessage};
use crate::error::{EnvelopeError, Malformed};
use crate::keys::{self, Ikm};
use crate::policy::MessagePolicy;

/// Metadata supplied by the caller at encryption time and recovered at
/// decryption time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    pub key_name: String,
    /// Monotonic per-key counter, owned by the key store.
    pub counter: u64,
    pub options: Vec<String>,
    /// `0` means unlimited.
    pub max_attempts: u32,
}

impl MessageMetadata {
    pub fn new(key_name: impl Into<String>, counter: u64) -> Self {
        Self {
            key_name: key_name.into(),
            counter,
            options: Vec::new(),
            max_attempts: 0,
        }
    }

    pub fn with_options(mut self, options: impl Into<Vec<String>>) -> Self {
        self.options = options.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn policy(&self) -> MessagePolicy {
        MessagePolicy::from_options(&self.options, self.max_attempts)
    }
}

/// A successfully authenticated message.
///
/// Only constructed after the tag has verified. The plaintext is wiped when
/// the value is dropped.
pub struct DecryptedMessage {
    pub plaintext: Vec<u8>,
    pub metadata: MessageMetadata,
    pub policy: MessagePolicy,
}

impl DecryptedMessage {
    fn new(plaintext: Vec<u8>, metadata: MessageMetadata) -> Self {
        let policy = metadata.policy();
        Self {
            plaintext,
            metadata,
            policy,
        }
    }

    /// The plaintext as UTF-8, if it is.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.plaintext).ok()
    }

    pub fn key_name(&self) -> &str {
        &self.metadata.key_name
    }

    pub fn counter(&self) -> u64 {
        self.metadata.counter
    }

    pub fn max_attempts(&self) -> u32 {
        self.metadata.max_attempts
    }

    pub fn single_use(&self) -> bool {
        self.policy.single_use
    }

    pub fn ttl_hours(&self) -> Option<u32> {
        self.policy.ttl_hours
    }

    pub fn ttl_on_open(&self) -> bool {
        self.policy.ttl_on_open
    }
}

impl std::fmt::Debug for DecryptedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedMessage")
            .field("plaintext_len", &self.plaintext.len())
            .field("metadata", &self.metadata)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Drop for DecryptedMessage {
    fn drop(&mut self) {
        self.plaintext.zeroize();
    }
}

/// One envelope format version.
pub trait Scheme: Send + Sync {
    /// The exact leading token of this scheme's envelopes.
    fn header(&self) -> &str;

    /// Encrypt into a structured message.
    fn seal(
        &self,
        ikm: &Ikm,
        plaintext: &[u8],
        metadata: &MessageMetadata,
    ) -> Result<EnvelopeMessage, EnvelopeError>;

    /// Authenticate and decrypt a structured message.
    fn open(&self, ikm: &Ikm, message: &EnvelopeMessage) -> Result<Vec<u8>, EnvelopeError>;

    fn encode(&self, message: &EnvelopeMessage) -> Result<String, EnvelopeError>;

    fn decode(&self, input: &str) -> Result<Decoded, EnvelopeError>;
}

/// `~BCEv4~`: HKDF-SHA256 over a 16-byte salt, AES-256-GCM, JSON metadata
/// bound as AAD.
#[derive(Debug, Clone, Copy, Default)]
pub struct V4Scheme;

impl Scheme for V4Scheme {
    fn header(&self) -> &str {
        envelope::HEADER
    }

    fn seal(
        &self,
        ikm: &Ikm,
        plaintext: &[u8],
        metadata: &MessageMetadata,
    ) -> Result<EnvelopeMessage, EnvelopeError> {
        let salt = keys::generate_salt()?;
        let key = keys::derive_key(ikm, &salt)?;
        let mut message = EnvelopeMessage {
            salt: salt.to_vec(),
            ciphertext: Vec::new(),
            key_name: metadata.key_name.clone(),
            counter: metadata.counter,
            options: metadata.options.clone(),
            max_attempts: metadata.max_attempts,
        };
        let aad = message.associated_data()?;
        message.ciphertext = crypto::seal(key.as_bytes(), plaintext, &aad)?;
        Ok(message)
    }

    fn open(&self, ikm: &Ikm, message: &EnvelopeMessage) -> Result<Vec<u8>, EnvelopeError> {
        let salt: [u8; keys::SALT_LEN] = message
            .salt
            .as_slice()
            .try_into()
            .map_err(|_| EnvelopeError::malformed(Malformed::FieldLength))?;
        let key = keys::derive_key(ikm, &salt)?;
        let aad = message.associated_data()?;
        crypto::open(key.as_bytes(), &message.ciphertext, &aad)
    }

    fn encode(&self, message: &EnvelopeMessage) -> Result<String, EnvelopeError> {
        envelope::encode(message)
    }

    fn decode(&self, input: &str) -> Result<Decoded, EnvelopeError> {
        envelope::decode(input)
    }
}

/// Ordered header-token → scheme table.
pub struct SchemeRegistry {
    current: usize,
    /// Kept sorted by header length, longest first.
    schemes: Vec<Box<dyn Scheme>>,
}

impl std::fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeRegistry")
            .field("current", &self.current().header())
            .field(
                "headers",
                &self.schemes.iter().map(|s| s.header()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::new(Box::new(V4Scheme))
    }
}

impl SchemeRegistry {
    /// A registry whose current (encrypting) scheme is `current`.
    pub fn new(current: Box<dyn Scheme>) -> Self {
        Self {
            current: 0,
            schemes: vec![current],
        }
    }

    /// Add a decode-only scheme. A scheme with an already registered header
    /// replaces nothing and is ignored.
    pub fn register(mut self, scheme: Box<dyn Scheme>) -> Self {
        if self.schemes.iter().any(|s| s.header() == scheme.header()) {
            tracing::warn!(header = scheme.header(), "duplicate scheme header ignored");
            return self;
        }
        let current_header = self.current().header().to_string();
        self.schemes.push(scheme);
        // Stable sort keeps registration order among equal lengths.
        self.schemes
            .sort_by(|a, b| b.header().len().cmp(&a.header().len()));
        self.current = self
            .schemes
            .iter()
            .position(|s| s.header() == current_header)
            .unwrap_or(0);
        self
    }

    pub fn current(&self) -> &dyn Scheme {
        self.schemes[self.current].as_ref()
    }

    /// Headers in match order.
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.schemes.iter().map(|s| s.header())
    }

    /// The scheme whose header `input` starts with.
    pub fn select(&self, input: &str) -> Option<&dyn Scheme> {
        let input = input.trim_start();
        self.schemes
            .iter()
            .find(|s| input.starts_with(s.header()))
            .map(|s| s.as_ref())
    }

    /// Decode `input` with the scheme its header names.
    pub fn decode(&self, input: &str) -> Result<(&dyn Scheme, EnvelopeMessage), EnvelopeError> {
        let scheme = self
            .select(input)
            .ok_or(EnvelopeError::malformed(Malformed::UnknownHeader))?;
        match scheme.decode(input)? {
            Decoded::Message(message) => Ok((scheme, message)),
            Decoded::NotThisScheme => Err(EnvelopeError::malformed(Malformed::UnknownHeader)),
        }
    }

    /// Encrypt with the current scheme. No policy is applied.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        ikm: &Ikm,
        metadata: &MessageMetadata,
    ) -> Result<String, EnvelopeError> {
        let scheme = self.current();
        let message = scheme.seal(ikm, plaintext, metadata)?;
        scheme.encode(&message)
    }

    /// Decrypt with whichever scheme matches. No policy is applied.
    pub fn decrypt(&self, input: &str, ikm: &Ikm) -> Result<DecryptedMessage, EnvelopeError> {
        let (scheme, message) = self.decode(input)?;
        open_message(scheme, ikm, message)
    }
}

/// Authenticate `message` and lift it into a [`DecryptedMessage`].
pub(crate) fn open_message(
    scheme: &dyn Scheme,
    ikm: &Ikm,
    message: EnvelopeMessage,
) -> Result<DecryptedMessage, EnvelopeError> {
    let plaintext = scheme.open(ikm, &message)?;
    let metadata = MessageMetadata {
        key_name: message.key_name,
        counter: message.counter,
        options: message.options,
        max_attempts: message.max_attempts,
    };
    Ok(DecryptedMessage::new(plaintext, metadata))
}
