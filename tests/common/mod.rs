#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bcenvelope::audit::{AuditRecord, AuditSink};
use bcenvelope::envelope::{self, Decoded, EnvelopeMessage};

/// A sink that collects records into a shared Vec.
pub struct SharedVecSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl SharedVecSink {
    pub fn new(records: Arc<Mutex<Vec<AuditRecord>>>) -> Self {
        Self { records }
    }
}

impl AuditSink for SharedVecSink {
    fn append(&mut self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// Decode a v4 envelope that is known to be well formed.
pub fn unpack(sealed: &str) -> EnvelopeMessage {
    match envelope::decode(sealed).unwrap() {
        Decoded::Message(message) => message,
        Decoded::NotThisScheme => panic!("not a v4 envelope"),
    }
}

pub fn repack(message: &EnvelopeMessage) -> String {
    envelope::encode(message).unwrap()
}
