//! Minimal example: a burn-after-reading message between two contacts.
//!
//! Demonstrates single-use revocation and the audit trail with file
//! persistence. Run with: `cargo run --example single_use_demo`
//!
//! - Alice and Bob share a contact key built from two scanned barcodes
//! - Alice seals a single-use message with a 24 hour TTL that starts on open
//! - Bob opens it once; a second open is refused
//! - The revocation ledger and audit trail are written to temp files

use bcenvelope::{Engine, EngineConfig, Ikm, MessageMetadata, MessageOptions};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Setup
    let dir = std::env::temp_dir();
    let config = EngineConfig {
        revocation_ledger: Some(dir.join("bcenvelope_revoked.jsonl")),
        audit_log: Some(dir.join("bcenvelope_audit.jsonl")),
        ..EngineConfig::default()
    };
    let engine = Engine::from_config(&config)?;

    // 2. Both sides scanned the same two codes and agreed on a password
    let alice_key = Ikm::from_barcodes(&["QR123", "EAN-4006381333931"], Some("tulip"));
    let bob_key = Ikm::from_barcodes(&["QR123", "EAN-4006381333931"], Some("tulip"));

    // 3. Alice seals
    let metadata = MessageMetadata::new("Bob", 17).with_options(
        MessageOptions::new()
            .single_use()
            .ttl_hours(24)
            .ttl_on_open(),
    );
    let envelope = engine.encrypt(b"the spare key is under the mat", &alice_key, &metadata)?;
    println!("Envelope: {envelope}");

    // 4. Bob opens once
    let opened = engine.decrypt(&envelope, &bob_key)?;
    println!(
        "Bob reads: {:?} (ttl {:?}h, starts on open: {})",
        opened.text(),
        opened.ttl_hours(),
        opened.ttl_on_open()
    );

    // 5. A second open is refused
    match engine.decrypt(&envelope, &bob_key) {
        Ok(_) => println!("unexpected: message opened twice"),
        Err(err) => println!("Second open: {err}"),
    }

    // 6. Audit trail
    for record in engine.audit_records() {
        println!(
            "  {:?} {} @ {}",
            record.outcome,
            &record.envelope_hash[..12],
            record.timestamp
        );
    }
    if let Some(path) = &config.audit_log {
        println!("Full audit also written to: {}", path.display());
    }

    Ok(())
}
