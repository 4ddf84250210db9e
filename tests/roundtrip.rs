mod common;

use bcenvelope::policy::MessageOptions;
use bcenvelope::{Engine, Ikm, MessageMetadata};

#[test]
fn test_hello_alice_end_to_end() {
    let engine = Engine::in_memory();
    let ikm = Ikm::from_barcode("QR123");
    let metadata = MessageMetadata::new("Alice", 1);

    let sealed = engine.encrypt(b"hello", &ikm, &metadata).unwrap();
    assert!(sealed.starts_with("~BCEv4~"));

    let opened = engine.decrypt(&sealed, &ikm).unwrap();
    assert_eq!(opened.plaintext, b"hello");
    assert_eq!(opened.key_name(), "Alice");
    assert_eq!(opened.counter(), 1);
    assert_eq!(opened.max_attempts(), 0);
    assert!(!opened.single_use());
    assert_eq!(opened.ttl_hours(), None);
    assert!(!opened.ttl_on_open());
}

#[test]
fn test_metadata_carried_through() {
    let engine = Engine::in_memory();
    let ikm = Ikm::from_barcodes(&["QR123", "EAN-4006381333931"], Some("pin"));
    let options = MessageOptions::new()
        .ttl_hours(6)
        .ttl_on_open()
        .raw("theme=dark");
    let metadata = MessageMetadata::new("Bob", 42)
        .with_options(options)
        .with_max_attempts(5);

    let sealed = engine.encrypt("grüße".as_bytes(), &ikm, &metadata).unwrap();
    let opened = engine.decrypt(&sealed, &ikm).unwrap();

    assert_eq!(opened.text(), Some("grüße"));
    assert_eq!(opened.metadata, metadata);
    assert_eq!(opened.ttl_hours(), Some(6));
    assert!(opened.ttl_on_open());
    assert_eq!(opened.max_attempts(), 5);
}

#[test]
fn test_empty_plaintext() {
    let engine = Engine::in_memory();
    let ikm = Ikm::from_barcode("QR123");
    let sealed = engine
        .encrypt(b"", &ikm, &MessageMetadata::new("Alice", 0))
        .unwrap();
    assert!(engine.decrypt(&sealed, &ikm).unwrap().plaintext.is_empty());
}

#[test]
fn test_identical_inputs_give_different_envelopes() {
    let engine = Engine::in_memory();
    let ikm = Ikm::from_barcode("QR123");
    let metadata = MessageMetadata::new("Alice", 1);

    let a = engine.encrypt(b"hello", &ikm, &metadata).unwrap();
    let b = engine.encrypt(b"hello", &ikm, &metadata).unwrap();
    assert_ne!(a, b);

    let (ma, mb) = (common::unpack(&a), common::unpack(&b));
    assert_ne!(ma.salt, mb.salt);
    assert_ne!(ma.ciphertext, mb.ciphertext);
}

#[test]
fn test_scanned_text_with_trailing_newline() {
    let engine = Engine::in_memory();
    let ikm = Ikm::from_barcode("QR123");
    let sealed = engine
        .encrypt(b"hi", &ikm, &MessageMetadata::new("Alice", 3))
        .unwrap();
    let scanned = format!("{sealed}\r\n");
    assert_eq!(engine.decrypt(&scanned, &ikm).unwrap().plaintext, b"hi");
}
