//! Envelope encryption tests: recipients, wrapped secrets, opportunistic
//! decryption, and the recipient/content-key coupling rules

mod common;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use common::*;
use cpix::{ContentKey, DecryptionKey, Document, Error, Recipient};
use uuid::Uuid;

#[test]
fn test_values_encrypted_when_recipient_present() {
    let kid = Uuid::new_v4();
    let mut document = document_with_key(kid);
    document
        .add_recipient(Recipient::new(certificate_a()))
        .unwrap();
    let buffer = save_to_vec(&mut document);
    let text = String::from_utf8(buffer).unwrap();

    assert!(text.contains("DeliveryData"));
    assert!(text.contains("EncryptedValue"));
    assert!(text.contains("ValueMAC"));
    assert!(!text.contains("PlainValue"));
    // the plaintext key bytes must not appear anywhere in the output
    assert!(!text.contains(&BASE64.encode(key_bytes(1))));
}

#[test]
fn test_either_recipient_can_decrypt() {
    let kid = Uuid::new_v4();
    let mut document = document_with_key(kid);
    document
        .add_recipient(Recipient::new(certificate_a()))
        .unwrap();
    document
        .add_recipient(Recipient::new(certificate_b()))
        .unwrap();
    let buffer = save_to_vec(&mut document);

    let with_a = Document::load(buffer.as_slice(), &[decryption_key_a()]).unwrap();
    let with_b = Document::load(buffer.as_slice(), &[decryption_key_b()]).unwrap();

    assert!(with_a.content_keys_readable());
    assert!(with_b.content_keys_readable());
    let value_a = with_a.content_keys().get(0).unwrap().value.clone().unwrap();
    let value_b = with_b.content_keys().get(0).unwrap().value.clone().unwrap();
    assert_eq!(value_a, value_b);
    assert_eq!(value_a, key_bytes(1));
}

#[test]
fn test_load_without_private_key_leaves_values_absent() {
    let kid = Uuid::new_v4();
    let mut document = document_with_key(kid);
    document
        .add_recipient(Recipient::new(certificate_a()))
        .unwrap();
    let buffer = save_to_vec(&mut document);

    // no keys at all
    let blind = Document::load(buffer.as_slice(), &[]).unwrap();
    assert!(!blind.content_keys_readable());
    assert!(blind.content_keys().get(0).unwrap().value.is_none());
    // the rest of the document still loaded
    assert_eq!(blind.usage_rules().len(), 1);

    // a key for a certificate that is not a recipient
    let wrong = Document::load(
        buffer.as_slice(),
        &[DecryptionKey::new(certificate_c(), private_key_c()).unwrap()],
    )
    .unwrap();
    assert!(!wrong.content_keys_readable());
    assert!(wrong.content_keys().get(0).unwrap().value.is_none());
}

#[test]
fn test_no_recipients_stores_plaintext() {
    let kid = Uuid::new_v4();
    let mut document = document_with_key(kid);
    let buffer = save_to_vec(&mut document);
    let text = String::from_utf8(buffer.clone()).unwrap();
    assert!(text.contains("PlainValue"));
    assert!(!text.contains("DeliveryData"));

    let reloaded = Document::load(buffer.as_slice(), &[]).unwrap();
    assert!(reloaded.content_keys_readable());
    assert_eq!(
        reloaded.content_keys().get(0).unwrap().value.as_deref(),
        Some(key_bytes(1).as_slice())
    );
}

#[test]
fn test_adding_recipient_to_loaded_plaintext_keys_is_rejected() {
    let kid = Uuid::new_v4();
    let mut document = document_with_key(kid);
    let buffer = save_to_vec(&mut document);

    let mut reloaded = Document::load(buffer.as_slice(), &[]).unwrap();
    let result = reloaded.add_recipient(Recipient::new(certificate_a()));
    assert!(matches!(result, Err(Error::IllegalState(_))));

    // re-adding the keys signals intent, after which the recipient is
    // accepted and the output is encrypted
    let key = reloaded.content_keys().get(0).unwrap().clone();
    reloaded.remove_content_key(&key).unwrap();
    reloaded
        .add_content_key(ContentKey::with_value(kid, key_bytes(1)))
        .unwrap();
    reloaded
        .add_recipient(Recipient::new(certificate_a()))
        .unwrap();

    let buffer = save_to_vec(&mut reloaded);
    let text = String::from_utf8(buffer.clone()).unwrap();
    assert!(text.contains("EncryptedValue"));
    assert!(!text.contains("PlainValue"));

    let decrypted = Document::load(buffer.as_slice(), &[decryption_key_a()]).unwrap();
    assert_eq!(
        decrypted.content_keys().get(0).unwrap().value.as_deref(),
        Some(key_bytes(1).as_slice())
    );
}

#[test]
fn test_removing_last_recipient_with_encrypted_keys_fails_at_save() {
    let kid = Uuid::new_v4();
    let mut document = document_with_key(kid);
    document
        .add_recipient(Recipient::new(certificate_a()))
        .unwrap();
    let buffer = save_to_vec(&mut document);

    let mut reloaded = Document::load(buffer.as_slice(), &[decryption_key_a()]).unwrap();
    let recipient = reloaded.recipients().get(0).unwrap().clone();
    // removal itself succeeds; the inconsistency is detected at save time
    reloaded.remove_recipient(&recipient).unwrap();

    let mut sink = Vec::new();
    let result = reloaded.save(&mut sink);
    assert!(matches!(result, Err(Error::IllegalState(_))));
    assert!(sink.is_empty());
}

#[test]
fn test_new_keys_cannot_be_encrypted_without_recovered_secrets() {
    let kid = Uuid::new_v4();
    let mut document = document_with_key(kid);
    document
        .add_recipient(Recipient::new(certificate_a()))
        .unwrap();
    let buffer = save_to_vec(&mut document);

    // load without the private key, then try to add new key material
    let mut blind = Document::load(buffer.as_slice(), &[]).unwrap();
    blind
        .add_content_key(ContentKey::with_value(Uuid::new_v4(), key_bytes(7)))
        .unwrap();
    let mut sink = Vec::new();
    assert!(matches!(blind.save(&mut sink), Err(Error::IllegalState(_))));
}

#[test]
fn test_weak_recipient_certificates_rejected() {
    let mut document = Document::new();

    let too_small = Recipient::new(certificate_small());
    assert!(matches!(
        document.add_recipient(too_small),
        Err(Error::WeakCertificate(_))
    ));

    let sha1_signed = Recipient::new(certificate_sha1());
    assert!(matches!(
        document.add_recipient(sha1_signed),
        Err(Error::WeakCertificate(_))
    ));
}

#[test]
fn test_decryption_key_pairing_is_checked() {
    // certificate A with key B is not a valid pair
    assert!(DecryptionKey::new(certificate_a(), private_key_b()).is_err());
    // weak certificates are rejected even with the right key
    assert!(DecryptionKey::new(certificate_small(), private_key_small()).is_err());
}

#[test]
fn test_tampered_ciphertext_leaves_value_absent() {
    let kid = Uuid::new_v4();
    let mut document = document_with_key(kid);
    document
        .add_recipient(Recipient::new(certificate_a()))
        .unwrap();
    let buffer = save_to_vec(&mut document);
    let text = String::from_utf8(buffer).unwrap();

    // corrupt the stored MAC so the authentication tag no longer verifies
    let start = text.find("<pskc:ValueMAC>").unwrap() + "<pskc:ValueMAC>".len();
    let mut tampered = text.clone();
    let replacement = if &text[start..start + 1] == "A" { "B" } else { "A" };
    tampered.replace_range(start..start + 1, replacement);

    let reloaded = Document::load(tampered.as_bytes(), &[decryption_key_a()]).unwrap();
    // the document loads, but the unauthenticated value is not exposed
    assert!(reloaded.content_keys().get(0).unwrap().value.is_none());
}
