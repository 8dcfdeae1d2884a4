//! Shared fixtures for integration tests
//!
//! The certificates and keys are real, pre-generated test material
//! (RSA-2048 self-signed unless noted). They exist only for these tests
//! and must never be used outside them.

#![allow(dead_code)]

use cpix::{Certificate, ContentKey, DecryptionKey, Document, Signer, UsageRule};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use uuid::Uuid;

pub const CERT_A_PEM: &str = include_str!("../fixtures/cert_a.pem");
pub const KEY_A_PEM: &str = include_str!("../fixtures/key_a.pem");
pub const CERT_B_PEM: &str = include_str!("../fixtures/cert_b.pem");
pub const KEY_B_PEM: &str = include_str!("../fixtures/key_b.pem");
pub const CERT_C_PEM: &str = include_str!("../fixtures/cert_c.pem");
pub const KEY_C_PEM: &str = include_str!("../fixtures/key_c.pem");

/// RSA-1024, below the strength floor
pub const CERT_SMALL_PEM: &str = include_str!("../fixtures/cert_small.pem");
pub const KEY_SMALL_PEM: &str = include_str!("../fixtures/key_small.pem");
/// RSA-2048 but signed with SHA-1
pub const CERT_SHA1_PEM: &str = include_str!("../fixtures/cert_sha1.pem");
pub const KEY_SHA1_PEM: &str = include_str!("../fixtures/key_sha1.pem");

pub fn certificate_a() -> Certificate {
    Certificate::from_pem(CERT_A_PEM).expect("fixture certificate A parses")
}

pub fn certificate_b() -> Certificate {
    Certificate::from_pem(CERT_B_PEM).expect("fixture certificate B parses")
}

pub fn certificate_c() -> Certificate {
    Certificate::from_pem(CERT_C_PEM).expect("fixture certificate C parses")
}

pub fn certificate_small() -> Certificate {
    Certificate::from_pem(CERT_SMALL_PEM).expect("fixture 1024-bit certificate parses")
}

pub fn certificate_sha1() -> Certificate {
    Certificate::from_pem(CERT_SHA1_PEM).expect("fixture SHA-1 certificate parses")
}

pub fn private_key_a() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(KEY_A_PEM).expect("fixture key A parses")
}

pub fn private_key_b() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(KEY_B_PEM).expect("fixture key B parses")
}

pub fn private_key_c() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(KEY_C_PEM).expect("fixture key C parses")
}

pub fn private_key_small() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(KEY_SMALL_PEM).expect("fixture 1024-bit key parses")
}

pub fn private_key_sha1() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(KEY_SHA1_PEM).expect("fixture SHA-1 key parses")
}

pub fn signer_a() -> Signer {
    Signer::new(certificate_a(), private_key_a()).expect("fixture signer A is valid")
}

pub fn signer_b() -> Signer {
    Signer::new(certificate_b(), private_key_b()).expect("fixture signer B is valid")
}

pub fn decryption_key_a() -> DecryptionKey {
    DecryptionKey::new(certificate_a(), private_key_a()).expect("fixture pair A is valid")
}

pub fn decryption_key_b() -> DecryptionKey {
    DecryptionKey::new(certificate_b(), private_key_b()).expect("fixture pair B is valid")
}

/// A deterministic 16-byte key value derived from a seed byte
pub fn key_bytes(seed: u8) -> Vec<u8> {
    (0..16u8).map(|i| i.wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Save a document to a fresh buffer
pub fn save_to_vec(document: &mut Document) -> Vec<u8> {
    let mut buffer = Vec::new();
    document.save(&mut buffer).expect("save succeeds");
    buffer
}

/// A document with one valued content key and an unconditional rule for it
pub fn document_with_key(kid: Uuid) -> Document {
    let mut document = Document::new();
    document
        .add_content_key(ContentKey::with_value(kid, key_bytes(1)))
        .expect("key is valid");
    document
        .add_usage_rule(UsageRule::new(kid))
        .expect("rule is valid");
    document
}
