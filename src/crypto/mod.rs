//! Cryptographic subsystem
//!
//! The algorithm set is fixed and non-negotiable:
//! - AES-256-CBC with PKCS#7 padding for content-key values
//! - RSA-OAEP (SHA-1 digest and MGF1) for wrapping the document secrets
//! - HMAC-SHA-512 for content-key authentication (encrypt-then-MAC)
//! - RSASSA-PKCS1-v1.5 with SHA-512 for all signatures
//!
//! Documents using any other algorithm fail with an unsupported-feature
//! error; no negotiation or fallback exists.

mod certificate;
pub(crate) mod envelope;
pub(crate) mod signature;

pub use certificate::Certificate;
pub use envelope::DecryptionKey;
pub use signature::Signer;

pub(crate) use envelope::{DocumentSecrets, WrappedSecrets};

/// Minimum RSA modulus length accepted for signing or recipiency
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Document key length: AES-256
pub(crate) const DOCUMENT_KEY_LENGTH: usize = 32;

/// MAC key length: HMAC-SHA-512
pub(crate) const MAC_KEY_LENGTH: usize = 64;

/// IV length for content-key encryption: AES block size
pub(crate) const CONTENT_KEY_IV_LENGTH: usize = 16;

/// Algorithm identifier for content-key and secret encryption
pub(crate) const AES256_CBC_URI: &str = "http://www.w3.org/2001/04/xmlenc#aes256-cbc";

/// Algorithm identifier for secret wrapping
pub(crate) const RSA_OAEP_MGF1P_URI: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";

/// Algorithm identifier for the content-key authentication tag
pub(crate) const HMAC_SHA512_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#hmac-sha512";

/// Signature method for all document and collection signatures
pub(crate) const RSA_SHA512_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

/// Digest method used inside signatures
pub(crate) const SHA512_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

/// Canonicalization method identifier written into signatures
pub(crate) const EXC_C14N_URI: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// Enveloped-signature transform identifier
pub(crate) const ENVELOPED_SIGNATURE_URI: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
