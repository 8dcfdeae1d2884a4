//! Recipient entity

use crate::crypto::Certificate;

/// An authorized holder of the document's content keys
///
/// Each recipient is identified by an X.509 certificate; saving a document
/// with recipients wraps the document-wide secrets for every one of them,
/// so any recipient's private key can later recover the content keys.
///
/// The certificate must carry an RSA key of at least the minimum bit length
/// and must not be signed with a deprecated digest; this is enforced when
/// the recipient is added and again when a document is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// The recipient's certificate
    pub certificate: Certificate,
}

impl Recipient {
    /// Create a recipient from a certificate
    pub fn new(certificate: Certificate) -> Self {
        Self { certificate }
    }
}
