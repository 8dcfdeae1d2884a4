//! X.509 certificate wrapper and strength policy

use crate::crypto::MIN_RSA_KEY_BITS;
use crate::error::{Error, Result};
use rsa::RsaPublicKey;
use rsa::traits::PublicKeyParts;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::referenced::OwnedToRef;
use x509_cert::der::{Decode, DecodePem, Encode};

/// sha1WithRSAEncryption
const OID_SHA1_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
/// Legacy OIW sha1WithRSASignature
const OID_SHA1_RSA_OIW: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.29");
/// dsa-with-sha1
const OID_SHA1_DSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10040.4.3");
/// ecdsa-with-SHA1
const OID_SHA1_ECDSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");

/// An X.509 certificate identifying a recipient or a signer
///
/// The wrapper keeps the original DER encoding: certificate identity is
/// DER-byte equality, and the same bytes are embedded into documents
/// (delivery data, signature key-info) without re-encoding.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    parsed: x509_cert::Certificate,
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Certificate {
    /// Parse a certificate from DER bytes
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let parsed = x509_cert::Certificate::from_der(der)
            .map_err(|e| Error::ParseError(format!("Invalid X.509 certificate: {}", e)))?;
        Ok(Self {
            der: der.to_vec(),
            parsed,
        })
    }

    /// Parse a certificate from PEM text
    pub fn from_pem(pem: &str) -> Result<Self> {
        let parsed = x509_cert::Certificate::from_pem(pem.as_bytes())
            .map_err(|e| Error::ParseError(format!("Invalid PEM certificate: {}", e)))?;
        // DER is canonical, so re-encoding reproduces the original bytes
        // and identity comparison stays encoding-independent
        let der = parsed
            .to_der()
            .map_err(|e| Error::ParseError(format!("Invalid certificate encoding: {}", e)))?;
        Ok(Self { der, parsed })
    }

    /// The certificate's DER encoding
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The certificate subject, for diagnostics
    pub fn subject(&self) -> String {
        self.parsed.tbs_certificate.subject.to_string()
    }

    /// Extract the RSA public key
    ///
    /// Fails with a weak-certificate error for non-RSA keys; nothing else
    /// in this crate can use them.
    pub fn rsa_public_key(&self) -> Result<RsaPublicKey> {
        RsaPublicKey::try_from(
            self.parsed
                .tbs_certificate
                .subject_public_key_info
                .owned_to_ref(),
        )
        .map_err(|_| {
            Error::WeakCertificate(format!(
                "Certificate '{}' does not carry an RSA public key",
                self.subject()
            ))
        })
    }

    /// Enforce the certificate strength policy
    ///
    /// The policy is checked before any cryptographic call involving the
    /// certificate: the key must be RSA with a modulus of at least
    /// [`MIN_RSA_KEY_BITS`], and the certificate itself must not be signed
    /// with SHA-1.
    pub fn validate_strength(&self) -> Result<()> {
        let key = self.rsa_public_key()?;
        let bits = key.n().bits();
        if bits < MIN_RSA_KEY_BITS {
            return Err(Error::WeakCertificate(format!(
                "Certificate '{}' has a {}-bit RSA key; the minimum is {} bits",
                self.subject(),
                bits,
                MIN_RSA_KEY_BITS
            )));
        }

        let sig_oid = self.parsed.signature_algorithm.oid;
        if sig_oid == OID_SHA1_RSA
            || sig_oid == OID_SHA1_RSA_OIW
            || sig_oid == OID_SHA1_DSA
            || sig_oid == OID_SHA1_ECDSA
        {
            return Err(Error::WeakCertificate(format!(
                "Certificate '{}' is signed with SHA-1, which is not accepted",
                self.subject()
            )));
        }
        Ok(())
    }
}
