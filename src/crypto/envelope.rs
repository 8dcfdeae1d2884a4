//! Envelope encryption of content keys
//!
//! Each document owns at most one 256-bit document key and one 512-bit MAC
//! key. They are generated from the operating system's secure random source
//! the first time a save needs them, or imported on load by unwrapping a
//! delivery-data entry with a matching private key. For every recipient both
//! secrets are wrapped individually with the recipient's RSA public key
//! (OAEP, SHA-1 mask), so any one recipient can recover them.
//!
//! Content-key values are encrypted with AES-256-CBC under the document key
//! with a fresh random IV per key, stored as `IV || ciphertext`, and
//! authenticated with HMAC-SHA-512 over that same stored field under the
//! MAC key. CBC is not an authenticating mode; the separate MAC compensates
//! (encrypt-then-MAC).

use crate::crypto::certificate::Certificate;
use crate::crypto::{CONTENT_KEY_IV_LENGTH, DOCUMENT_KEY_LENGTH, MAC_KEY_LENGTH};
use crate::error::{Error, Result};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey};
use sha1::Sha1;
use sha2::Sha512;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha512 = Hmac<Sha512>;

/// The document-wide symmetric secrets
#[derive(Clone)]
pub(crate) struct DocumentSecrets {
    pub document_key: [u8; DOCUMENT_KEY_LENGTH],
    pub mac_key: [u8; MAC_KEY_LENGTH],
}

impl std::fmt::Debug for DocumentSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // key material stays out of debug output
        f.debug_struct("DocumentSecrets").finish_non_exhaustive()
    }
}

impl DocumentSecrets {
    /// Generate fresh secrets from the secure random source
    pub fn generate() -> Self {
        let mut document_key = [0u8; DOCUMENT_KEY_LENGTH];
        let mut mac_key = [0u8; MAC_KEY_LENGTH];
        OsRng.fill_bytes(&mut document_key);
        OsRng.fill_bytes(&mut mac_key);
        Self {
            document_key,
            mac_key,
        }
    }

    /// Reconstruct secrets from unwrapped bytes, validating lengths
    pub fn from_unwrapped(document_key: Vec<u8>, mac_key: Vec<u8>) -> Result<Self> {
        let document_key: [u8; DOCUMENT_KEY_LENGTH] =
            document_key.try_into().map_err(|v: Vec<u8>| {
                Error::InvalidData(format!(
                    "Unwrapped document key is {} bytes; expected {}",
                    v.len(),
                    DOCUMENT_KEY_LENGTH
                ))
            })?;
        let mac_key: [u8; MAC_KEY_LENGTH] = mac_key.try_into().map_err(|v: Vec<u8>| {
            Error::InvalidData(format!(
                "Unwrapped MAC key is {} bytes; expected {}",
                v.len(),
                MAC_KEY_LENGTH
            ))
        })?;
        Ok(Self {
            document_key,
            mac_key,
        })
    }
}

/// The per-recipient wrapped form of the document secrets
#[derive(Debug, Clone)]
pub(crate) struct WrappedSecrets {
    pub document_key: Vec<u8>,
    pub mac_key: Vec<u8>,
}

/// Wrap both secrets for one recipient
pub(crate) fn wrap_secrets(
    recipient: &Certificate,
    secrets: &DocumentSecrets,
) -> Result<WrappedSecrets> {
    let public_key = recipient.rsa_public_key()?;
    let document_key = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), &secrets.document_key)
        .map_err(|e| Error::Crypto(format!("Failed to wrap document key: {}", e)))?;
    let mac_key = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), &secrets.mac_key)
        .map_err(|e| Error::Crypto(format!("Failed to wrap MAC key: {}", e)))?;
    Ok(WrappedSecrets {
        document_key,
        mac_key,
    })
}

/// Unwrap both secrets with a recipient's private key
pub(crate) fn unwrap_secrets(
    private_key: &RsaPrivateKey,
    wrapped: &WrappedSecrets,
) -> Result<DocumentSecrets> {
    let document_key = private_key
        .decrypt(Oaep::new::<Sha1>(), &wrapped.document_key)
        .map_err(|e| Error::Crypto(format!("Failed to unwrap document key: {}", e)))?;
    let mac_key = private_key
        .decrypt(Oaep::new::<Sha1>(), &wrapped.mac_key)
        .map_err(|e| Error::Crypto(format!("Failed to unwrap MAC key: {}", e)))?;
    DocumentSecrets::from_unwrapped(document_key, mac_key)
}

/// Encrypt a content-key value, returning `(IV || ciphertext, mac)`
pub(crate) fn encrypt_content_key(
    secrets: &DocumentSecrets,
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut iv = [0u8; CONTENT_KEY_IV_LENGTH];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new(&secrets.document_key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut payload = iv.to_vec();
    payload.extend_from_slice(&ciphertext);

    let mac = compute_mac(secrets, &payload)?;
    Ok((payload, mac))
}

/// Decrypt a stored `IV || ciphertext` content-key field
///
/// The caller is expected to have verified the authentication tag first;
/// this function only performs the cipher operation.
pub(crate) fn decrypt_content_key(secrets: &DocumentSecrets, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() <= CONTENT_KEY_IV_LENGTH {
        return Err(Error::Crypto(format!(
            "Encrypted content key is {} bytes; too short to contain an IV and ciphertext",
            payload.len()
        )));
    }
    let (iv, ciphertext) = payload.split_at(CONTENT_KEY_IV_LENGTH);
    let iv: [u8; CONTENT_KEY_IV_LENGTH] = iv.try_into().expect("split length is fixed");

    Aes256CbcDec::new(&secrets.document_key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| Error::Crypto(format!("Failed to decrypt content key: {}", e)))
}

/// HMAC-SHA-512 over the stored ciphertext field
pub(crate) fn compute_mac(secrets: &DocumentSecrets, payload: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha512::new_from_slice(&secrets.mac_key)
        .map_err(|e| Error::Crypto(format!("Invalid MAC key: {}", e)))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify a stored authentication tag
pub(crate) fn verify_mac(secrets: &DocumentSecrets, payload: &[u8], tag: &[u8]) -> bool {
    let mut mac = match HmacSha512::new_from_slice(&secrets.mac_key) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(tag).is_ok()
}

/// A recipient certificate together with its private key, used to recover
/// the document secrets while loading
#[derive(Clone)]
pub struct DecryptionKey {
    certificate: Certificate,
    private_key: RsaPrivateKey,
}

impl DecryptionKey {
    /// Pair a certificate with its private key
    ///
    /// Fails when the private key does not belong to the certificate or the
    /// certificate violates the strength policy.
    pub fn new(certificate: Certificate, private_key: RsaPrivateKey) -> Result<Self> {
        certificate.validate_strength()?;
        if certificate.rsa_public_key()? != private_key.to_public_key() {
            return Err(Error::Crypto(format!(
                "Private key does not match certificate '{}'",
                certificate.subject()
            )));
        }
        Ok(Self {
            certificate,
            private_key,
        })
    }

    /// The certificate half of the pair
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("certificate", &self.certificate.subject())
            .finish_non_exhaustive()
    }
}
