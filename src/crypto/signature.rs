//! XML digital signatures
//!
//! Signatures cover either the whole document (enveloped signature, empty
//! reference URI) or one container element addressed by its stable `id`
//! attribute. The signed bytes are the canonical form produced by
//! [`crate::canonical`]; the signature algorithm is RSASSA-PKCS1-v1.5 over
//! SHA-512 and the signer certificate travels inside `ds:KeyInfo`.
//!
//! There is no global algorithm registry: a [`Signer`] value carries the
//! certificate and private key explicitly, and the document applies it at
//! save time.

use crate::canonical::canonicalize;
use crate::crypto::certificate::Certificate;
use crate::crypto::{
    ENVELOPED_SIGNATURE_URI, EXC_C14N_URI, RSA_SHA512_URI, SHA512_URI,
};
use crate::error::{Error, Result};
use crate::model::XMLDSIG_NS;
use crate::xmltree::{NodeId, QName, XmlDocument};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha512};

/// A signing identity: certificate plus matching private key
///
/// Construction enforces the certificate strength policy and checks that
/// the private key actually belongs to the certificate, so a `Signer` that
/// exists can always sign.
#[derive(Clone)]
pub struct Signer {
    certificate: Certificate,
    private_key: RsaPrivateKey,
}

impl Signer {
    /// Pair a certificate with its private key
    pub fn new(certificate: Certificate, private_key: RsaPrivateKey) -> Result<Self> {
        certificate.validate_strength()?;
        if certificate.rsa_public_key()? != private_key.to_public_key() {
            return Err(Error::IllegalState(format!(
                "Private key does not match signer certificate '{}'",
                certificate.subject()
            )));
        }
        Ok(Self {
            certificate,
            private_key,
        })
    }

    /// The signer's certificate
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("certificate", &self.certificate.subject())
            .finish_non_exhaustive()
    }
}

/// A signature element present in the tree, with its verified signer
#[derive(Debug, Clone)]
pub(crate) struct AppliedSignature {
    pub node: NodeId,
    pub certificate: Certificate,
}

/// Sign one element, addressed by the `id` already set on it
///
/// Produces a `ds:Signature` appended to the root, referencing `#<id>`.
pub(crate) fn sign_element(
    doc: &mut XmlDocument,
    target: NodeId,
    reference_id: &str,
    signer: &Signer,
) -> Result<NodeId> {
    let digest = Sha512::digest(canonicalize(doc, target, &[])?);
    let reference_uri = format!("#{}", reference_id);
    build_and_sign(doc, &reference_uri, false, &digest, signer)
}

/// Sign the whole document with an enveloped signature
///
/// The digest covers the complete document minus the signature element
/// being produced; any already-applied collection signatures are covered.
pub(crate) fn sign_document(doc: &mut XmlDocument, signer: &Signer) -> Result<NodeId> {
    let digest = Sha512::digest(canonicalize(doc, doc.root(), &[])?);
    build_and_sign(doc, "", true, &digest, signer)
}

fn build_and_sign(
    doc: &mut XmlDocument,
    reference_uri: &str,
    enveloped: bool,
    digest: &[u8],
    signer: &Signer,
) -> Result<NodeId> {
    let ds = |local: &str| QName::new(Some("ds"), local);

    let signature = doc.create_element(ds("Signature"));
    if let Some(elem) = doc.element_mut(signature) {
        elem.namespaces
            .push((Some("ds".to_string()), XMLDSIG_NS.to_string()));
    }

    let signed_info = doc.create_element(ds("SignedInfo"));
    doc.append_child(signature, signed_info);

    let c14n_method = doc.create_element(ds("CanonicalizationMethod"));
    doc.set_attr(c14n_method, QName::new(None, "Algorithm"), EXC_C14N_URI);
    doc.append_child(signed_info, c14n_method);

    let sig_method = doc.create_element(ds("SignatureMethod"));
    doc.set_attr(sig_method, QName::new(None, "Algorithm"), RSA_SHA512_URI);
    doc.append_child(signed_info, sig_method);

    let reference = doc.create_element(ds("Reference"));
    doc.set_attr(reference, QName::new(None, "URI"), reference_uri);
    doc.append_child(signed_info, reference);

    let transforms = doc.create_element(ds("Transforms"));
    doc.append_child(reference, transforms);
    if enveloped {
        let transform = doc.create_element(ds("Transform"));
        doc.set_attr(
            transform,
            QName::new(None, "Algorithm"),
            ENVELOPED_SIGNATURE_URI,
        );
        doc.append_child(transforms, transform);
    }
    let c14n_transform = doc.create_element(ds("Transform"));
    doc.set_attr(c14n_transform, QName::new(None, "Algorithm"), EXC_C14N_URI);
    doc.append_child(transforms, c14n_transform);

    let digest_method = doc.create_element(ds("DigestMethod"));
    doc.set_attr(digest_method, QName::new(None, "Algorithm"), SHA512_URI);
    doc.append_child(reference, digest_method);

    let digest_value = doc.create_element(ds("DigestValue"));
    doc.set_text(digest_value, &BASE64.encode(digest));
    doc.append_child(reference, digest_value);

    let signature_value = doc.create_element(ds("SignatureValue"));
    doc.append_child(signature, signature_value);

    let key_info = doc.create_element(ds("KeyInfo"));
    let x509_data = doc.create_element(ds("X509Data"));
    let x509_cert = doc.create_element(ds("X509Certificate"));
    doc.set_text(x509_cert, &BASE64.encode(signer.certificate.der()));
    doc.append_child(x509_data, x509_cert);
    doc.append_child(key_info, x509_data);
    doc.append_child(signature, key_info);

    // The signature element has to be attached before SignedInfo is
    // canonicalized, so the in-scope ds declaration resolves the same way
    // it will at verification time.
    doc.append_child(doc.root(), signature);

    let signed_info_bytes = canonicalize(doc, signed_info, &[])?;
    let signed_info_digest = Sha512::digest(&signed_info_bytes);
    let signature_bytes = signer
        .private_key
        .sign(Pkcs1v15Sign::new::<Sha512>(), &signed_info_digest)
        .map_err(|e| Error::Crypto(format!("Failed to compute signature: {}", e)))?;
    doc.set_text(signature_value, &BASE64.encode(signature_bytes));

    Ok(signature)
}

/// Verify one `ds:Signature` element
///
/// Returns the embedded signer certificate and the reference URI on
/// success. Any structural defect, unknown algorithm, digest mismatch or
/// signature failure is an error; loading treats all of them as fatal for
/// the document.
pub(crate) fn verify_signature(
    doc: &XmlDocument,
    signature: NodeId,
) -> Result<(Certificate, String)> {
    let signed_info = doc
        .find_child(signature, XMLDSIG_NS, "SignedInfo")
        .ok_or_else(|| Error::invalid_xml_element("Signature", "Missing <SignedInfo>"))?;

    let c14n_method = doc
        .find_child(signed_info, XMLDSIG_NS, "CanonicalizationMethod")
        .and_then(|n| doc.attr(n, "Algorithm").map(str::to_string))
        .ok_or_else(|| {
            Error::invalid_xml_element("SignedInfo", "Missing <CanonicalizationMethod>")
        })?;
    if c14n_method != EXC_C14N_URI {
        return Err(Error::Unsupported(format!(
            "Canonicalization method '{}' is not supported",
            c14n_method
        )));
    }

    let sig_method = doc
        .find_child(signed_info, XMLDSIG_NS, "SignatureMethod")
        .and_then(|n| doc.attr(n, "Algorithm").map(str::to_string))
        .ok_or_else(|| Error::invalid_xml_element("SignedInfo", "Missing <SignatureMethod>"))?;
    if sig_method != RSA_SHA512_URI {
        return Err(Error::Unsupported(format!(
            "Signature method '{}' is not supported",
            sig_method
        )));
    }

    let reference = doc
        .find_child(signed_info, XMLDSIG_NS, "Reference")
        .ok_or_else(|| Error::invalid_xml_element("SignedInfo", "Missing <Reference>"))?;
    let reference_uri = doc
        .attr(reference, "URI")
        .ok_or_else(|| Error::missing_attribute("Reference", "URI"))?
        .to_string();

    if let Some(transforms) = doc.find_child(reference, XMLDSIG_NS, "Transforms") {
        for transform in doc.find_children(transforms, XMLDSIG_NS, "Transform") {
            let algorithm = doc.attr(transform, "Algorithm").unwrap_or("");
            if algorithm != EXC_C14N_URI && algorithm != ENVELOPED_SIGNATURE_URI {
                return Err(Error::Unsupported(format!(
                    "Signature transform '{}' is not supported",
                    algorithm
                )));
            }
        }
    }

    let digest_method = doc
        .find_child(reference, XMLDSIG_NS, "DigestMethod")
        .and_then(|n| doc.attr(n, "Algorithm").map(str::to_string))
        .ok_or_else(|| Error::invalid_xml_element("Reference", "Missing <DigestMethod>"))?;
    if digest_method != SHA512_URI {
        return Err(Error::Unsupported(format!(
            "Digest method '{}' is not supported",
            digest_method
        )));
    }

    let digest_value = doc
        .find_child(reference, XMLDSIG_NS, "DigestValue")
        .map(|n| doc.text_content(n))
        .ok_or_else(|| Error::invalid_xml_element("Reference", "Missing <DigestValue>"))?;
    let expected_digest = BASE64.decode(digest_value.trim())?;

    // Locate the referenced subtree
    let (target, omit): (NodeId, Vec<NodeId>) = if reference_uri.is_empty() {
        (doc.root(), vec![signature])
    } else if let Some(id) = reference_uri.strip_prefix('#') {
        let target = doc.find_element_by_id(id).ok_or_else(|| {
            Error::InvalidData(format!(
                "Signature references '#{}' but no element carries that id",
                id
            ))
        })?;
        (target, Vec::new())
    } else {
        return Err(Error::Unsupported(format!(
            "External signature reference '{}' is not supported",
            reference_uri
        )));
    };

    let actual_digest = Sha512::digest(canonicalize(doc, target, &omit)?);
    if actual_digest.as_slice() != expected_digest.as_slice() {
        return Err(Error::Crypto(format!(
            "Signature digest mismatch for reference '{}'",
            reference_uri
        )));
    }

    let signature_value = doc
        .find_child(signature, XMLDSIG_NS, "SignatureValue")
        .map(|n| doc.text_content(n))
        .ok_or_else(|| Error::invalid_xml_element("Signature", "Missing <SignatureValue>"))?;
    let signature_bytes = BASE64.decode(signature_value.trim())?;

    let certificate = extract_certificate(doc, signature)?;
    certificate.validate_strength()?;

    let signed_info_digest = Sha512::digest(canonicalize(doc, signed_info, &[])?);
    certificate
        .rsa_public_key()?
        .verify(
            Pkcs1v15Sign::new::<Sha512>(),
            &signed_info_digest,
            &signature_bytes,
        )
        .map_err(|_| {
            Error::Crypto(format!(
                "Signature by '{}' does not verify",
                certificate.subject()
            ))
        })?;

    Ok((certificate, reference_uri))
}

fn extract_certificate(doc: &XmlDocument, signature: NodeId) -> Result<Certificate> {
    let key_info = doc
        .find_child(signature, XMLDSIG_NS, "KeyInfo")
        .ok_or_else(|| Error::invalid_xml_element("Signature", "Missing <KeyInfo>"))?;
    let x509_data = doc
        .find_child(key_info, XMLDSIG_NS, "X509Data")
        .ok_or_else(|| Error::invalid_xml_element("KeyInfo", "Missing <X509Data>"))?;
    let x509_cert = doc
        .find_child(x509_data, XMLDSIG_NS, "X509Certificate")
        .ok_or_else(|| Error::invalid_xml_element("X509Data", "Missing <X509Certificate>"))?;
    let der = BASE64.decode(
        doc.text_content(x509_cert)
            .split_whitespace()
            .collect::<String>(),
    )?;
    Certificate::from_der(&der)
}
