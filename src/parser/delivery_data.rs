//! Delivery data parsing

use super::parse_base64;
use crate::crypto::{Certificate, HMAC_SHA512_URI, RSA_OAEP_MGF1P_URI, WrappedSecrets};
use crate::error::{Error, Result};
use crate::model::{CPIX_NS, PSKC_NS, Recipient, XMLDSIG_NS, XMLENC_NS};
use crate::xmltree::{NodeId, XmlDocument};

/// Parse one `<DeliveryData>` element into the recipient and the wrapped
/// secrets addressed to it
pub(crate) fn parse_delivery_data(
    doc: &XmlDocument,
    node: NodeId,
) -> Result<(Recipient, WrappedSecrets)> {
    let delivery_key = doc
        .find_child(node, CPIX_NS, "DeliveryKey")
        .ok_or_else(|| Error::invalid_xml_element("DeliveryData", "Missing <DeliveryKey>"))?;
    let x509_data = doc
        .find_child(delivery_key, XMLDSIG_NS, "X509Data")
        .ok_or_else(|| Error::invalid_xml_element("DeliveryKey", "Missing <ds:X509Data>"))?;
    let x509_cert = doc
        .find_child(x509_data, XMLDSIG_NS, "X509Certificate")
        .ok_or_else(|| Error::invalid_xml_element("X509Data", "Missing <ds:X509Certificate>"))?;
    let der = parse_base64("X509Certificate", &doc.text_content(x509_cert))?;
    let certificate = Certificate::from_der(&der)?;

    let document_key_elem = doc
        .find_child(node, CPIX_NS, "DocumentKey")
        .ok_or_else(|| Error::invalid_xml_element("DeliveryData", "Missing <DocumentKey>"))?;
    let wrapped_document_key = parse_wrapped_value(doc, document_key_elem, "DocumentKey")?;

    let mac_method = doc
        .find_child(node, CPIX_NS, "MACMethod")
        .ok_or_else(|| Error::invalid_xml_element("DeliveryData", "Missing <MACMethod>"))?;
    let mac_algorithm = doc.attr(mac_method, "Algorithm").unwrap_or("");
    if mac_algorithm != HMAC_SHA512_URI {
        return Err(Error::Unsupported(format!(
            "MAC algorithm '{}' is not supported; expected HMAC-SHA-512",
            mac_algorithm
        )));
    }
    let mac_key_elem = doc
        .find_child(mac_method, CPIX_NS, "Key")
        .ok_or_else(|| Error::invalid_xml_element("MACMethod", "Missing <Key>"))?;
    let wrapped_mac_key = parse_wrapped_value(doc, mac_key_elem, "MACMethod/Key")?;

    Ok((
        Recipient::new(certificate),
        WrappedSecrets {
            document_key: wrapped_document_key,
            mac_key: wrapped_mac_key,
        },
    ))
}

/// Descend to the `pskc:EncryptedValue` under `parent` and return the
/// decoded cipher value, validating the wrapping algorithm
fn parse_wrapped_value(doc: &XmlDocument, parent: NodeId, context: &str) -> Result<Vec<u8>> {
    // DocumentKey nests the secret under <Data>, MACMethod/Key holds it
    // directly; accept either layer here.
    let secret_parent = doc.find_child(parent, CPIX_NS, "Data").unwrap_or(parent);
    let encrypted = doc
        .find_child(secret_parent, PSKC_NS, "Secret")
        .and_then(|s| doc.find_child(s, PSKC_NS, "EncryptedValue"))
        .or_else(|| doc.find_child(secret_parent, PSKC_NS, "EncryptedValue"))
        .ok_or_else(|| {
            Error::invalid_xml_element(context, "Missing <pskc:EncryptedValue>")
        })?;

    if let Some(method) = doc.find_child(encrypted, XMLENC_NS, "EncryptionMethod") {
        let algorithm = doc.attr(method, "Algorithm").unwrap_or("");
        if algorithm != RSA_OAEP_MGF1P_URI {
            return Err(Error::Unsupported(format!(
                "Secret wrapping algorithm '{}' is not supported; expected RSA-OAEP",
                algorithm
            )));
        }
    }

    let cipher_value = doc
        .find_child(encrypted, XMLENC_NS, "CipherData")
        .and_then(|cd| doc.find_child(cd, XMLENC_NS, "CipherValue"))
        .ok_or_else(|| {
            Error::invalid_xml_element(context, "Missing <xenc:CipherData>/<xenc:CipherValue>")
        })?;
    parse_base64("CipherValue", &doc.text_content(cipher_value))
}
