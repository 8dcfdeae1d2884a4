//! Delivery data serialization

use super::{child, cpix, ds, pskc, text_child, xenc};
use crate::crypto::{
    AES256_CBC_URI, DocumentSecrets, HMAC_SHA512_URI, RSA_OAEP_MGF1P_URI, envelope,
};
use crate::error::Result;
use crate::model::Recipient;
use crate::xmltree::{NodeId, QName, XmlDocument};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

/// Serialize one delivery-data entry: the recipient certificate plus both
/// document secrets wrapped with the recipient's public key
pub(crate) fn write_delivery_data(
    doc: &mut XmlDocument,
    container: NodeId,
    recipient: &Recipient,
    secrets: &DocumentSecrets,
) -> Result<NodeId> {
    let wrapped = envelope::wrap_secrets(&recipient.certificate, secrets)?;

    let node = child(doc, container, cpix("DeliveryData"));

    let delivery_key = child(doc, node, cpix("DeliveryKey"));
    let x509_data = child(doc, delivery_key, ds("X509Data"));
    text_child(
        doc,
        x509_data,
        ds("X509Certificate"),
        &BASE64.encode(recipient.certificate.der()),
    );

    let document_key = child(doc, node, cpix("DocumentKey"));
    doc.set_attr(document_key, QName::new(None, "Algorithm"), AES256_CBC_URI);
    let data = child(doc, document_key, cpix("Data"));
    let secret = child(doc, data, pskc("Secret"));
    write_encrypted_value(doc, secret, &wrapped.document_key);

    let mac_method = child(doc, node, cpix("MACMethod"));
    doc.set_attr(mac_method, QName::new(None, "Algorithm"), HMAC_SHA512_URI);
    let mac_key = child(doc, mac_method, cpix("Key"));
    write_encrypted_value(doc, mac_key, &wrapped.mac_key);

    Ok(node)
}

fn write_encrypted_value(doc: &mut XmlDocument, parent: NodeId, wrapped: &[u8]) {
    let encrypted = child(doc, parent, pskc("EncryptedValue"));
    let method = child(doc, encrypted, xenc("EncryptionMethod"));
    doc.set_attr(method, QName::new(None, "Algorithm"), RSA_OAEP_MGF1P_URI);
    let cipher_data = child(doc, encrypted, xenc("CipherData"));
    text_child(doc, cipher_data, xenc("CipherValue"), &BASE64.encode(wrapped));
}
