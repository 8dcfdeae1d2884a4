//! Content key serialization

use super::{child, cpix, pskc, text_child, xenc};
use crate::crypto::{AES256_CBC_URI, DocumentSecrets, envelope};
use crate::error::Result;
use crate::model::ContentKey;
use crate::xmltree::{NodeId, QName, XmlDocument};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

/// Serialize one content key into the container
///
/// With `secrets` present the value is encrypted and authenticated; with
/// `None` (a document without recipients) the value is stored in plaintext.
/// A key without a value is written as a bare request element.
pub(crate) fn write_content_key(
    doc: &mut XmlDocument,
    container: NodeId,
    key: &ContentKey,
    secrets: Option<&DocumentSecrets>,
) -> Result<NodeId> {
    let node = child(doc, container, cpix("ContentKey"));
    doc.set_attr(node, QName::new(None, "kid"), &key.kid.to_string());
    if let Some(ref iv) = key.explicit_iv {
        doc.set_attr(node, QName::new(None, "explicitIV"), &BASE64.encode(iv));
    }
    if let Some(scheme) = key.common_encryption_scheme {
        doc.set_attr(
            node,
            QName::new(None, "commonEncryptionScheme"),
            scheme.as_str(),
        );
    }

    let Some(ref value) = key.value else {
        return Ok(node);
    };

    let data = child(doc, node, cpix("Data"));
    let secret = child(doc, data, pskc("Secret"));

    match secrets {
        Some(secrets) => {
            let (payload, mac) = envelope::encrypt_content_key(secrets, value)?;
            let encrypted = child(doc, secret, pskc("EncryptedValue"));
            let method = child(doc, encrypted, xenc("EncryptionMethod"));
            doc.set_attr(method, QName::new(None, "Algorithm"), AES256_CBC_URI);
            let cipher_data = child(doc, encrypted, xenc("CipherData"));
            text_child(doc, cipher_data, xenc("CipherValue"), &BASE64.encode(&payload));
            text_child(doc, secret, pskc("ValueMAC"), &BASE64.encode(&mac));
        }
        None => {
            text_child(doc, secret, pskc("PlainValue"), &BASE64.encode(value));
        }
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CPIX_NS, PSKC_NS};
    use crate::writer::{ensure_container, new_document_tree};
    use crate::collection::CollectionKind;
    use uuid::Uuid;

    #[test]
    fn test_plaintext_key_round_trips_through_parser() {
        let mut doc = new_document_tree(None);
        let container = ensure_container(&mut doc, CollectionKind::ContentKeys);
        let key = ContentKey::with_value(Uuid::new_v4(), vec![0xAB; 16]);
        let node = write_content_key(&mut doc, container, &key, None).unwrap();

        let (parsed, payload) = crate::parser::content_key::parse_content_key(&doc, node).unwrap();
        assert_eq!(parsed.kid, key.kid);
        assert_eq!(parsed.value, key.value);
        assert!(payload.is_none());
    }

    #[test]
    fn test_encrypted_key_round_trips_with_mac() {
        let mut doc = new_document_tree(None);
        let container = ensure_container(&mut doc, CollectionKind::ContentKeys);
        let secrets = DocumentSecrets::generate();
        let key = ContentKey::with_value(Uuid::new_v4(), vec![0xCD; 32]);
        let node = write_content_key(&mut doc, container, &key, Some(&secrets)).unwrap();

        let (parsed, payload) = crate::parser::content_key::parse_content_key(&doc, node).unwrap();
        assert!(parsed.value.is_none());
        assert!(parsed.loaded_encrypted);
        let payload = payload.unwrap();
        let mac = payload.value_mac.as_deref().unwrap();
        assert!(envelope::verify_mac(&secrets, &payload.cipher_value, mac));
        assert_eq!(
            envelope::decrypt_content_key(&secrets, &payload.cipher_value).unwrap(),
            vec![0xCD; 32]
        );
    }

    #[test]
    fn test_key_request_has_no_data_child() {
        let mut doc = new_document_tree(None);
        let container = ensure_container(&mut doc, CollectionKind::ContentKeys);
        let key = ContentKey::new(Uuid::new_v4());
        let node = write_content_key(&mut doc, container, &key, None).unwrap();
        assert!(doc.find_child(node, CPIX_NS, "Data").is_none());
        // and therefore no secret element anywhere beneath
        assert!(doc.find_child(node, PSKC_NS, "Secret").is_none());
    }
}
