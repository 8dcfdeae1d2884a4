//! Content key parsing

use super::{parse_base64, require_uuid_attr};
use crate::crypto::AES256_CBC_URI;
use crate::error::{Error, Result};
use crate::model::{CPIX_NS, ContentKey, EncryptionScheme, PSKC_NS, XMLENC_NS};
use crate::xmltree::{NodeId, XmlDocument};

/// The still-encrypted value of a loaded content key
///
/// Kept separate from the entity: decryption happens opportunistically at
/// the end of the load, once the document secrets are (or are not) known.
#[derive(Debug, Clone)]
pub(crate) struct LoadedKeyPayload {
    /// Stored ciphertext field, `IV || encrypted bytes`
    pub cipher_value: Vec<u8>,
    /// HMAC-SHA-512 authentication tag over `cipher_value`
    pub value_mac: Option<Vec<u8>>,
}

/// Parse one `<ContentKey>` element
///
/// Returns the entity and, when the stored value is encrypted, the
/// ciphertext payload for deferred decryption.
pub(crate) fn parse_content_key(
    doc: &XmlDocument,
    node: NodeId,
) -> Result<(ContentKey, Option<LoadedKeyPayload>)> {
    let kid = require_uuid_attr(doc, node, "ContentKey", "kid")?;
    let mut key = ContentKey::new(kid);

    if let Some(iv) = doc.attr(node, "explicitIV") {
        key.explicit_iv = Some(parse_base64("explicitIV", iv)?);
    }

    if let Some(tag) = doc.attr(node, "commonEncryptionScheme") {
        key.common_encryption_scheme = Some(EncryptionScheme::from_tag(tag).ok_or_else(|| {
            Error::InvalidData(format!(
                "Content key '{}' uses unknown encryption scheme tag '{}'",
                kid, tag
            ))
        })?);
    }

    let Some(data) = doc.find_child(node, CPIX_NS, "Data") else {
        // no value: the key is a request awaiting provisioning
        return Ok((key, None));
    };
    let secret = doc
        .find_child(data, PSKC_NS, "Secret")
        .ok_or_else(|| Error::invalid_xml_element("Data", "Missing <pskc:Secret> child"))?;

    if let Some(plain) = doc.find_child(secret, PSKC_NS, "PlainValue") {
        key.value = Some(parse_base64("PlainValue", &doc.text_content(plain))?);
        return Ok((key, None));
    }

    let Some(encrypted) = doc.find_child(secret, PSKC_NS, "EncryptedValue") else {
        return Err(Error::invalid_xml_element(
            "Secret",
            "Expected <pskc:PlainValue> or <pskc:EncryptedValue>",
        ));
    };

    if let Some(method) = doc.find_child(encrypted, XMLENC_NS, "EncryptionMethod") {
        let algorithm = doc.attr(method, "Algorithm").unwrap_or("");
        if algorithm != AES256_CBC_URI {
            return Err(Error::Unsupported(format!(
                "Content key '{}' is encrypted with '{}'; only AES-256-CBC is supported",
                kid, algorithm
            )));
        }
    }

    let cipher_data = doc
        .find_child(encrypted, XMLENC_NS, "CipherData")
        .ok_or_else(|| Error::invalid_xml_element("EncryptedValue", "Missing <xenc:CipherData>"))?;
    let cipher_value = doc
        .find_child(cipher_data, XMLENC_NS, "CipherValue")
        .ok_or_else(|| Error::invalid_xml_element("CipherData", "Missing <xenc:CipherValue>"))?;
    let cipher_value = parse_base64("CipherValue", &doc.text_content(cipher_value))?;

    let value_mac = doc
        .find_child(secret, PSKC_NS, "ValueMAC")
        .map(|n| parse_base64("ValueMAC", &doc.text_content(n)))
        .transpose()?;

    key.loaded_encrypted = true;
    Ok((
        key,
        Some(LoadedKeyPayload {
            cipher_value,
            value_mac,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmltree::XmlDocument;

    fn wrap(inner: &str) -> XmlDocument {
        XmlDocument::parse(&format!(
            r#"<CPIX xmlns="urn:dashif:org:cpix" xmlns:pskc="urn:ietf:params:xml:ns:keyprov:pskc" xmlns:enc="http://www.w3.org/2001/04/xmlenc#">{}</CPIX>"#,
            inner
        ))
        .unwrap()
    }

    #[test]
    fn test_parse_plain_key() {
        let doc = wrap(
            r#"<ContentKey kid="f81d4fae-7dec-11d0-a765-00a0c91e6bf6" commonEncryptionScheme="cenc">
                 <Data><pskc:Secret><pskc:PlainValue>EjRWeJASNFZ4kBI0VniQEg==</pskc:PlainValue></pskc:Secret></Data>
               </ContentKey>"#,
        );
        let node = doc.child_elements(doc.root())[0];
        let (key, payload) = parse_content_key(&doc, node).unwrap();
        assert_eq!(
            key.kid.to_string(),
            "f81d4fae-7dec-11d0-a765-00a0c91e6bf6"
        );
        assert_eq!(key.value.as_ref().unwrap().len(), 16);
        assert_eq!(key.common_encryption_scheme, Some(EncryptionScheme::Cenc));
        assert!(!key.loaded_encrypted);
        assert!(payload.is_none());
    }

    #[test]
    fn test_parse_key_request_without_data() {
        let doc = wrap(r#"<ContentKey kid="f81d4fae-7dec-11d0-a765-00a0c91e6bf6"/>"#);
        let node = doc.child_elements(doc.root())[0];
        let (key, payload) = parse_content_key(&doc, node).unwrap();
        assert!(key.value.is_none());
        assert!(payload.is_none());
    }

    #[test]
    fn test_parse_encrypted_key_defers_payload() {
        let doc = wrap(
            r#"<ContentKey kid="f81d4fae-7dec-11d0-a765-00a0c91e6bf6">
                 <Data><pskc:Secret>
                   <pskc:EncryptedValue>
                     <enc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes256-cbc"/>
                     <enc:CipherData><enc:CipherValue>AAAAAAAAAAAAAAAAAAAAAAEBAQEBAQEBAQEBAQEBAQE=</enc:CipherValue></enc:CipherData>
                   </pskc:EncryptedValue>
                   <pskc:ValueMAC>YWJj</pskc:ValueMAC>
                 </pskc:Secret></Data>
               </ContentKey>"#,
        );
        let node = doc.child_elements(doc.root())[0];
        let (key, payload) = parse_content_key(&doc, node).unwrap();
        assert!(key.loaded_encrypted);
        assert!(key.value.is_none());
        let payload = payload.unwrap();
        assert_eq!(payload.cipher_value.len(), 32);
        assert_eq!(payload.value_mac.unwrap(), b"abc".to_vec());
    }

    #[test]
    fn test_unknown_scheme_tag_rejected() {
        let doc = wrap(
            r#"<ContentKey kid="f81d4fae-7dec-11d0-a765-00a0c91e6bf6" commonEncryptionScheme="ctrx"/>"#,
        );
        let node = doc.child_elements(doc.root())[0];
        assert!(matches!(
            parse_content_key(&doc, node),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_unknown_cipher_algorithm_rejected() {
        let doc = wrap(
            r#"<ContentKey kid="f81d4fae-7dec-11d0-a765-00a0c91e6bf6">
                 <Data><pskc:Secret>
                   <pskc:EncryptedValue>
                     <enc:EncryptionMethod Algorithm="http://www.w3.org/2009/xmlenc11#aes256-gcm"/>
                     <enc:CipherData><enc:CipherValue>AAAA</enc:CipherValue></enc:CipherData>
                   </pskc:EncryptedValue>
                 </pskc:Secret></Data>
               </ContentKey>"#,
        );
        let node = doc.child_elements(doc.root())[0];
        assert!(matches!(
            parse_content_key(&doc, node),
            Err(Error::Unsupported(_))
        ));
    }
}
