//! Content key entity

use uuid::Uuid;

/// Common-encryption protection scheme signaled on a content key
///
/// The four-character tags come from the common encryption specification;
/// no other values are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionScheme {
    /// AES-CTR full-sample encryption
    Cenc,
    /// AES-CBC full-sample encryption
    Cbc1,
    /// AES-CTR pattern (subsample) encryption
    Cens,
    /// AES-CBC pattern (subsample) encryption
    Cbcs,
}

impl EncryptionScheme {
    /// The four-character tag as written in a document
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionScheme::Cenc => "cenc",
            EncryptionScheme::Cbc1 => "cbc1",
            EncryptionScheme::Cens => "cens",
            EncryptionScheme::Cbcs => "cbcs",
        }
    }

    /// Parse a scheme tag; `None` for anything outside the allowed set
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "cenc" => Some(EncryptionScheme::Cenc),
            "cbc1" => Some(EncryptionScheme::Cbc1),
            "cens" => Some(EncryptionScheme::Cens),
            "cbcs" => Some(EncryptionScheme::Cbcs),
            _ => None,
        }
    }
}

/// A content encryption key
///
/// The value is optional: a key without a value represents a key request —
/// an entry asking a key service to provision key material for the given id.
/// When present, the value must be 16 or 32 bytes.
///
/// On a loaded document the value is also absent when the document's
/// symmetric secrets could not be recovered with the supplied private keys;
/// [`crate::Document::content_keys_readable`] distinguishes the two cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKey {
    /// Unique 128-bit key id
    pub kid: Uuid,
    /// Key material, 16 or 32 bytes when present
    pub value: Option<Vec<u8>>,
    /// Explicit initialization vector for media encryption, 16 bytes
    pub explicit_iv: Option<Vec<u8>>,
    /// Protection scheme this key is intended for
    pub common_encryption_scheme: Option<EncryptionScheme>,
    /// Whether the backing node of a loaded key stores the value encrypted.
    /// Never set on caller-constructed keys.
    pub(crate) loaded_encrypted: bool,
}

impl ContentKey {
    /// Create a key request: an entry with an id and no value
    pub fn new(kid: Uuid) -> Self {
        Self {
            kid,
            value: None,
            explicit_iv: None,
            common_encryption_scheme: None,
            loaded_encrypted: false,
        }
    }

    /// Create a key carrying value bytes
    pub fn with_value(kid: Uuid, value: Vec<u8>) -> Self {
        Self {
            kid,
            value: Some(value),
            explicit_iv: None,
            common_encryption_scheme: None,
            loaded_encrypted: false,
        }
    }

    /// True when key material is present
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_tags_round_trip() {
        for scheme in [
            EncryptionScheme::Cenc,
            EncryptionScheme::Cbc1,
            EncryptionScheme::Cens,
            EncryptionScheme::Cbcs,
        ] {
            assert_eq!(EncryptionScheme::from_tag(scheme.as_str()), Some(scheme));
        }
        assert_eq!(EncryptionScheme::from_tag("ctr"), None);
        assert_eq!(EncryptionScheme::from_tag("CENC"), None);
    }

    #[test]
    fn test_new_key_is_request() {
        let key = ContentKey::new(Uuid::new_v4());
        assert!(!key.has_value());
        assert!(!key.loaded_encrypted);
    }
}
