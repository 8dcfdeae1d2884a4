//! Data structures representing CPIX entities

mod content_key;
mod content_key_period;
mod drm_system;
mod recipient;
mod usage_rule;

pub use content_key::{ContentKey, EncryptionScheme};
pub use content_key_period::ContentKeyPeriod;
pub use drm_system::DrmSystem;
pub use recipient::Recipient;
pub use usage_rule::{
    AudioFilter, BitrateFilter, CryptoPeriodFilter, KeyPeriodFilter, LabelFilter, TimeFilter,
    UsageRule, VideoFilter,
};

/// The CPIX document namespace
pub const CPIX_NS: &str = "urn:dashif:org:cpix";

/// Portable Symmetric Key Container namespace, used for key payloads
pub const PSKC_NS: &str = "urn:ietf:params:xml:ns:keyprov:pskc";

/// XML digital signature namespace
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML encryption namespace, used for wrapped secrets and key ciphertext
pub const XMLENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";

/// Document format version emitted by this implementation
pub const CPIX_VERSION: &str = "2.3";
