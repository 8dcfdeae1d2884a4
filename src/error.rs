//! Error types for CPIX document processing
//!
//! This module provides comprehensive error handling for CPIX operations.
//! All errors include error codes for categorization and enough context to
//! act on the failure.
//!
//! # Error Codes
//!
//! Error codes follow the pattern: `E<category><number>`
//!
//! Categories:
//! - **E1xxx**: I/O errors
//! - **E2xxx**: XML parsing, structure and schema errors
//! - **E3xxx**: Entity and document validation errors
//! - **E4xxx**: Unsupported features
//! - **E5xxx**: Certificate policy and cryptography errors
//! - **E6xxx**: Illegal state transitions
//! - **E7xxx**: Content-key resolution outcomes
//! - **E9xxx**: Internal defects
//!
//! ## Common Error Codes
//!
//! - `E1001`: I/O error reading or writing a stream
//! - `E2001`: XML parsing error
//! - `E2002`: XML attribute error
//! - `E2003`: Invalid XML structure
//! - `E2004`: Document failed the schema gate on load
//! - `E3001`: Invalid entity or document content
//! - `E3002`: Numeric or identifier parse error
//! - `E4001`: Unsupported feature or algorithm
//! - `E5001`: Certificate below strength policy
//! - `E6001`: Mutation of read-only state or duplicate add

use std::io;
use thiserror::Error;

/// Result type for CPIX operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when processing CPIX documents
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred while reading or writing a stream
    ///
    /// **Error Code**: E1001
    ///
    /// **Common Causes**:
    /// - File not found
    /// - Insufficient permissions
    /// - Disk read error
    #[error("[E1001] I/O error: {0}")]
    Io(#[from] io::Error),

    /// XML parsing error
    ///
    /// **Error Code**: E2001
    ///
    /// **Common Causes**:
    /// - Malformed XML syntax
    /// - Invalid character encoding
    /// - Unclosed tags
    #[error("[E2001] XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// XML attribute error
    ///
    /// **Error Code**: E2002
    ///
    /// **Common Causes**:
    /// - Missing required attribute
    /// - Invalid attribute value
    /// - Duplicate attribute
    #[error("[E2002] XML attribute error: {0}")]
    XmlAttr(String),

    /// Invalid XML structure
    ///
    /// **Error Code**: E2003
    ///
    /// **Common Causes**:
    /// - Missing required XML elements
    /// - Invalid element nesting
    /// - Text content where elements are expected
    #[error("[E2003] Invalid XML structure: {0}")]
    InvalidXml(String),

    /// Document rejected by the schema gate on load
    ///
    /// **Error Code**: E2004
    ///
    /// This is the ordinary, user-facing signal that the input is not a
    /// well-formed CPIX document: wrong root element or namespace,
    /// containers out of order, unknown top-level content, or a missing
    /// required attribute.
    ///
    /// **Suggestions**:
    /// - Verify the document was produced by a conforming CPIX writer
    /// - Check container ordering against the CPIX schema
    #[error("[E2004] Invalid CPIX document: {0}")]
    InvalidFormat(String),

    /// XML writing error
    ///
    /// **Error Code**: E2005
    #[error("[E2005] XML writing error: {0}")]
    XmlWrite(String),

    /// Invalid entity or document content
    ///
    /// **Error Code**: E3001
    ///
    /// **Common Causes**:
    /// - Content-key value with a length outside 16 or 32 bytes
    /// - Usage rule referencing a nonexistent content key
    /// - Duplicate key ids within one document
    /// - A filter instance with min greater than max
    ///
    /// Raised both at add-time and again during the save-time
    /// re-validation pass, because entities stay mutable after acceptance.
    #[error("[E3001] Invalid data: {0}")]
    InvalidData(String),

    /// Parse error for numeric values and identifiers
    ///
    /// **Error Code**: E3002
    ///
    /// **Common Causes**:
    /// - Invalid number format
    /// - Malformed UUID or timestamp
    /// - Invalid base64 payload
    #[error("[E3002] Parse error: {0}")]
    ParseError(String),

    /// Unsupported feature or algorithm
    ///
    /// **Error Code**: E4001
    ///
    /// Raised when a document is schema-valid but uses constructs this
    /// implementation does not interpret, for example an unknown wrapping
    /// algorithm or a usage rule carrying unrecognized filter elements at
    /// resolution time. The implementation fails closed rather than
    /// guessing.
    #[error("[E4001] Unsupported feature: {0}")]
    Unsupported(String),

    /// Certificate fails the strength policy
    ///
    /// **Error Code**: E5001
    ///
    /// **Common Causes**:
    /// - RSA key shorter than the minimum bit length
    /// - Certificate signed with SHA-1
    /// - Non-RSA certificate offered for signing or recipiency
    ///
    /// Checked before any cryptographic call is made with the certificate.
    #[error("[E5001] Weak certificate: {0}")]
    WeakCertificate(String),

    /// Cryptographic operation failure
    ///
    /// **Error Code**: E5002
    ///
    /// **Common Causes**:
    /// - RSA unwrap with a non-matching private key
    /// - Malformed ciphertext or padding
    /// - Signature value that does not verify
    #[error("[E5002] Cryptographic failure: {0}")]
    Crypto(String),

    /// Illegal state transition
    ///
    /// **Error Code**: E6001
    ///
    /// **Common Causes**:
    /// - Mutating a signed (read-only) collection or document
    /// - Adding a duplicate entity
    /// - Signing without a private key
    /// - Adding a recipient while unencrypted loaded keys are present
    #[error("[E6001] Illegal state: {0}")]
    IllegalState(String),

    /// No usage rule matched the query context
    ///
    /// **Error Code**: E7001
    #[error("[E7001] No content key matches the given context: {0}")]
    ResolutionImpossible(String),

    /// More than one distinct content key matched the query context
    ///
    /// **Error Code**: E7002
    #[error("[E7002] Content key resolution is ambiguous: {0}")]
    ResolutionAmbiguous(String),

    /// Internal defect detected during save
    ///
    /// **Error Code**: E9001
    ///
    /// The serialized output failed the schema gate before being copied to
    /// the caller's stream. This should never occur from correct API usage;
    /// it means an already-accepted entity was corrupted in a way the
    /// re-validation pass did not catch, or the writer produced
    /// non-conforming XML. Nothing has been written to the output.
    #[error("[E9001] Internal error, output failed validation: {0}")]
    Internal(String),
}

impl From<std::num::ParseFloatError> for Error {
    fn from(err: std::num::ParseFloatError) -> Self {
        Error::ParseError(format!("Failed to parse floating-point number: {}", err))
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::ParseError(format!("Failed to parse integer: {}", err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlAttr(format!("Attribute parsing failed: {}", err))
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Error::ParseError(format!("Failed to parse UUID: {}", err))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::ParseError(format!("Failed to decode base64 value: {}", err))
    }
}

impl Error {
    /// Create an InvalidXml error with element context
    ///
    /// # Example
    /// ```ignore
    /// Error::invalid_xml_element("ContentKey", "Missing <Data> child")
    /// ```
    pub fn invalid_xml_element(element: &str, message: &str) -> Self {
        Error::InvalidXml(format!("Element '<{}>': {}", element, message))
    }

    /// Create an InvalidXml error for a missing required attribute
    ///
    /// # Example
    /// ```ignore
    /// Error::missing_attribute("ContentKey", "kid")
    /// ```
    pub fn missing_attribute(element: &str, attribute: &str) -> Self {
        Error::InvalidXml(format!(
            "Element '<{}>' is missing required attribute '{}'",
            element, attribute
        ))
    }

    /// Create a ParseError with context about what was being parsed
    ///
    /// # Arguments
    /// * `field_name` - The name of the field being parsed (e.g., "explicitIV")
    /// * `value` - The value that failed to parse
    /// * `expected_type` - The expected type (e.g., "base64-encoded 16 bytes")
    pub fn parse_error_with_context(field_name: &str, value: &str, expected_type: &str) -> Self {
        Error::ParseError(format!(
            "Failed to parse '{}': expected {}, got '{}'",
            field_name, expected_type, value
        ))
    }

    /// Create an XmlWrite error
    pub fn xml_write(message: String) -> Self {
        Error::XmlWrite(message)
    }

    /// True when this error is one of the two resolution-engine outcomes
    pub fn is_resolution_outcome(&self) -> bool {
        matches!(
            self,
            Error::ResolutionImpossible(_) | Error::ResolutionAmbiguous(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_messages() {
        let io_err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "test"));
        assert!(io_err.to_string().contains("[E1001]"));

        let invalid_data = Error::InvalidData("test error".to_string());
        assert!(invalid_data.to_string().contains("[E3001]"));

        let weak = Error::WeakCertificate("1024-bit key".to_string());
        assert!(weak.to_string().contains("[E5001]"));

        let state = Error::IllegalState("collection is signed".to_string());
        assert!(state.to_string().contains("[E6001]"));

        let internal = Error::Internal("output rejected".to_string());
        assert!(internal.to_string().contains("[E9001]"));
    }

    #[test]
    fn test_invalid_xml_element_helper() {
        let err = Error::invalid_xml_element("ContentKey", "Missing <Data> child");
        assert!(err.to_string().contains("Element '<ContentKey>'"));
        assert!(err.to_string().contains("Missing <Data> child"));
        assert!(err.to_string().contains("[E2003]"));
    }

    #[test]
    fn test_missing_attribute_helper() {
        let err = Error::missing_attribute("DRMSystem", "systemId");
        assert!(err.to_string().contains("Element '<DRMSystem>'"));
        assert!(err.to_string().contains("'systemId'"));
        assert!(err.to_string().contains("[E2003]"));
    }

    #[test]
    fn test_parse_error_with_context_helper() {
        let err = Error::parse_error_with_context("minPixels", "abc", "unsigned integer");
        assert!(err.to_string().contains("minPixels"));
        assert!(err.to_string().contains("'abc'"));
        assert!(err.to_string().contains("[E3002]"));
    }

    #[test]
    fn test_parse_int_error_conversion() {
        let parse_err: std::num::ParseIntError = "not_a_number".parse::<u64>().unwrap_err();
        let err = Error::from(parse_err);
        assert!(err.to_string().contains("Failed to parse integer"));
        assert!(err.to_string().contains("[E3002]"));
    }

    #[test]
    fn test_uuid_error_conversion() {
        let uuid_err = "not-a-uuid".parse::<uuid::Uuid>().unwrap_err();
        let err = Error::from(uuid_err);
        assert!(err.to_string().contains("UUID"));
        assert!(err.to_string().contains("[E3002]"));
    }

    #[test]
    fn test_resolution_outcome_predicate() {
        assert!(Error::ResolutionImpossible("x".into()).is_resolution_outcome());
        assert!(Error::ResolutionAmbiguous("x".into()).is_resolution_outcome());
        assert!(!Error::InvalidData("x".into()).is_resolution_outcome());
    }
}
