//! Binding of loaded tree nodes to CPIX entities
//!
//! One submodule per container kind. Parsing here is per-entity only:
//! cross-entity validation is deliberately deferred until the whole
//! document has finished loading, because some validations need siblings
//! (a usage rule needs its content key to already exist).

pub(crate) mod content_key;
pub(crate) mod content_key_period;
pub(crate) mod delivery_data;
pub(crate) mod drm_system;
pub(crate) mod usage_rule;

use crate::error::{Error, Result};
use crate::xmltree::{NodeId, XmlDocument};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Required UUID attribute, by local name
pub(crate) fn require_uuid_attr(
    doc: &XmlDocument,
    node: NodeId,
    element: &str,
    attribute: &str,
) -> Result<Uuid> {
    let value = doc
        .attr(node, attribute)
        .ok_or_else(|| Error::missing_attribute(element, attribute))?;
    value
        .parse::<Uuid>()
        .map_err(|_| Error::parse_error_with_context(attribute, value, "UUID"))
}

/// Decode a base64 field, with the field name in the error
pub(crate) fn parse_base64(field: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value.split_whitespace().collect::<String>())
        .map_err(|_| Error::parse_error_with_context(field, value, "base64 data"))
}

/// Parse an xs:dateTime value into UTC
pub(crate) fn parse_datetime(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::parse_error_with_context(field, value, "xs:dateTime"))
}

/// Parse an xs:boolean value
pub(crate) fn parse_bool(field: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::parse_error_with_context(field, value, "xs:boolean")),
    }
}
