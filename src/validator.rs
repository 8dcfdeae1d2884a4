//! Validation logic for CPIX entities and documents
//!
//! Entity-kind rules are free functions rather than methods on a shared
//! base type; cross-entity checks take the enclosing document. Everything
//! here runs twice by design: once when an entity is added, and again for
//! the whole document when it is saved, because accepted entities remain
//! mutable reference objects until they are committed to the tree.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::model::{ContentKey, ContentKeyPeriod, DrmSystem, Recipient, UsageRule};
use std::collections::HashSet;
use uuid::Uuid;

/// Accepted content-key value lengths in bytes
const CONTENT_KEY_VALUE_LENGTHS: [usize; 2] = [16, 32];

/// Required explicit-IV length in bytes
const EXPLICIT_IV_LENGTH: usize = 16;

/// Validate a content key in isolation
pub(crate) fn validate_content_key(key: &ContentKey) -> Result<()> {
    if let Some(ref value) = key.value {
        if !CONTENT_KEY_VALUE_LENGTHS.contains(&value.len()) {
            return Err(Error::InvalidData(format!(
                "Content key '{}' has a {}-byte value; only 16 or 32 bytes are valid",
                key.kid,
                value.len()
            )));
        }
    }
    if let Some(ref iv) = key.explicit_iv {
        if iv.len() != EXPLICIT_IV_LENGTH {
            return Err(Error::InvalidData(format!(
                "Content key '{}' has a {}-byte explicit IV; exactly {} bytes are required",
                key.kid,
                iv.len(),
                EXPLICIT_IV_LENGTH
            )));
        }
    }
    Ok(())
}

/// Validate a recipient: the certificate strength policy applies before
/// any cryptographic use
pub(crate) fn validate_recipient(recipient: &Recipient) -> Result<()> {
    recipient.certificate.validate_strength()
}

/// Validate a content key period in isolation
pub(crate) fn validate_content_key_period(period: &ContentKeyPeriod) -> Result<()> {
    if period.id.is_empty() {
        return Err(Error::InvalidData(
            "Content key period has an empty id".to_string(),
        ));
    }
    match (period.index, period.start, period.end) {
        (Some(_), None, None) => Ok(()),
        (None, Some(start), Some(end)) => {
            if start >= end {
                return Err(Error::InvalidData(format!(
                    "Content key period '{}' has start '{}' not before end '{}'",
                    period.id, start, end
                )));
            }
            Ok(())
        }
        (Some(_), _, _) => Err(Error::InvalidData(format!(
            "Content key period '{}' carries both an index and instants; they are mutually exclusive",
            period.id
        ))),
        _ => Err(Error::InvalidData(format!(
            "Content key period '{}' needs either an index or both start and end",
            period.id
        ))),
    }
}

/// Validate a usage rule's own filter instances
pub(crate) fn validate_usage_rule(rule: &UsageRule) -> Result<()> {
    for filter in &rule.video_filters {
        check_bounds(rule.kid, "pixel", filter.min_pixels, filter.max_pixels)?;
        if let (Some(min), Some(max)) = (filter.min_fps, filter.max_fps) {
            if min > max {
                return Err(Error::InvalidData(format!(
                    "Usage rule for '{}' has a frame-rate filter with min {} above max {}",
                    rule.kid, min, max
                )));
            }
        }
    }
    for filter in &rule.audio_filters {
        check_bounds(
            rule.kid,
            "channel",
            filter.min_channels.map(u64::from),
            filter.max_channels.map(u64::from),
        )?;
    }
    for filter in &rule.bitrate_filters {
        check_bounds(rule.kid, "bitrate", filter.min_bitrate, filter.max_bitrate)?;
    }
    for filter in &rule.time_filters {
        if let (Some(start), Some(end)) = (filter.start, filter.end) {
            if start >= end {
                return Err(Error::InvalidData(format!(
                    "Usage rule for '{}' has a time filter with start not before end",
                    rule.kid
                )));
            }
        }
    }
    for filter in &rule.label_filters {
        if filter.label.is_empty() {
            return Err(Error::InvalidData(format!(
                "Usage rule for '{}' has a label filter with an empty label",
                rule.kid
            )));
        }
    }
    for filter in &rule.key_period_filters {
        if filter.period_id.is_empty() {
            return Err(Error::InvalidData(format!(
                "Usage rule for '{}' has a key-period filter with an empty period id",
                rule.kid
            )));
        }
    }
    Ok(())
}

fn check_bounds(kid: Uuid, what: &str, min: Option<u64>, max: Option<u64>) -> Result<()> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(Error::InvalidData(format!(
                "Usage rule for '{}' has a {} filter with min {} above max {}",
                kid, what, min, max
            )));
        }
    }
    Ok(())
}

/// Validate a usage rule's references against the rest of the document
pub(crate) fn validate_usage_rule_references(document: &Document, rule: &UsageRule) -> Result<()> {
    if !document.content_keys().iter().any(|k| k.kid == rule.kid) {
        return Err(Error::InvalidData(format!(
            "Usage rule references content key '{}', which does not exist in the document",
            rule.kid
        )));
    }
    for filter in &rule.key_period_filters {
        if !document
            .content_key_periods()
            .iter()
            .any(|p| p.id == filter.period_id)
        {
            return Err(Error::InvalidData(format!(
                "Usage rule for '{}' references key period '{}', which does not exist",
                rule.kid, filter.period_id
            )));
        }
    }
    Ok(())
}

/// Validate a DRM system's references against the rest of the document
pub(crate) fn validate_drm_system_references(
    document: &Document,
    system: &DrmSystem,
) -> Result<()> {
    if !document.content_keys().iter().any(|k| k.kid == system.kid) {
        return Err(Error::InvalidData(format!(
            "DRM system '{}' references content key '{}', which does not exist in the document",
            system.system_id, system.kid
        )));
    }
    Ok(())
}

/// The full document validation pass, run at the start of every save
///
/// Entities remain mutable after acceptance, so everything checked at
/// add time is checked again here; a caller corrupting an already-accepted
/// entity must be caught before anything is written out.
pub(crate) fn validate_document(document: &Document) -> Result<()> {
    let mut kids = HashSet::new();
    for key in document.content_keys().iter() {
        validate_content_key(key)?;
        if !kids.insert(key.kid) {
            return Err(Error::InvalidData(format!(
                "Duplicate content key id '{}'",
                key.kid
            )));
        }
    }

    for recipient in document.recipients().iter() {
        validate_recipient(recipient)?;
    }

    let mut period_ids = HashSet::new();
    for period in document.content_key_periods().iter() {
        validate_content_key_period(period)?;
        if !period_ids.insert(period.id.clone()) {
            return Err(Error::InvalidData(format!(
                "Duplicate content key period id '{}'",
                period.id
            )));
        }
    }

    let mut system_pairs = HashSet::new();
    for system in document.drm_systems().iter() {
        validate_drm_system_references(document, system)?;
        if !system_pairs.insert((system.system_id, system.kid)) {
            return Err(Error::InvalidData(format!(
                "Duplicate DRM system entry for system '{}' and key '{}'",
                system.system_id, system.kid
            )));
        }
    }

    for rule in document.usage_rules().iter() {
        validate_usage_rule(rule)?;
        validate_usage_rule_references(document, rule)?;
    }

    // Removing the last recipient while existing encrypted keys are present
    // would silently decrypt them on output; the caller has to re-add the
    // keys to make that intent explicit.
    if document.recipients().is_empty() && document.has_existing_encrypted_keys() {
        return Err(Error::IllegalState(
            "The document still holds encrypted content keys loaded from its source; \
             removing every recipient would silently emit them decrypted. \
             Re-add the affected content keys explicitly to change their protection."
                .to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BitrateFilter, VideoFilter};

    #[test]
    fn test_content_key_value_lengths() {
        let kid = Uuid::new_v4();
        for len in [16usize, 32] {
            assert!(validate_content_key(&ContentKey::with_value(kid, vec![0; len])).is_ok());
        }
        for len in [0usize, 1, 15, 17, 24, 31, 33, 64] {
            assert!(
                validate_content_key(&ContentKey::with_value(kid, vec![0; len])).is_err(),
                "length {} must be rejected",
                len
            );
        }
        // a key request has nothing to check
        assert!(validate_content_key(&ContentKey::new(kid)).is_ok());
    }

    #[test]
    fn test_explicit_iv_length() {
        let mut key = ContentKey::with_value(Uuid::new_v4(), vec![0; 16]);
        key.explicit_iv = Some(vec![0; 16]);
        assert!(validate_content_key(&key).is_ok());
        key.explicit_iv = Some(vec![0; 12]);
        assert!(validate_content_key(&key).is_err());
    }

    #[test]
    fn test_period_mutual_exclusivity() {
        assert!(validate_content_key_period(&ContentKeyPeriod::with_index("p", 1)).is_ok());

        let mut both = ContentKeyPeriod::with_index("p", 1);
        both.start = Some(chrono::Utc::now());
        both.end = Some(chrono::Utc::now() + chrono::Duration::hours(1));
        assert!(validate_content_key_period(&both).is_err());

        let neither = ContentKeyPeriod {
            id: "p".to_string(),
            index: None,
            start: None,
            end: None,
        };
        assert!(validate_content_key_period(&neither).is_err());
    }

    #[test]
    fn test_inverted_filter_bounds_rejected() {
        let mut rule = UsageRule::new(Uuid::new_v4());
        rule.bitrate_filters.push(BitrateFilter {
            min_bitrate: Some(2000),
            max_bitrate: Some(1000),
        });
        assert!(validate_usage_rule(&rule).is_err());

        let mut rule = UsageRule::new(Uuid::new_v4());
        rule.video_filters.push(VideoFilter {
            min_pixels: Some(100),
            max_pixels: Some(10),
            ..VideoFilter::any()
        });
        assert!(validate_usage_rule(&rule).is_err());
    }

    #[test]
    fn test_equal_bounds_accepted() {
        let mut rule = UsageRule::new(Uuid::new_v4());
        rule.bitrate_filters.push(BitrateFilter {
            min_bitrate: Some(1000),
            max_bitrate: Some(1000),
        });
        assert!(validate_usage_rule(&rule).is_ok());
    }
}
