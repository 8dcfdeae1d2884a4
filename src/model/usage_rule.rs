//! Usage rule entity and its filter kinds

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A policy binding that maps media samples to one content key
///
/// A rule carries zero or more instances of each filter kind. During
/// resolution, instances of one kind are alternatives (OR) while the kinds
/// themselves all have to be satisfied (AND). A rule with no filters at all
/// matches every context.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRule {
    /// Id of the content key this rule assigns
    pub kid: Uuid,
    /// Filters matching a named content key period
    pub key_period_filters: Vec<KeyPeriodFilter>,
    /// Filters matching a label carried by the query context
    pub label_filters: Vec<LabelFilter>,
    /// Filters matching video samples by resolution, dynamic range and rate
    pub video_filters: Vec<VideoFilter>,
    /// Filters matching audio samples by channel count
    pub audio_filters: Vec<AudioFilter>,
    /// Filters matching samples by bandwidth
    pub bitrate_filters: Vec<BitrateFilter>,
    /// Filters matching a wall-clock validity window
    pub time_filters: Vec<TimeFilter>,
    /// Filters matching a crypto-period by index
    pub crypto_period_filters: Vec<CryptoPeriodFilter>,
    /// Set while loading a document whose rule carries filter elements this
    /// implementation does not understand. Such a rule round-trips, but
    /// resolution refuses the whole document and the rule cannot be freshly
    /// re-added.
    pub(crate) contains_unsupported_filters: bool,
}

impl UsageRule {
    /// Create a rule assigning the given content key, with no filters
    pub fn new(kid: Uuid) -> Self {
        Self {
            kid,
            key_period_filters: Vec::new(),
            label_filters: Vec::new(),
            video_filters: Vec::new(),
            audio_filters: Vec::new(),
            bitrate_filters: Vec::new(),
            time_filters: Vec::new(),
            crypto_period_filters: Vec::new(),
            contains_unsupported_filters: false,
        }
    }

    /// Whether the loaded source of this rule contained filter elements this
    /// implementation does not interpret
    pub fn contains_unsupported_filters(&self) -> bool {
        self.contains_unsupported_filters
    }

    /// True when the rule carries no filters of any kind
    pub fn is_unconditional(&self) -> bool {
        self.key_period_filters.is_empty()
            && self.label_filters.is_empty()
            && self.video_filters.is_empty()
            && self.audio_filters.is_empty()
            && self.bitrate_filters.is_empty()
            && self.time_filters.is_empty()
            && self.crypto_period_filters.is_empty()
    }
}

/// Restricts a rule to one named content key period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPeriodFilter {
    /// Id of the referenced [`crate::ContentKeyPeriod`]
    pub period_id: String,
}

/// Restricts a rule to contexts carrying a label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    /// The label the context's label set must contain
    pub label: String,
}

/// Restricts a rule to video samples
///
/// Pixel bounds are inclusive on both ends. Frame-rate bounds are exclusive
/// below and inclusive above; the asymmetry is part of the observed document
/// semantics and is preserved as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFilter {
    /// Minimum picture pixel count (inclusive)
    pub min_pixels: Option<u64>,
    /// Maximum picture pixel count (inclusive)
    pub max_pixels: Option<u64>,
    /// Required high-dynamic-range flag
    pub hdr: Option<bool>,
    /// Required wide-color-gamut flag
    pub wcg: Option<bool>,
    /// Minimum frames per second (exclusive)
    pub min_fps: Option<f64>,
    /// Maximum frames per second (inclusive)
    pub max_fps: Option<f64>,
}

impl VideoFilter {
    /// A video filter with no constraints: matches any video context
    pub fn any() -> Self {
        Self {
            min_pixels: None,
            max_pixels: None,
            hdr: None,
            wcg: None,
            min_fps: None,
            max_fps: None,
        }
    }
}

/// Restricts a rule to audio samples, channel bounds inclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFilter {
    /// Minimum channel count (inclusive)
    pub min_channels: Option<u32>,
    /// Maximum channel count (inclusive)
    pub max_channels: Option<u32>,
}

impl AudioFilter {
    /// An audio filter with no constraints: matches any audio context
    pub fn any() -> Self {
        Self {
            min_channels: None,
            max_channels: None,
        }
    }
}

/// Restricts a rule to a bandwidth range, bounds inclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitrateFilter {
    /// Minimum bitrate in bits per second (inclusive)
    pub min_bitrate: Option<u64>,
    /// Maximum bitrate in bits per second (inclusive)
    pub max_bitrate: Option<u64>,
}

/// Restricts a rule to a wall-clock validity window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFilter {
    /// Window start (inclusive)
    pub start: Option<DateTime<Utc>>,
    /// Window end (exclusive)
    pub end: Option<DateTime<Utc>>,
}

/// Restricts a rule to one crypto-period in a key rotation sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoPeriodFilter {
    /// Index of the crypto-period
    pub period_index: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rule_is_unconditional() {
        let rule = UsageRule::new(Uuid::new_v4());
        assert!(rule.is_unconditional());
        assert!(!rule.contains_unsupported_filters());
    }

    #[test]
    fn test_rule_with_filter_is_conditional() {
        let mut rule = UsageRule::new(Uuid::new_v4());
        rule.bitrate_filters.push(BitrateFilter {
            min_bitrate: Some(0),
            max_bitrate: Some(100),
        });
        assert!(!rule.is_unconditional());
    }
}
