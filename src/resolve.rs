//! Usage-rule resolution engine
//!
//! Maps a description of a media sample to exactly one content key by
//! evaluating every usage rule in the document. Within one filter kind the
//! instances are alternatives; across kinds every kind present must be
//! satisfied. The engine fails closed: a document containing any rule with
//! unrecognized filters refuses resolution entirely, because partial
//! correctness cannot be guaranteed.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::model::{ContentKey, UsageRule};
use uuid::Uuid;

/// Media type of the sample being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Audio samples
    Audio,
    /// Video samples
    Video,
}

/// Attributes of a media sample, used to select the matching content key
///
/// Every field is optional; a filter that constrains an attribute the
/// context does not carry is simply not satisfied.
#[derive(Debug, Clone, Default)]
pub struct ContentKeyContext {
    /// Whether the sample is audio or video
    pub media_type: Option<MediaType>,
    /// Bandwidth in bits per second
    pub bitrate: Option<u64>,
    /// Audio channel count
    pub audio_channel_count: Option<u32>,
    /// Total pixels per picture
    pub picture_pixel_count: Option<u64>,
    /// Video frame rate
    pub video_frames_per_second: Option<f64>,
    /// Whether the sample uses a wide color gamut
    pub wide_color_gamut: Option<bool>,
    /// Whether the sample is high dynamic range
    pub high_dynamic_range: Option<bool>,
    /// Labels attached to the sample
    pub labels: Vec<String>,
}

impl ContentKeyContext {
    /// An empty context; matches only unconditional rules
    pub fn new() -> Self {
        Self::default()
    }
}

/// Resolve the content key for a media sample
pub(crate) fn resolve_content_key<'a>(
    document: &'a Document,
    context: &ContentKeyContext,
) -> Result<&'a ContentKey> {
    if document
        .usage_rules()
        .iter()
        .any(|rule| rule.contains_unsupported_filters())
    {
        return Err(Error::Unsupported(
            "The document contains usage rules with unrecognized filters; \
             content key resolution cannot be guaranteed to be correct"
                .to_string(),
        ));
    }

    let mut matched: Vec<Uuid> = Vec::new();
    for rule in document.usage_rules().iter() {
        if rule_matches(rule, context) && !matched.contains(&rule.kid) {
            matched.push(rule.kid);
        }
    }

    match matched.as_slice() {
        [] => Err(Error::ResolutionImpossible(
            "no usage rule matches the context".to_string(),
        )),
        [kid] => document
            .content_keys()
            .iter()
            .find(|key| key.kid == *kid)
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "Matched usage rule references missing content key '{}'",
                    kid
                ))
            }),
        kids => Err(Error::ResolutionAmbiguous(format!(
            "{} distinct content keys match the context: {}",
            kids.len(),
            kids.iter()
                .map(|kid| kid.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Every filter kind the rule carries must be satisfied; within one kind,
/// one satisfied instance is enough
fn rule_matches(rule: &UsageRule, context: &ContentKeyContext) -> bool {
    // The context describes a media sample and carries no period, time or
    // crypto-period attributes, so these filter kinds can never be
    // satisfied by it.
    if !rule.key_period_filters.is_empty()
        || !rule.time_filters.is_empty()
        || !rule.crypto_period_filters.is_empty()
    {
        return false;
    }

    if !rule.label_filters.is_empty()
        && !rule
            .label_filters
            .iter()
            .any(|f| context.labels.iter().any(|l| l == &f.label))
    {
        return false;
    }

    if !rule.video_filters.is_empty()
        && !rule.video_filters.iter().any(|f| {
            if context.media_type != Some(MediaType::Video) {
                return false;
            }
            if let Some(min) = f.min_pixels {
                match context.picture_pixel_count {
                    Some(pixels) if pixels >= min => {}
                    _ => return false,
                }
            }
            if let Some(max) = f.max_pixels {
                match context.picture_pixel_count {
                    Some(pixels) if pixels <= max => {}
                    _ => return false,
                }
            }
            if let Some(hdr) = f.hdr {
                if context.high_dynamic_range != Some(hdr) {
                    return false;
                }
            }
            if let Some(wcg) = f.wcg {
                if context.wide_color_gamut != Some(wcg) {
                    return false;
                }
            }
            // frame-rate bounds: exclusive below, inclusive above
            if let Some(min) = f.min_fps {
                match context.video_frames_per_second {
                    Some(fps) if fps > min => {}
                    _ => return false,
                }
            }
            if let Some(max) = f.max_fps {
                match context.video_frames_per_second {
                    Some(fps) if fps <= max => {}
                    _ => return false,
                }
            }
            true
        })
    {
        return false;
    }

    if !rule.audio_filters.is_empty()
        && !rule.audio_filters.iter().any(|f| {
            if context.media_type != Some(MediaType::Audio) {
                return false;
            }
            if let Some(min) = f.min_channels {
                match context.audio_channel_count {
                    Some(channels) if channels >= min => {}
                    _ => return false,
                }
            }
            if let Some(max) = f.max_channels {
                match context.audio_channel_count {
                    Some(channels) if channels <= max => {}
                    _ => return false,
                }
            }
            true
        })
    {
        return false;
    }

    if !rule.bitrate_filters.is_empty()
        && !rule.bitrate_filters.iter().any(|f| {
            if let Some(min) = f.min_bitrate {
                match context.bitrate {
                    Some(bitrate) if bitrate >= min => {}
                    _ => return false,
                }
            }
            if let Some(max) = f.max_bitrate {
                match context.bitrate {
                    Some(bitrate) if bitrate <= max => {}
                    _ => return false,
                }
            }
            true
        })
    {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AudioFilter, BitrateFilter, KeyPeriodFilter, LabelFilter, VideoFilter,
    };

    fn rule_with(f: impl FnOnce(&mut UsageRule)) -> UsageRule {
        let mut rule = UsageRule::new(Uuid::new_v4());
        f(&mut rule);
        rule
    }

    fn video_context(pixels: u64) -> ContentKeyContext {
        ContentKeyContext {
            media_type: Some(MediaType::Video),
            picture_pixel_count: Some(pixels),
            ..ContentKeyContext::new()
        }
    }

    #[test]
    fn test_unconditional_rule_matches_everything() {
        let rule = UsageRule::new(Uuid::new_v4());
        assert!(rule_matches(&rule, &ContentKeyContext::new()));
        assert!(rule_matches(&rule, &video_context(100)));
    }

    #[test]
    fn test_pixel_bounds_inclusive_both_ends() {
        let rule = rule_with(|r| {
            r.video_filters.push(VideoFilter {
                min_pixels: Some(10),
                max_pixels: Some(20),
                ..VideoFilter::any()
            })
        });
        assert!(!rule_matches(&rule, &video_context(9)));
        assert!(rule_matches(&rule, &video_context(10)));
        assert!(rule_matches(&rule, &video_context(15)));
        assert!(rule_matches(&rule, &video_context(20)));
        assert!(!rule_matches(&rule, &video_context(21)));
    }

    #[test]
    fn test_fps_bounds_exclusive_lower_inclusive_upper() {
        let rule = rule_with(|r| {
            r.video_filters.push(VideoFilter {
                min_fps: Some(15.0),
                max_fps: Some(30.0),
                ..VideoFilter::any()
            })
        });
        let fps = |v: f64| ContentKeyContext {
            media_type: Some(MediaType::Video),
            video_frames_per_second: Some(v),
            ..ContentKeyContext::new()
        };
        assert!(!rule_matches(&rule, &fps(15.0)));
        assert!(rule_matches(&rule, &fps(16.0)));
        assert!(rule_matches(&rule, &fps(25.0)));
        assert!(rule_matches(&rule, &fps(30.0)));
        assert!(!rule_matches(&rule, &fps(31.0)));
    }

    #[test]
    fn test_type_specific_filter_rejects_wrong_and_unknown_type() {
        let video_rule = rule_with(|r| r.video_filters.push(VideoFilter::any()));
        let audio_ctx = ContentKeyContext {
            media_type: Some(MediaType::Audio),
            ..ContentKeyContext::new()
        };
        let unknown_ctx = ContentKeyContext::new();
        assert!(!rule_matches(&video_rule, &audio_ctx));
        assert!(!rule_matches(&video_rule, &unknown_ctx));

        let audio_rule = rule_with(|r| r.audio_filters.push(AudioFilter::any()));
        assert!(!rule_matches(&audio_rule, &video_context(100)));
        assert!(!rule_matches(&audio_rule, &unknown_ctx));
        assert!(rule_matches(&audio_rule, &audio_ctx));
    }

    #[test]
    fn test_or_within_kind_and_across_kinds() {
        // two bitrate ranges: [0, 100] and [1000, 1100]
        let rule = rule_with(|r| {
            r.bitrate_filters.push(BitrateFilter {
                min_bitrate: Some(0),
                max_bitrate: Some(100),
            });
            r.bitrate_filters.push(BitrateFilter {
                min_bitrate: Some(1000),
                max_bitrate: Some(1100),
            });
        });
        let at = |bitrate: u64| ContentKeyContext {
            bitrate: Some(bitrate),
            ..ContentKeyContext::new()
        };
        assert!(rule_matches(&rule, &at(50)));
        assert!(rule_matches(&rule, &at(1050)));
        assert!(!rule_matches(&rule, &at(500)));

        // add a label kind: now both kinds must hold
        let rule = rule_with(|r| {
            r.bitrate_filters.push(BitrateFilter {
                min_bitrate: Some(0),
                max_bitrate: Some(100),
            });
            r.label_filters.push(LabelFilter {
                label: "sd".to_string(),
            });
        });
        let mut ctx = at(50);
        assert!(!rule_matches(&rule, &ctx));
        ctx.labels.push("sd".to_string());
        assert!(rule_matches(&rule, &ctx));
    }

    #[test]
    fn test_label_filter_requires_context_labels() {
        let rule = rule_with(|r| {
            r.label_filters.push(LabelFilter {
                label: "uhd".to_string(),
            })
        });
        assert!(!rule_matches(&rule, &ContentKeyContext::new()));
        let ctx = ContentKeyContext {
            labels: vec!["hd".to_string(), "uhd".to_string()],
            ..ContentKeyContext::new()
        };
        assert!(rule_matches(&rule, &ctx));
    }

    #[test]
    fn test_hdr_constraint_needs_explicit_context_value() {
        let rule = rule_with(|r| {
            r.video_filters.push(VideoFilter {
                hdr: Some(true),
                ..VideoFilter::any()
            })
        });
        let mut ctx = video_context(100);
        assert!(!rule_matches(&rule, &ctx));
        ctx.high_dynamic_range = Some(true);
        assert!(rule_matches(&rule, &ctx));
        ctx.high_dynamic_range = Some(false);
        assert!(!rule_matches(&rule, &ctx));
    }

    #[test]
    fn test_key_period_filter_never_matches_sample_context() {
        let rule = rule_with(|r| {
            r.key_period_filters.push(KeyPeriodFilter {
                period_id: "p1".to_string(),
            })
        });
        assert!(!rule_matches(&rule, &ContentKeyContext::new()));
        assert!(!rule_matches(&rule, &video_context(100)));
    }

    #[test]
    fn test_bounded_filter_unsatisfied_by_missing_context_field() {
        let rule = rule_with(|r| {
            r.bitrate_filters.push(BitrateFilter {
                min_bitrate: Some(100),
                max_bitrate: None,
            })
        });
        // context carries no bitrate at all
        assert!(!rule_matches(&rule, &ContentKeyContext::new()));
    }
}
