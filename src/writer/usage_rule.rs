//! Usage rule serialization

use super::{child, cpix};
use crate::error::Result;
use crate::model::UsageRule;
use crate::xmltree::{NodeId, QName, XmlDocument};
use chrono::SecondsFormat;

/// Serialize one usage rule into the container
///
/// Only freshly added rules pass through here, and rules flagged with
/// unsupported filters are rejected at add time, so every filter the rule
/// carries is representable.
pub(crate) fn write_usage_rule(
    doc: &mut XmlDocument,
    container: NodeId,
    rule: &UsageRule,
) -> Result<NodeId> {
    let node = child(doc, container, cpix("ContentKeyUsageRule"));
    doc.set_attr(node, QName::new(None, "kid"), &rule.kid.to_string());

    for filter in &rule.key_period_filters {
        let elem = child(doc, node, cpix("KeyPeriodFilter"));
        doc.set_attr(elem, QName::new(None, "periodId"), &filter.period_id);
    }
    for filter in &rule.label_filters {
        let elem = child(doc, node, cpix("LabelFilter"));
        doc.set_attr(elem, QName::new(None, "label"), &filter.label);
    }
    for filter in &rule.video_filters {
        let elem = child(doc, node, cpix("VideoFilter"));
        set_opt_attr(doc, elem, "minPixels", filter.min_pixels.map(|v| v.to_string()));
        set_opt_attr(doc, elem, "maxPixels", filter.max_pixels.map(|v| v.to_string()));
        set_opt_attr(doc, elem, "hdr", filter.hdr.map(bool_lexical));
        set_opt_attr(doc, elem, "wcg", filter.wcg.map(bool_lexical));
        set_opt_attr(doc, elem, "minFps", filter.min_fps.map(|v| v.to_string()));
        set_opt_attr(doc, elem, "maxFps", filter.max_fps.map(|v| v.to_string()));
    }
    for filter in &rule.audio_filters {
        let elem = child(doc, node, cpix("AudioFilter"));
        set_opt_attr(doc, elem, "minChannels", filter.min_channels.map(|v| v.to_string()));
        set_opt_attr(doc, elem, "maxChannels", filter.max_channels.map(|v| v.to_string()));
    }
    for filter in &rule.bitrate_filters {
        let elem = child(doc, node, cpix("BitrateFilter"));
        set_opt_attr(doc, elem, "minBitrate", filter.min_bitrate.map(|v| v.to_string()));
        set_opt_attr(doc, elem, "maxBitrate", filter.max_bitrate.map(|v| v.to_string()));
    }
    for filter in &rule.time_filters {
        let elem = child(doc, node, cpix("TimeFilter"));
        set_opt_attr(
            doc,
            elem,
            "start",
            filter.start.map(|v| v.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        set_opt_attr(
            doc,
            elem,
            "end",
            filter.end.map(|v| v.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
    }
    for filter in &rule.crypto_period_filters {
        let elem = child(doc, node, cpix("CryptoPeriodFilter"));
        set_opt_attr(doc, elem, "periodIndex", filter.period_index.map(|v| v.to_string()));
    }
    Ok(node)
}

fn set_opt_attr(doc: &mut XmlDocument, node: NodeId, name: &str, value: Option<String>) {
    if let Some(value) = value {
        doc.set_attr(node, QName::new(None, name), &value);
    }
}

fn bool_lexical(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionKind;
    use crate::model::{AudioFilter, BitrateFilter, LabelFilter, VideoFilter};
    use crate::writer::{ensure_container, new_document_tree};
    use uuid::Uuid;

    #[test]
    fn test_rule_round_trips_through_parser() {
        let mut doc = new_document_tree(None);
        let container = ensure_container(&mut doc, CollectionKind::UsageRules);

        let mut rule = UsageRule::new(Uuid::new_v4());
        rule.label_filters.push(LabelFilter {
            label: "uhd".to_string(),
        });
        rule.video_filters.push(VideoFilter {
            min_pixels: Some(10),
            max_pixels: Some(20),
            hdr: Some(false),
            wcg: None,
            min_fps: Some(15.0),
            max_fps: Some(30.0),
        });
        rule.audio_filters.push(AudioFilter {
            min_channels: Some(2),
            max_channels: None,
        });
        rule.bitrate_filters.push(BitrateFilter {
            min_bitrate: Some(0),
            max_bitrate: Some(100),
        });

        let node = write_usage_rule(&mut doc, container, &rule).unwrap();
        let parsed = crate::parser::usage_rule::parse_usage_rule(&doc, node).unwrap();
        assert_eq!(parsed, rule);
    }
}
