//! Usage rule parsing

use super::{parse_bool, parse_datetime, require_uuid_attr};
use crate::error::{Error, Result};
use crate::model::{
    AudioFilter, BitrateFilter, CPIX_NS, CryptoPeriodFilter, KeyPeriodFilter, LabelFilter,
    TimeFilter, UsageRule, VideoFilter,
};
use crate::xmltree::{NodeId, XmlDocument};

/// Parse one `<ContentKeyUsageRule>` element
///
/// Child elements this implementation does not recognize mark the rule as
/// carrying unsupported filters instead of failing the load; the rule then
/// round-trips untouched, but resolution refuses the whole document.
pub(crate) fn parse_usage_rule(doc: &XmlDocument, node: NodeId) -> Result<UsageRule> {
    let kid = require_uuid_attr(doc, node, "ContentKeyUsageRule", "kid")?;
    let mut rule = UsageRule::new(kid);

    for child in doc.child_elements(node) {
        let Some(elem) = doc.element(child) else {
            continue;
        };
        let in_cpix_ns = doc.element_namespace(child) == Some(CPIX_NS);
        match elem.name.local.as_str() {
            "KeyPeriodFilter" if in_cpix_ns => {
                let period_id = doc
                    .attr(child, "periodId")
                    .ok_or_else(|| Error::missing_attribute("KeyPeriodFilter", "periodId"))?
                    .to_string();
                rule.key_period_filters.push(KeyPeriodFilter { period_id });
            }
            "LabelFilter" if in_cpix_ns => {
                let label = doc
                    .attr(child, "label")
                    .ok_or_else(|| Error::missing_attribute("LabelFilter", "label"))?
                    .to_string();
                rule.label_filters.push(LabelFilter { label });
            }
            "VideoFilter" if in_cpix_ns => {
                rule.video_filters.push(VideoFilter {
                    min_pixels: parse_u64_attr(doc, child, "minPixels")?,
                    max_pixels: parse_u64_attr(doc, child, "maxPixels")?,
                    hdr: parse_bool_attr(doc, child, "hdr")?,
                    wcg: parse_bool_attr(doc, child, "wcg")?,
                    min_fps: parse_f64_attr(doc, child, "minFps")?,
                    max_fps: parse_f64_attr(doc, child, "maxFps")?,
                });
            }
            "AudioFilter" if in_cpix_ns => {
                rule.audio_filters.push(AudioFilter {
                    min_channels: parse_u32_attr(doc, child, "minChannels")?,
                    max_channels: parse_u32_attr(doc, child, "maxChannels")?,
                });
            }
            "BitrateFilter" if in_cpix_ns => {
                rule.bitrate_filters.push(BitrateFilter {
                    min_bitrate: parse_u64_attr(doc, child, "minBitrate")?,
                    max_bitrate: parse_u64_attr(doc, child, "maxBitrate")?,
                });
            }
            "TimeFilter" if in_cpix_ns => {
                rule.time_filters.push(TimeFilter {
                    start: doc
                        .attr(child, "start")
                        .map(|v| parse_datetime("start", v))
                        .transpose()?,
                    end: doc
                        .attr(child, "end")
                        .map(|v| parse_datetime("end", v))
                        .transpose()?,
                });
            }
            "CryptoPeriodFilter" if in_cpix_ns => {
                rule.crypto_period_filters.push(CryptoPeriodFilter {
                    period_index: parse_u64_attr(doc, child, "periodIndex")?,
                });
            }
            _ => {
                rule.contains_unsupported_filters = true;
            }
        }
    }

    Ok(rule)
}

fn parse_u64_attr(doc: &XmlDocument, node: NodeId, name: &str) -> Result<Option<u64>> {
    doc.attr(node, name)
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| Error::parse_error_with_context(name, v, "unsigned integer"))
        })
        .transpose()
}

fn parse_u32_attr(doc: &XmlDocument, node: NodeId, name: &str) -> Result<Option<u32>> {
    doc.attr(node, name)
        .map(|v| {
            v.parse::<u32>()
                .map_err(|_| Error::parse_error_with_context(name, v, "unsigned integer"))
        })
        .transpose()
}

fn parse_f64_attr(doc: &XmlDocument, node: NodeId, name: &str) -> Result<Option<f64>> {
    doc.attr(node, name)
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| Error::parse_error_with_context(name, v, "decimal number"))
        })
        .transpose()
}

fn parse_bool_attr(doc: &XmlDocument, node: NodeId, name: &str) -> Result<Option<bool>> {
    doc.attr(node, name)
        .map(|v| parse_bool(name, v))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KID: &str = "f81d4fae-7dec-11d0-a765-00a0c91e6bf6";

    fn wrap(inner: &str) -> XmlDocument {
        XmlDocument::parse(&format!(
            r#"<CPIX xmlns="urn:dashif:org:cpix">{}</CPIX>"#,
            inner
        ))
        .unwrap()
    }

    #[test]
    fn test_parse_rule_with_all_known_filters() {
        let doc = wrap(&format!(
            r#"<ContentKeyUsageRule kid="{}">
                 <KeyPeriodFilter periodId="p1"/>
                 <LabelFilter label="uhd"/>
                 <VideoFilter minPixels="10" maxPixels="20" hdr="true" minFps="15" maxFps="30"/>
                 <AudioFilter minChannels="2" maxChannels="6"/>
                 <BitrateFilter minBitrate="1000" maxBitrate="2000"/>
               </ContentKeyUsageRule>"#,
            KID
        ));
        let node = doc.child_elements(doc.root())[0];
        let rule = parse_usage_rule(&doc, node).unwrap();
        assert_eq!(rule.kid.to_string(), KID);
        assert_eq!(rule.key_period_filters.len(), 1);
        assert_eq!(rule.label_filters[0].label, "uhd");
        assert_eq!(rule.video_filters[0].min_pixels, Some(10));
        assert_eq!(rule.video_filters[0].hdr, Some(true));
        assert_eq!(rule.video_filters[0].min_fps, Some(15.0));
        assert_eq!(rule.audio_filters[0].max_channels, Some(6));
        assert_eq!(rule.bitrate_filters[0].max_bitrate, Some(2000));
        assert!(!rule.contains_unsupported_filters());
    }

    #[test]
    fn test_unknown_filter_marks_rule() {
        let doc = wrap(&format!(
            r#"<ContentKeyUsageRule kid="{}">
                 <BitrateFilter minBitrate="0"/>
                 <FancyNewFilter threshold="9"/>
               </ContentKeyUsageRule>"#,
            KID
        ));
        let node = doc.child_elements(doc.root())[0];
        let rule = parse_usage_rule(&doc, node).unwrap();
        assert!(rule.contains_unsupported_filters());
        // the known filter is still parsed
        assert_eq!(rule.bitrate_filters.len(), 1);
    }

    #[test]
    fn test_rule_without_filters_is_unconditional() {
        let doc = wrap(&format!(r#"<ContentKeyUsageRule kid="{}"/>"#, KID));
        let node = doc.child_elements(doc.root())[0];
        let rule = parse_usage_rule(&doc, node).unwrap();
        assert!(rule.is_unconditional());
    }

    #[test]
    fn test_malformed_bound_rejected() {
        let doc = wrap(&format!(
            r#"<ContentKeyUsageRule kid="{}"><BitrateFilter minBitrate="fast"/></ContentKeyUsageRule>"#,
            KID
        ));
        let node = doc.child_elements(doc.root())[0];
        assert!(parse_usage_rule(&doc, node).is_err());
    }
}
