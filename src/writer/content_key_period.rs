//! Content key period serialization

use super::{child, cpix};
use crate::error::Result;
use crate::model::ContentKeyPeriod;
use crate::xmltree::{NodeId, QName, XmlDocument};
use chrono::SecondsFormat;

/// Serialize one content key period into the container
pub(crate) fn write_content_key_period(
    doc: &mut XmlDocument,
    container: NodeId,
    period: &ContentKeyPeriod,
) -> Result<NodeId> {
    let node = child(doc, container, cpix("ContentKeyPeriod"));
    doc.set_attr(node, QName::new(None, "id"), &period.id);
    if let Some(index) = period.index {
        doc.set_attr(node, QName::new(None, "index"), &index.to_string());
    }
    if let Some(start) = period.start {
        doc.set_attr(
            node,
            QName::new(None, "start"),
            &start.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    if let Some(end) = period.end {
        doc.set_attr(
            node,
            QName::new(None, "end"),
            &end.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionKind;
    use crate::writer::{ensure_container, new_document_tree};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_period_round_trips_through_parser() {
        let mut doc = new_document_tree(None);
        let container = ensure_container(&mut doc, CollectionKind::ContentKeyPeriods);
        let period = ContentKeyPeriod::with_interval(
            "period_1",
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
        );
        let node = write_content_key_period(&mut doc, container, &period).unwrap();
        let parsed =
            crate::parser::content_key_period::parse_content_key_period(&doc, node).unwrap();
        assert_eq!(parsed, period);
    }
}
