//! Content key period parsing

use super::parse_datetime;
use crate::error::{Error, Result};
use crate::model::ContentKeyPeriod;
use crate::xmltree::{NodeId, XmlDocument};

/// Parse one `<ContentKeyPeriod>` element
///
/// Index/interval mutual exclusivity is checked later by the document-wide
/// validation pass, together with every other loaded entity.
pub(crate) fn parse_content_key_period(
    doc: &XmlDocument,
    node: NodeId,
) -> Result<ContentKeyPeriod> {
    let id = doc
        .attr(node, "id")
        .ok_or_else(|| Error::missing_attribute("ContentKeyPeriod", "id"))?
        .to_string();

    let index = doc
        .attr(node, "index")
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| Error::parse_error_with_context("index", v, "unsigned integer"))
        })
        .transpose()?;
    let start = doc
        .attr(node, "start")
        .map(|v| parse_datetime("start", v))
        .transpose()?;
    let end = doc
        .attr(node, "end")
        .map(|v| parse_datetime("end", v))
        .transpose()?;

    Ok(ContentKeyPeriod {
        id,
        index,
        start,
        end,
    })
}
