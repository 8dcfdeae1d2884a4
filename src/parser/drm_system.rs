//! DRM system parsing

use super::require_uuid_attr;
use crate::error::Result;
use crate::model::{CPIX_NS, DrmSystem};
use crate::xmltree::{NodeId, XmlDocument};

/// Parse one `<DRMSystem>` element
///
/// Payload children are opaque: their text is stored verbatim for the
/// external signaling collaborator to interpret.
pub(crate) fn parse_drm_system(doc: &XmlDocument, node: NodeId) -> Result<DrmSystem> {
    let system_id = require_uuid_attr(doc, node, "DRMSystem", "systemId")?;
    let kid = require_uuid_attr(doc, node, "DRMSystem", "kid")?;
    let mut system = DrmSystem::new(system_id, kid);

    if let Some(pssh) = doc.find_child(node, CPIX_NS, "PSSH") {
        system.pssh = Some(doc.text_content(pssh));
    }
    if let Some(cpd) = doc.find_child(node, CPIX_NS, "ContentProtectionData") {
        system.content_protection_data = Some(doc.text_content(cpd));
    }
    if let Some(ss) = doc.find_child(node, CPIX_NS, "SmoothStreamingProtectionHeaderData") {
        system.smooth_streaming_protection_header_data = Some(doc.text_content(ss));
    }
    for hls in doc.find_children(node, CPIX_NS, "HLSSignalingData") {
        let payload = doc.text_content(hls);
        // absent playlist attribute means media playlist signaling
        match doc.attr(hls, "playlist") {
            Some("master") => system.hls_signaling_data_master = Some(payload),
            _ => system.hls_signaling_data_media = Some(payload),
        }
    }

    Ok(system)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drm_system_with_payloads() {
        let doc = XmlDocument::parse(
            r#"<CPIX xmlns="urn:dashif:org:cpix">
                 <DRMSystem systemId="edef8ba9-79d6-4ace-a3c8-27dcd51d21ed" kid="f81d4fae-7dec-11d0-a765-00a0c91e6bf6">
                   <PSSH>cHNzaA==</PSSH>
                   <HLSSignalingData playlist="master">bWFzdGVy</HLSSignalingData>
                   <HLSSignalingData playlist="media">bWVkaWE=</HLSSignalingData>
                 </DRMSystem>
               </CPIX>"#,
        )
        .unwrap();
        let node = doc.child_elements(doc.root())[0];
        let system = parse_drm_system(&doc, node).unwrap();
        assert_eq!(
            system.system_id.to_string(),
            "edef8ba9-79d6-4ace-a3c8-27dcd51d21ed"
        );
        assert_eq!(system.pssh.as_deref(), Some("cHNzaA=="));
        assert_eq!(system.hls_signaling_data_master.as_deref(), Some("bWFzdGVy"));
        assert_eq!(system.hls_signaling_data_media.as_deref(), Some("bWVkaWE="));
        assert!(system.content_protection_data.is_none());
    }

    #[test]
    fn test_missing_system_id_rejected() {
        let doc = XmlDocument::parse(
            r#"<CPIX xmlns="urn:dashif:org:cpix"><DRMSystem kid="f81d4fae-7dec-11d0-a765-00a0c91e6bf6"/></CPIX>"#,
        )
        .unwrap();
        let node = doc.child_elements(doc.root())[0];
        assert!(parse_drm_system(&doc, node).is_err());
    }
}
