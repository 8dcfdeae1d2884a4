//! DRM system serialization

use super::{child, cpix, text_child};
use crate::error::Result;
use crate::model::DrmSystem;
use crate::xmltree::{NodeId, QName, XmlDocument};

/// Serialize one DRM system entry into the container
pub(crate) fn write_drm_system(
    doc: &mut XmlDocument,
    container: NodeId,
    system: &DrmSystem,
) -> Result<NodeId> {
    let node = child(doc, container, cpix("DRMSystem"));
    doc.set_attr(node, QName::new(None, "systemId"), &system.system_id.to_string());
    doc.set_attr(node, QName::new(None, "kid"), &system.kid.to_string());

    if let Some(ref pssh) = system.pssh {
        text_child(doc, node, cpix("PSSH"), pssh);
    }
    if let Some(ref cpd) = system.content_protection_data {
        text_child(doc, node, cpix("ContentProtectionData"), cpd);
    }
    if let Some(ref master) = system.hls_signaling_data_master {
        let hls = text_child(doc, node, cpix("HLSSignalingData"), master);
        doc.set_attr(hls, QName::new(None, "playlist"), "master");
    }
    if let Some(ref media) = system.hls_signaling_data_media {
        let hls = text_child(doc, node, cpix("HLSSignalingData"), media);
        doc.set_attr(hls, QName::new(None, "playlist"), "media");
    }
    if let Some(ref smooth) = system.smooth_streaming_protection_header_data {
        text_child(doc, node, cpix("SmoothStreamingProtectionHeaderData"), smooth);
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionKind;
    use crate::writer::{ensure_container, new_document_tree};
    use uuid::Uuid;

    #[test]
    fn test_drm_system_round_trips_through_parser() {
        let mut doc = new_document_tree(None);
        let container = ensure_container(&mut doc, CollectionKind::DrmSystems);
        let mut system = DrmSystem::new(Uuid::new_v4(), Uuid::new_v4());
        system.pssh = Some("cHNzaA==".to_string());
        system.hls_signaling_data_master = Some("bWFzdGVy".to_string());
        system.hls_signaling_data_media = Some("bWVkaWE=".to_string());

        let node = write_drm_system(&mut doc, container, &system).unwrap();
        let parsed = crate::parser::drm_system::parse_drm_system(&doc, node).unwrap();
        assert_eq!(parsed, system);
    }
}
