//! Structural schema gate
//!
//! Every loaded tree and every save buffer passes through this validator:
//! root element and namespace, container ordering, per-kind child shapes,
//! required attributes and document-wide id uniqueness. The gate is a hard
//! boundary in both directions — a load failure is the ordinary signal of
//! malformed input, a save failure means this crate produced non-conforming
//! output and is reported as an internal defect by the caller.
//!
//! Usage-rule children are deliberately open: unknown filter elements are
//! schema-valid and handled by the unsupported-filter marking instead.

use crate::collection::CollectionKind;
use crate::error::{Error, Result};
use crate::model::{CPIX_NS, PSKC_NS, XMLDSIG_NS};
use crate::xmltree::{NodeId, XmlDocument};
use std::collections::HashSet;

/// Attributes accepted on the root element
const ROOT_ATTRIBUTES: [&str; 3] = ["id", "contentId", "version"];

/// Validate the structure of a parsed tree
pub(crate) fn validate(doc: &XmlDocument) -> Result<()> {
    let root = doc.root();
    let root_elem = doc
        .element(root)
        .ok_or_else(|| Error::InvalidFormat("Document has no root element".to_string()))?;

    if root_elem.name.local != "CPIX" || doc.element_namespace(root) != Some(CPIX_NS) {
        return Err(Error::InvalidFormat(format!(
            "Root element is '{}' in namespace '{}'; expected 'CPIX' in '{}'",
            root_elem.name.local,
            doc.element_namespace(root).unwrap_or("<none>"),
            CPIX_NS
        )));
    }

    for attr in &root_elem.attributes {
        if attr.name.prefix.is_none() && !ROOT_ATTRIBUTES.contains(&attr.name.local.as_str()) {
            return Err(Error::InvalidFormat(format!(
                "Unknown attribute '{}' on the root element",
                attr.name.local
            )));
        }
    }

    validate_top_level_order(doc, root)?;
    validate_unique_ids(doc, root)?;

    for kind in CollectionKind::all() {
        if let Some(container) = doc.find_child(root, CPIX_NS, kind.container_name()) {
            validate_container(doc, container, kind)?;
        }
    }

    for signature in doc.find_children(root, XMLDSIG_NS, "Signature") {
        validate_signature_shape(doc, signature)?;
    }

    Ok(())
}

fn validate_top_level_order(doc: &XmlDocument, root: NodeId) -> Result<()> {
    let mut last_order: Option<usize> = None;
    let mut seen_signature = false;
    let mut seen: HashSet<&'static str> = HashSet::new();

    for child in doc.child_elements(root) {
        let Some(elem) = doc.element(child) else {
            continue;
        };
        let ns = doc.element_namespace(child);

        if ns == Some(XMLDSIG_NS) && elem.name.local == "Signature" {
            seen_signature = true;
            continue;
        }

        let kind = CollectionKind::all()
            .into_iter()
            .find(|k| ns == Some(CPIX_NS) && elem.name.local == k.container_name());
        let Some(kind) = kind else {
            return Err(Error::InvalidFormat(format!(
                "Unknown top-level element '<{}>'",
                elem.name.local
            )));
        };

        if seen_signature {
            return Err(Error::InvalidFormat(format!(
                "Container '<{}>' appears after a signature element",
                kind.container_name()
            )));
        }
        if !seen.insert(kind.container_name()) {
            return Err(Error::InvalidFormat(format!(
                "Container '<{}>' appears more than once",
                kind.container_name()
            )));
        }
        if let Some(last) = last_order {
            if kind.order_index() < last {
                return Err(Error::InvalidFormat(format!(
                    "Container '<{}>' is out of order",
                    kind.container_name()
                )));
            }
        }
        last_order = Some(kind.order_index());
    }
    Ok(())
}

/// CPIX id attributes have xs:ID semantics: unique across the document
fn validate_unique_ids(doc: &XmlDocument, root: NodeId) -> Result<()> {
    let mut seen = HashSet::new();
    for node in doc.descendants(root) {
        if let Some(id) = doc.attr(node, "id") {
            if !seen.insert(id.to_string()) {
                return Err(Error::InvalidFormat(format!(
                    "Duplicate id '{}' in document",
                    id
                )));
            }
        }
    }
    Ok(())
}

fn validate_container(doc: &XmlDocument, container: NodeId, kind: CollectionKind) -> Result<()> {
    let entry_name = match kind {
        CollectionKind::DeliveryData => "DeliveryData",
        CollectionKind::ContentKeys => "ContentKey",
        CollectionKind::ContentKeyPeriods => "ContentKeyPeriod",
        CollectionKind::DrmSystems => "DRMSystem",
        CollectionKind::UsageRules => "ContentKeyUsageRule",
    };

    for child in doc.child_elements(container) {
        let Some(elem) = doc.element(child) else {
            continue;
        };
        if elem.name.local != entry_name || doc.element_namespace(child) != Some(CPIX_NS) {
            return Err(Error::InvalidFormat(format!(
                "Container '<{}>' holds unexpected element '<{}>'",
                kind.container_name(),
                elem.name.local
            )));
        }
        match kind {
            CollectionKind::DeliveryData => validate_delivery_data_shape(doc, child)?,
            CollectionKind::ContentKeys => validate_content_key_shape(doc, child)?,
            CollectionKind::ContentKeyPeriods => validate_period_shape(doc, child)?,
            CollectionKind::DrmSystems => validate_drm_system_shape(doc, child)?,
            CollectionKind::UsageRules => {
                require_attr(doc, child, "ContentKeyUsageRule", "kid")?;
                // filter children intentionally unchecked
            }
        }
    }
    Ok(())
}

fn validate_delivery_data_shape(doc: &XmlDocument, node: NodeId) -> Result<()> {
    for required in ["DeliveryKey", "DocumentKey", "MACMethod"] {
        if doc.find_child(node, CPIX_NS, required).is_none() {
            return Err(Error::InvalidFormat(format!(
                "DeliveryData entry is missing its <{}> child",
                required
            )));
        }
    }
    Ok(())
}

fn validate_content_key_shape(doc: &XmlDocument, node: NodeId) -> Result<()> {
    require_attr(doc, node, "ContentKey", "kid")?;
    if let Some(data) = doc.find_child(node, CPIX_NS, "Data") {
        if doc.find_child(data, PSKC_NS, "Secret").is_none() {
            return Err(Error::InvalidFormat(
                "ContentKey <Data> is missing its <pskc:Secret> child".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_period_shape(doc: &XmlDocument, node: NodeId) -> Result<()> {
    require_attr(doc, node, "ContentKeyPeriod", "id")?;
    let has_index = doc.attr(node, "index").is_some();
    let has_span = doc.attr(node, "start").is_some() || doc.attr(node, "end").is_some();
    if has_index && has_span {
        return Err(Error::InvalidFormat(
            "ContentKeyPeriod carries both an index and instants".to_string(),
        ));
    }
    if !has_index && !(doc.attr(node, "start").is_some() && doc.attr(node, "end").is_some()) {
        return Err(Error::InvalidFormat(
            "ContentKeyPeriod needs an index or both start and end".to_string(),
        ));
    }
    Ok(())
}

fn validate_drm_system_shape(doc: &XmlDocument, node: NodeId) -> Result<()> {
    require_attr(doc, node, "DRMSystem", "systemId")?;
    require_attr(doc, node, "DRMSystem", "kid")?;
    for child in doc.child_elements(node) {
        let Some(elem) = doc.element(child) else {
            continue;
        };
        match elem.name.local.as_str() {
            "PSSH" | "ContentProtectionData" | "SmoothStreamingProtectionHeaderData" => {}
            "HLSSignalingData" => {
                if let Some(playlist) = doc.attr(child, "playlist") {
                    if playlist != "master" && playlist != "media" {
                        return Err(Error::InvalidFormat(format!(
                            "HLSSignalingData playlist '{}' must be 'master' or 'media'",
                            playlist
                        )));
                    }
                }
            }
            other => {
                return Err(Error::InvalidFormat(format!(
                    "DRMSystem holds unexpected element '<{}>'",
                    other
                )));
            }
        }
    }
    Ok(())
}

fn validate_signature_shape(doc: &XmlDocument, node: NodeId) -> Result<()> {
    for required in ["SignedInfo", "SignatureValue", "KeyInfo"] {
        if doc.find_child(node, XMLDSIG_NS, required).is_none() {
            return Err(Error::InvalidFormat(format!(
                "Signature element is missing its <ds:{}> child",
                required
            )));
        }
    }
    Ok(())
}

fn require_attr(doc: &XmlDocument, node: NodeId, element: &str, attribute: &str) -> Result<()> {
    if doc.attr(node, attribute).is_none() {
        return Err(Error::InvalidFormat(format!(
            "Element '<{}>' is missing required attribute '{}'",
            element, attribute
        )));
    }
    Ok(())
}
