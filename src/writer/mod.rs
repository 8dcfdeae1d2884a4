//! Serialization of entities into the backing tree
//!
//! One submodule per container kind. New entities are serialized into their
//! container at save time; existing entities keep their loaded nodes and
//! are never re-serialized, which is what keeps collection signatures over
//! loaded content verifiable.

pub(crate) mod content_key;
pub(crate) mod content_key_period;
pub(crate) mod delivery_data;
pub(crate) mod drm_system;
pub(crate) mod usage_rule;

use crate::collection::CollectionKind;
use crate::model::{CPIX_NS, CPIX_VERSION, PSKC_NS, XMLDSIG_NS, XMLENC_NS};
use crate::xmltree::{NodeId, QName, XmlDocument};

/// Element name in the CPIX namespace (unprefixed, default namespace)
pub(crate) fn cpix(local: &str) -> QName {
    QName::new(None, local)
}

/// Element name in the PSKC namespace
pub(crate) fn pskc(local: &str) -> QName {
    QName::new(Some("pskc"), local)
}

/// Element name in the XML digital signature namespace
pub(crate) fn ds(local: &str) -> QName {
    QName::new(Some("ds"), local)
}

/// Element name in the XML encryption namespace
pub(crate) fn xenc(local: &str) -> QName {
    QName::new(Some("xenc"), local)
}

/// Create the backing tree for a document that has never been saved
pub(crate) fn new_document_tree(content_id: Option<&str>) -> XmlDocument {
    let mut doc = XmlDocument::with_root(
        cpix("CPIX"),
        vec![
            (None, CPIX_NS.to_string()),
            (Some("pskc".to_string()), PSKC_NS.to_string()),
            (Some("ds".to_string()), XMLDSIG_NS.to_string()),
            (Some("xenc".to_string()), XMLENC_NS.to_string()),
        ],
    );
    let root = doc.root();
    doc.set_attr(root, QName::new(None, "version"), CPIX_VERSION);
    if let Some(content_id) = content_id {
        doc.set_attr(root, QName::new(None, "contentId"), content_id);
    }
    doc
}

/// Create a child element and append it to a parent
pub(crate) fn child(doc: &mut XmlDocument, parent: NodeId, name: QName) -> NodeId {
    let node = doc.create_element(name);
    doc.append_child(parent, node);
    node
}

/// Create a child element holding only text content
pub(crate) fn text_child(doc: &mut XmlDocument, parent: NodeId, name: QName, text: &str) -> NodeId {
    let node = child(doc, parent, name);
    doc.set_text(node, text);
    node
}

/// Find or create the container element for a collection kind
///
/// A created container is inserted at its schema-mandated position: before
/// any container that sorts later in the fixed top-level order and before
/// any root-level signature element.
pub(crate) fn ensure_container(doc: &mut XmlDocument, kind: CollectionKind) -> NodeId {
    let root = doc.root();
    if let Some(existing) = doc.find_child(root, CPIX_NS, kind.container_name()) {
        return existing;
    }

    let mut insert_at = None;
    for (position, sibling) in doc.child_elements(root).into_iter().enumerate() {
        let Some(elem) = doc.element(sibling) else {
            continue;
        };
        let is_later_container = CollectionKind::all().iter().any(|other| {
            other.order_index() > kind.order_index()
                && elem.name.local == other.container_name()
                && doc.element_namespace(sibling) == Some(CPIX_NS)
        });
        let is_signature = elem.name.local == "Signature"
            && doc.element_namespace(sibling) == Some(XMLDSIG_NS);
        if is_later_container || is_signature {
            insert_at = Some(position);
            break;
        }
    }

    let container = doc.create_element(cpix(kind.container_name()));
    match insert_at {
        Some(position) => doc.insert_child(root, position, container),
        None => doc.append_child(root, container),
    }
    container
}
