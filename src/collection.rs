//! Entity collection framework
//!
//! Every entity kind lives in one [`EntityCollection`]: an ordered container
//! that tracks, per entry, whether the entity is *new* (accepted by the
//! caller, not yet serialized) or *existing* (parsed from a loaded document
//! and bound to its backing node). A collection also owns the signature
//! bookkeeping for its container element: applied signature nodes freeze
//! the collection, queued signers are applied at the next save.
//!
//! Mutation entry points live on [`crate::Document`], which runs entity and
//! cross-collection validation before handing entities to the collection;
//! the collection itself only implements the storage and lifecycle rules.

use crate::crypto::signature::AppliedSignature;
use crate::crypto::{Certificate, Signer};
use crate::model::{ContentKey, ContentKeyPeriod, DrmSystem, Recipient, UsageRule};
use crate::xmltree::{NodeId, XmlDocument};

/// Identifies one of the five entity collections of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Recipients and their wrapped document secrets
    DeliveryData,
    /// Content keys
    ContentKeys,
    /// Content key periods
    ContentKeyPeriods,
    /// DRM system signaling entries
    DrmSystems,
    /// Content key usage rules
    UsageRules,
}

impl CollectionKind {
    /// The container element name in a document
    pub(crate) fn container_name(&self) -> &'static str {
        match self {
            CollectionKind::DeliveryData => "DeliveryDataList",
            CollectionKind::ContentKeys => "ContentKeyList",
            CollectionKind::ContentKeyPeriods => "ContentKeyPeriodList",
            CollectionKind::DrmSystems => "DRMSystemList",
            CollectionKind::UsageRules => "ContentKeyUsageRuleList",
        }
    }

    /// Position in the schema-mandated top-level ordering
    pub(crate) fn order_index(&self) -> usize {
        match self {
            CollectionKind::DeliveryData => 0,
            CollectionKind::ContentKeys => 1,
            CollectionKind::ContentKeyPeriods => 2,
            CollectionKind::DrmSystems => 3,
            CollectionKind::UsageRules => 4,
        }
    }

    /// Prefix for generated container reference ids (NCName-safe)
    pub(crate) fn id_prefix(&self) -> &'static str {
        match self {
            CollectionKind::DeliveryData => "delivery-data-list",
            CollectionKind::ContentKeys => "content-key-list",
            CollectionKind::ContentKeyPeriods => "content-key-period-list",
            CollectionKind::DrmSystems => "drm-system-list",
            CollectionKind::UsageRules => "usage-rule-list",
        }
    }

    /// All kinds in schema order
    pub(crate) fn all() -> [CollectionKind; 5] {
        [
            CollectionKind::DeliveryData,
            CollectionKind::ContentKeys,
            CollectionKind::ContentKeyPeriods,
            CollectionKind::DrmSystems,
            CollectionKind::UsageRules,
        ]
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::ContentKey {}
    impl Sealed for super::Recipient {}
    impl Sealed for super::ContentKeyPeriod {}
    impl Sealed for super::DrmSystem {}
    impl Sealed for super::UsageRule {}
}

/// Implemented by the closed set of CPIX entity kinds
///
/// The trait is sealed: the entity kinds of a document are fixed by the
/// format, and validation lives in free functions rather than on the
/// entities themselves.
pub trait CollectionEntity: Clone + sealed::Sealed {
    /// The collection this entity kind belongs to
    fn kind() -> CollectionKind;

    /// Identity comparison used for duplicate detection and removal
    fn is_same_entity(&self, other: &Self) -> bool;
}

impl CollectionEntity for ContentKey {
    fn kind() -> CollectionKind {
        CollectionKind::ContentKeys
    }
    fn is_same_entity(&self, other: &Self) -> bool {
        self.kid == other.kid
    }
}

impl CollectionEntity for Recipient {
    fn kind() -> CollectionKind {
        CollectionKind::DeliveryData
    }
    fn is_same_entity(&self, other: &Self) -> bool {
        self.certificate == other.certificate
    }
}

impl CollectionEntity for ContentKeyPeriod {
    fn kind() -> CollectionKind {
        CollectionKind::ContentKeyPeriods
    }
    fn is_same_entity(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl CollectionEntity for DrmSystem {
    fn kind() -> CollectionKind {
        CollectionKind::DrmSystems
    }
    fn is_same_entity(&self, other: &Self) -> bool {
        self.system_id == other.system_id && self.kid == other.kid
    }
}

impl CollectionEntity for UsageRule {
    fn kind() -> CollectionKind {
        CollectionKind::UsageRules
    }
    fn is_same_entity(&self, other: &Self) -> bool {
        self == other
    }
}

/// One stored entity and, for existing entities, its backing node
#[derive(Debug, Clone)]
pub(crate) struct Entry<T> {
    pub entity: T,
    /// `None` while the entity is new; set when it is bound at save or load
    pub node: Option<NodeId>,
}

/// Ordered storage, validation gate and signature bookkeeping for one
/// entity kind
#[derive(Debug, Clone)]
pub struct EntityCollection<T: CollectionEntity> {
    pub(crate) entries: Vec<Entry<T>>,
    /// Backing container element, present once serialized or loaded
    pub(crate) container: Option<NodeId>,
    /// Signatures present in the tree that reference this container
    pub(crate) applied_signatures: Vec<AppliedSignature>,
    /// Signers queued for application at the next save
    pub(crate) pending_signers: Vec<Signer>,
}

impl<T: CollectionEntity> Default for EntityCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CollectionEntity> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            container: None,
            applied_signatures: Vec::new(),
            pending_signers: Vec::new(),
        }
    }

    /// Number of entities, new and existing
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the collection holds no entities
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entities in document order (existing first, then new in
    /// insertion order)
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|e| &e.entity)
    }

    /// Entity by position
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index).map(|e| &e.entity)
    }

    /// True when the collection carries at least one applied signature and
    /// is therefore read-only
    pub fn is_signed(&self) -> bool {
        !self.applied_signatures.is_empty()
    }

    /// Certificates of applied signatures and queued signers
    pub fn signer_certificates(&self) -> Vec<&Certificate> {
        self.applied_signatures
            .iter()
            .map(|s| &s.certificate)
            .chain(self.pending_signers.iter().map(|s| s.certificate()))
            .collect()
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index).map(|e| &mut e.entity)
    }

    pub(crate) fn contains(&self, entity: &T) -> bool {
        self.entries
            .iter()
            .any(|e| e.entity.is_same_entity(entity))
    }

    /// Accept a validated entity into the new bucket
    pub(crate) fn push_new(&mut self, entity: T) {
        self.entries.push(Entry { entity, node: None });
    }

    /// Bind a loaded entity to its backing node
    pub(crate) fn bind_existing(&mut self, entity: T, node: NodeId) {
        self.entries.push(Entry {
            entity,
            node: Some(node),
        });
    }

    /// Remove an entity; detaches the backing node of an existing entity.
    /// Returns false (a silent no-op) when the entity is unknown.
    pub(crate) fn remove_entity(&mut self, xml: Option<&mut XmlDocument>, entity: &T) -> bool {
        let Some(index) = self
            .entries
            .iter()
            .position(|e| e.entity.is_same_entity(entity))
        else {
            return false;
        };
        let entry = self.entries.remove(index);
        if let (Some(node), Some(xml)) = (entry.node, xml) {
            xml.detach(node);
        }
        true
    }

    /// Empty both buckets, detaching all existing nodes
    pub(crate) fn clear_entries(&mut self, xml: Option<&mut XmlDocument>) {
        if let Some(xml) = xml {
            for entry in &self.entries {
                if let Some(node) = entry.node {
                    xml.detach(node);
                }
            }
        }
        self.entries.clear();
    }

    /// True when any entity is bound to a backing node
    pub(crate) fn has_existing_entries(&self) -> bool {
        self.entries.iter().any(|e| e.node.is_some())
    }

    /// Queue a signer for the next save
    pub(crate) fn queue_signer(&mut self, signer: Signer) {
        self.pending_signers.push(signer);
    }

    /// Detach all applied signature nodes and forget queued signers
    pub(crate) fn remove_signatures(&mut self, xml: Option<&mut XmlDocument>) {
        if let Some(xml) = xml {
            for signature in &self.applied_signatures {
                xml.detach(signature.node);
            }
        }
        self.applied_signatures.clear();
        self.pending_signers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_new_entities_are_unbound() {
        let mut collection: EntityCollection<ContentKey> = EntityCollection::new();
        collection.push_new(ContentKey::new(Uuid::new_v4()));
        assert_eq!(collection.len(), 1);
        assert!(collection.entries[0].node.is_none());
        assert!(!collection.has_existing_entries());
    }

    #[test]
    fn test_duplicate_detection_by_kid() {
        let kid = Uuid::new_v4();
        let mut collection: EntityCollection<ContentKey> = EntityCollection::new();
        collection.push_new(ContentKey::new(kid));
        assert!(collection.contains(&ContentKey::with_value(kid, vec![0u8; 16])));
        assert!(!collection.contains(&ContentKey::new(Uuid::new_v4())));
    }

    #[test]
    fn test_remove_unknown_is_silent_noop() {
        let mut collection: EntityCollection<ContentKey> = EntityCollection::new();
        assert!(!collection.remove_entity(None, &ContentKey::new(Uuid::new_v4())));
    }

    #[test]
    fn test_drm_system_identity_is_pairwise() {
        let system = Uuid::new_v4();
        let kid_a = Uuid::new_v4();
        let kid_b = Uuid::new_v4();
        let mut collection: EntityCollection<DrmSystem> = EntityCollection::new();
        collection.push_new(DrmSystem::new(system, kid_a));
        assert!(collection.contains(&DrmSystem::new(system, kid_a)));
        assert!(!collection.contains(&DrmSystem::new(system, kid_b)));
    }

    #[test]
    fn test_container_order_matches_schema() {
        let order: Vec<usize> = CollectionKind::all()
            .iter()
            .map(|k| k.order_index())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }
}
