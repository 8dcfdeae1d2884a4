//! The CPIX document aggregate
//!
//! A [`Document`] owns the backing XML tree, the five entity collections,
//! the document-wide symmetric secrets and the signer state, and
//! orchestrates saving and loading.
//!
//! Entities accepted into a collection stay *new* until the next save
//! serializes them and binds them to their freshly created nodes; entities
//! parsed from a loaded document are bound 1:1 to their backing nodes from
//! the start. Existing entities are never re-serialized, which is what
//! keeps signatures over loaded content verifiable across an edit-and-save
//! cycle.
//!
//! A collection becomes read-only the instant it carries an applied
//! signature; the whole document becomes read-only when it carries an
//! enveloped document signature. All mutation is refused until the
//! relevant signatures are explicitly removed.

use crate::collection::{CollectionEntity, CollectionKind, EntityCollection};
use crate::crypto::signature::{self as xmlsig, AppliedSignature};
use crate::crypto::{Certificate, DecryptionKey, DocumentSecrets, Signer, envelope};
use crate::error::{Error, Result};
use crate::model::{
    CPIX_NS, CPIX_VERSION, ContentKey, ContentKeyPeriod, DrmSystem, Recipient, UsageRule,
    XMLDSIG_NS,
};
use crate::parser;
use crate::resolve::{ContentKeyContext, resolve_content_key};
use crate::schema;
use crate::validator;
use crate::writer;
use crate::xmltree::{NodeId, QName, XmlDocument};
use std::io::{Read, Write};
use uuid::Uuid;

/// A CPIX document: entity collections, document secrets and signatures
///
/// # Example
///
/// ```no_run
/// use cpix::{ContentKey, Document};
/// use uuid::Uuid;
///
/// # fn main() -> cpix::Result<()> {
/// let mut document = Document::new();
/// document.add_content_key(ContentKey::with_value(Uuid::new_v4(), vec![0u8; 16]))?;
///
/// let mut buffer = Vec::new();
/// document.save(&mut buffer)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Document {
    pub(crate) xml: Option<XmlDocument>,
    content_id: Option<String>,
    recipients: EntityCollection<Recipient>,
    content_keys: EntityCollection<ContentKey>,
    content_key_periods: EntityCollection<ContentKeyPeriod>,
    drm_systems: EntityCollection<DrmSystem>,
    usage_rules: EntityCollection<UsageRule>,
    secrets: Option<DocumentSecrets>,
    document_signature: Option<AppliedSignature>,
    pending_document_signer: Option<Signer>,
    content_keys_readable: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document: all collections writable, content keys
    /// readable by definition
    pub fn new() -> Self {
        Self {
            xml: None,
            content_id: None,
            recipients: EntityCollection::new(),
            content_keys: EntityCollection::new(),
            content_key_periods: EntityCollection::new(),
            drm_systems: EntityCollection::new(),
            usage_rules: EntityCollection::new(),
            secrets: None,
            document_signature: None,
            pending_document_signer: None,
            content_keys_readable: true,
        }
    }

    // ---- accessors ----

    /// The recipients (delivery data) of this document
    pub fn recipients(&self) -> &EntityCollection<Recipient> {
        &self.recipients
    }

    /// The content keys of this document
    pub fn content_keys(&self) -> &EntityCollection<ContentKey> {
        &self.content_keys
    }

    /// The content key periods of this document
    pub fn content_key_periods(&self) -> &EntityCollection<ContentKeyPeriod> {
        &self.content_key_periods
    }

    /// The DRM system entries of this document
    pub fn drm_systems(&self) -> &EntityCollection<DrmSystem> {
        &self.drm_systems
    }

    /// The usage rules of this document
    pub fn usage_rules(&self) -> &EntityCollection<UsageRule> {
        &self.usage_rules
    }

    /// Optional content identifier carried on the root element
    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    /// Set or clear the content identifier
    pub fn set_content_id(&mut self, content_id: Option<String>) -> Result<()> {
        self.ensure_document_writable()?;
        self.content_id = content_id;
        Ok(())
    }

    /// True when the document carries an applied enveloped signature and is
    /// therefore read-only as a whole
    pub fn is_read_only(&self) -> bool {
        self.document_signature.is_some()
    }

    /// Whether content-key values are available in plaintext
    ///
    /// True for any document built in memory, and for a loaded document
    /// exactly when a usable delivery key was supplied or the document has
    /// no recipients.
    pub fn content_keys_readable(&self) -> bool {
        self.content_keys_readable
    }

    /// Identity of the whole-document signer, applied or pending
    pub fn signed_by(&self) -> Option<&Certificate> {
        self.document_signature
            .as_ref()
            .map(|s| &s.certificate)
            .or_else(|| self.pending_document_signer.as_ref().map(|s| s.certificate()))
    }

    // ---- entity mutation ----

    /// Add a content key
    ///
    /// Rejects when the document or the content-key collection is
    /// read-only, on duplicate key ids, and on invalid key material.
    pub fn add_content_key(&mut self, key: ContentKey) -> Result<()> {
        self.ensure_writable(CollectionKind::ContentKeys)?;
        validator::validate_content_key(&key)?;
        if self.content_keys.contains(&key) {
            return Err(Error::IllegalState(format!(
                "The document already contains content key '{}'",
                key.kid
            )));
        }
        self.content_keys.push_new(key);
        Ok(())
    }

    /// Add a recipient
    ///
    /// Adding the first recipient while the document holds loaded,
    /// unencrypted content keys is rejected: it would silently start
    /// encrypting previously plaintext keys. Re-add those keys explicitly
    /// to signal that intent.
    pub fn add_recipient(&mut self, recipient: Recipient) -> Result<()> {
        self.ensure_writable(CollectionKind::DeliveryData)?;
        validator::validate_recipient(&recipient)?;
        if self.recipients.contains(&recipient) {
            return Err(Error::IllegalState(format!(
                "The document already contains recipient '{}'",
                recipient.certificate.subject()
            )));
        }
        if self.recipients.is_empty() && self.has_existing_plain_keys() {
            return Err(Error::IllegalState(
                "The document holds loaded content keys stored in plaintext; \
                 adding a recipient would silently encrypt them on the next save. \
                 Re-add the affected content keys explicitly to change their protection."
                    .to_string(),
            ));
        }
        self.recipients.push_new(recipient);
        Ok(())
    }

    /// Add a content key period
    pub fn add_content_key_period(&mut self, period: ContentKeyPeriod) -> Result<()> {
        self.ensure_writable(CollectionKind::ContentKeyPeriods)?;
        validator::validate_content_key_period(&period)?;
        if self.content_key_periods.contains(&period) {
            return Err(Error::IllegalState(format!(
                "The document already contains content key period '{}'",
                period.id
            )));
        }
        self.content_key_periods.push_new(period);
        Ok(())
    }

    /// Add a DRM system entry
    pub fn add_drm_system(&mut self, system: DrmSystem) -> Result<()> {
        self.ensure_writable(CollectionKind::DrmSystems)?;
        validator::validate_drm_system_references(self, &system)?;
        if self.drm_systems.contains(&system) {
            return Err(Error::IllegalState(format!(
                "The document already contains a DRM system entry for system '{}' and key '{}'",
                system.system_id, system.kid
            )));
        }
        self.drm_systems.push_new(system);
        Ok(())
    }

    /// Add a usage rule
    ///
    /// A rule flagged as carrying unsupported filters (only ever set on
    /// loaded rules) cannot be freshly re-added.
    pub fn add_usage_rule(&mut self, rule: UsageRule) -> Result<()> {
        self.ensure_writable(CollectionKind::UsageRules)?;
        if rule.contains_unsupported_filters() {
            return Err(Error::IllegalState(
                "A usage rule carrying unsupported filters cannot be added; \
                 it can only round-trip unchanged from a loaded document"
                    .to_string(),
            ));
        }
        validator::validate_usage_rule(&rule)?;
        validator::validate_usage_rule_references(self, &rule)?;
        if self.usage_rules.contains(&rule) {
            return Err(Error::IllegalState(
                "The document already contains an identical usage rule".to_string(),
            ));
        }
        self.usage_rules.push_new(rule);
        Ok(())
    }

    /// Remove a content key; silently succeeds when the key is unknown
    pub fn remove_content_key(&mut self, key: &ContentKey) -> Result<()> {
        self.ensure_writable(CollectionKind::ContentKeys)?;
        self.content_keys.remove_entity(self.xml.as_mut(), key);
        Ok(())
    }

    /// Remove a recipient; silently succeeds when the recipient is unknown
    pub fn remove_recipient(&mut self, recipient: &Recipient) -> Result<()> {
        self.ensure_writable(CollectionKind::DeliveryData)?;
        self.recipients.remove_entity(self.xml.as_mut(), recipient);
        Ok(())
    }

    /// Remove a content key period; silently succeeds when unknown
    pub fn remove_content_key_period(&mut self, period: &ContentKeyPeriod) -> Result<()> {
        self.ensure_writable(CollectionKind::ContentKeyPeriods)?;
        self.content_key_periods
            .remove_entity(self.xml.as_mut(), period);
        Ok(())
    }

    /// Remove a DRM system entry; silently succeeds when unknown
    pub fn remove_drm_system(&mut self, system: &DrmSystem) -> Result<()> {
        self.ensure_writable(CollectionKind::DrmSystems)?;
        self.drm_systems.remove_entity(self.xml.as_mut(), system);
        Ok(())
    }

    /// Remove a usage rule; silently succeeds when unknown
    pub fn remove_usage_rule(&mut self, rule: &UsageRule) -> Result<()> {
        self.ensure_writable(CollectionKind::UsageRules)?;
        self.usage_rules.remove_entity(self.xml.as_mut(), rule);
        Ok(())
    }

    /// Remove every content key
    pub fn clear_content_keys(&mut self) -> Result<()> {
        self.ensure_writable(CollectionKind::ContentKeys)?;
        self.content_keys.clear_entries(self.xml.as_mut());
        Ok(())
    }

    /// Remove every recipient
    pub fn clear_recipients(&mut self) -> Result<()> {
        self.ensure_writable(CollectionKind::DeliveryData)?;
        self.recipients.clear_entries(self.xml.as_mut());
        Ok(())
    }

    /// Remove every content key period
    pub fn clear_content_key_periods(&mut self) -> Result<()> {
        self.ensure_writable(CollectionKind::ContentKeyPeriods)?;
        self.content_key_periods.clear_entries(self.xml.as_mut());
        Ok(())
    }

    /// Remove every DRM system entry
    pub fn clear_drm_systems(&mut self) -> Result<()> {
        self.ensure_writable(CollectionKind::DrmSystems)?;
        self.drm_systems.clear_entries(self.xml.as_mut());
        Ok(())
    }

    /// Remove every usage rule
    pub fn clear_usage_rules(&mut self) -> Result<()> {
        self.ensure_writable(CollectionKind::UsageRules)?;
        self.usage_rules.clear_entries(self.xml.as_mut());
        Ok(())
    }

    /// Mutable access to an accepted content key
    ///
    /// Entities stay mutable reference objects until committed; everything
    /// is re-validated at save time, so corruption through this handle is
    /// caught before anything is written out.
    pub fn content_key_mut(&mut self, index: usize) -> Result<&mut ContentKey> {
        self.ensure_writable(CollectionKind::ContentKeys)?;
        self.content_keys
            .get_mut(index)
            .ok_or_else(|| Error::InvalidData(format!("No content key at index {}", index)))
    }

    /// Mutable access to an accepted usage rule
    pub fn usage_rule_mut(&mut self, index: usize) -> Result<&mut UsageRule> {
        self.ensure_writable(CollectionKind::UsageRules)?;
        self.usage_rules
            .get_mut(index)
            .ok_or_else(|| Error::InvalidData(format!("No usage rule at index {}", index)))
    }

    /// Mutable access to an accepted content key period
    pub fn content_key_period_mut(&mut self, index: usize) -> Result<&mut ContentKeyPeriod> {
        self.ensure_writable(CollectionKind::ContentKeyPeriods)?;
        self.content_key_periods
            .get_mut(index)
            .ok_or_else(|| Error::InvalidData(format!("No content key period at index {}", index)))
    }

    /// Mutable access to an accepted DRM system entry
    pub fn drm_system_mut(&mut self, index: usize) -> Result<&mut DrmSystem> {
        self.ensure_writable(CollectionKind::DrmSystems)?;
        self.drm_systems
            .get_mut(index)
            .ok_or_else(|| Error::InvalidData(format!("No DRM system at index {}", index)))
    }

    // ---- signatures ----

    /// Queue a signature over one collection, applied at the next save
    ///
    /// Rejected when the document is read-only or the identity has already
    /// signed this collection. The collection itself stays writable until
    /// the save applies the signature.
    pub fn add_signature(&mut self, kind: CollectionKind, signer: Signer) -> Result<()> {
        self.ensure_document_writable()?;
        let already_signed = self
            .collection_signer_certificates(kind)
            .iter()
            .any(|c| *c == signer.certificate());
        if already_signed {
            return Err(Error::IllegalState(format!(
                "'{}' has already signed the {} collection",
                signer.certificate().subject(),
                kind.container_name()
            )));
        }
        match kind {
            CollectionKind::DeliveryData => self.recipients.queue_signer(signer),
            CollectionKind::ContentKeys => self.content_keys.queue_signer(signer),
            CollectionKind::ContentKeyPeriods => self.content_key_periods.queue_signer(signer),
            CollectionKind::DrmSystems => self.drm_systems.queue_signer(signer),
            CollectionKind::UsageRules => self.usage_rules.queue_signer(signer),
        }
        Ok(())
    }

    /// Detach every signature on one collection and forget queued signers,
    /// restoring its writability
    pub fn remove_signatures(&mut self, kind: CollectionKind) -> Result<()> {
        self.ensure_document_writable()?;
        let xml = self.xml.as_mut();
        match kind {
            CollectionKind::DeliveryData => self.recipients.remove_signatures(xml),
            CollectionKind::ContentKeys => self.content_keys.remove_signatures(xml),
            CollectionKind::ContentKeyPeriods => self.content_key_periods.remove_signatures(xml),
            CollectionKind::DrmSystems => self.drm_systems.remove_signatures(xml),
            CollectionKind::UsageRules => self.usage_rules.remove_signatures(xml),
        }
        Ok(())
    }

    /// Set or clear the whole-document signer
    ///
    /// Assigning a signer detaches any existing document signature and
    /// queues the signer for the next save. Assigning `None` just detaches
    /// the existing signature, restoring writability.
    pub fn set_signer(&mut self, signer: Option<Signer>) {
        if let Some(existing) = self.document_signature.take() {
            if let Some(xml) = self.xml.as_mut() {
                xml.detach(existing.node);
            }
        }
        self.pending_document_signer = signer;
    }

    // ---- resolution ----

    /// Resolve the single content key that applies to a media sample
    pub fn resolve_content_key(&self, context: &ContentKeyContext) -> Result<&ContentKey> {
        resolve_content_key(self, context)
    }

    // ---- save ----

    /// Serialize the document
    ///
    /// The output is first serialized to a buffer, re-parsed and passed
    /// through the schema gate; only then is it copied to the caller's
    /// stream. A gate failure here is reported as an internal defect and
    /// nothing is written.
    pub fn save<W: Write>(&mut self, mut output: W) -> Result<()> {
        validator::validate_document(self)?;

        let mut xml = match self.xml.take() {
            Some(xml) => xml,
            None => writer::new_document_tree(self.content_id.as_deref()),
        };

        // A read-only document cannot have accumulated changes; serialize
        // its tree untouched so the enveloped signature stays intact.
        let result = if self.is_read_only() {
            Ok(())
        } else {
            self.apply_changes(&mut xml)
        };
        let result = result.and_then(|_| {
            let mut buffer = Vec::new();
            xml.write_to(&mut buffer)?;
            let reparsed = XmlDocument::parse(
                std::str::from_utf8(&buffer)
                    .map_err(|e| Error::Internal(format!("Output is not UTF-8: {}", e)))?,
            )
            .map_err(|e| Error::Internal(format!("Output failed to re-parse: {}", e)))?;
            schema::validate(&reparsed)
                .map_err(|e| Error::Internal(format!("Output failed the schema gate: {}", e)))?;
            output.write_all(&buffer)?;
            Ok(())
        });

        self.xml = Some(xml);
        result
    }

    fn apply_changes(&mut self, xml: &mut XmlDocument) -> Result<()> {
        let root = xml.root();
        match self.content_id {
            Some(ref content_id) => xml.set_attr(root, QName::new(None, "contentId"), content_id),
            None => xml.remove_attr(root, "contentId"),
        }
        if xml.attr(root, "version").is_none() {
            xml.set_attr(root, QName::new(None, "version"), CPIX_VERSION);
        }

        // Secrets become necessary once recipients exist and new material
        // has to be wrapped or encrypted.
        let recipients_present = !self.recipients.is_empty();
        let needs_secrets = recipients_present
            && (self
                .content_keys
                .entries
                .iter()
                .any(|e| e.node.is_none() && e.entity.value.is_some())
                || self.recipients.entries.iter().any(|e| e.node.is_none()));
        if needs_secrets && self.secrets.is_none() {
            if self.recipients.has_existing_entries() {
                // The loaded delivery data wraps secrets this session never
                // recovered; generating fresh ones would split the document.
                return Err(Error::IllegalState(
                    "The document secrets were not recovered at load time; \
                     new recipients or content keys cannot be encrypted"
                        .to_string(),
                ));
            }
            self.secrets = Some(DocumentSecrets::generate());
        }
        let secrets = self.secrets.clone();

        save_collection(
            xml,
            &mut self.recipients,
            CollectionKind::DeliveryData,
            |xml, container, recipient| {
                let secrets = secrets.as_ref().ok_or_else(|| {
                    Error::IllegalState("No document secrets available for wrapping".to_string())
                })?;
                writer::delivery_data::write_delivery_data(xml, container, recipient, secrets)
            },
        )?;

        let encrypt_with = if recipients_present {
            secrets.clone()
        } else {
            None
        };
        save_collection(
            xml,
            &mut self.content_keys,
            CollectionKind::ContentKeys,
            |xml, container, key| {
                let node =
                    writer::content_key::write_content_key(xml, container, key, encrypt_with.as_ref())?;
                key.loaded_encrypted = encrypt_with.is_some() && key.value.is_some();
                Ok(node)
            },
        )?;

        save_collection(
            xml,
            &mut self.content_key_periods,
            CollectionKind::ContentKeyPeriods,
            |xml, container, period| {
                writer::content_key_period::write_content_key_period(xml, container, period)
            },
        )?;

        save_collection(
            xml,
            &mut self.drm_systems,
            CollectionKind::DrmSystems,
            |xml, container, system| writer::drm_system::write_drm_system(xml, container, system),
        )?;

        save_collection(
            xml,
            &mut self.usage_rules,
            CollectionKind::UsageRules,
            |xml, container, rule| writer::usage_rule::write_usage_rule(xml, container, rule),
        )?;

        if let Some(signer) = self.pending_document_signer.take() {
            let node = xmlsig::sign_document(xml, &signer)?;
            self.document_signature = Some(AppliedSignature {
                node,
                certificate: signer.certificate().clone(),
            });
        }
        Ok(())
    }

    // ---- load ----

    /// Parse and validate a document
    ///
    /// Every signature in the document must verify. For each supplied
    /// decryption key whose certificate matches a delivery-data entry, the
    /// document secrets are unwrapped; content-key values are then
    /// decrypted wherever the per-key authentication tag verifies. Without
    /// usable secrets the keys load with no value and
    /// [`Document::content_keys_readable`] is false.
    pub fn load<R: Read>(mut reader: R, keys: &[DecryptionKey]) -> Result<Document> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let xml = XmlDocument::parse(&text)?;
        schema::validate(&xml)?;

        let root = xml.root();
        let mut document = Document::new();
        document.content_id = xml.attr(root, "contentId").map(str::to_string);

        // Verify every signature before trusting any content. A document
        // signature marks the whole document read-only.
        let mut container_signatures: Vec<(AppliedSignature, String)> = Vec::new();
        for node in xml.find_children(root, XMLDSIG_NS, "Signature") {
            let (certificate, reference_uri) = xmlsig::verify_signature(&xml, node)?;
            let applied = AppliedSignature { node, certificate };
            if reference_uri.is_empty() {
                if document.document_signature.is_some() {
                    return Err(Error::InvalidFormat(
                        "Multiple enveloped document signatures".to_string(),
                    ));
                }
                document.document_signature = Some(applied);
            } else {
                let id = reference_uri[1..].to_string();
                container_signatures.push((applied, id));
            }
        }

        // Delivery data: bind recipients and try to recover the secrets
        // with the supplied private keys.
        if let Some(container) = xml.find_child(root, CPIX_NS, "DeliveryDataList") {
            document.recipients.container = Some(container);
            for node in xml.find_children(container, CPIX_NS, "DeliveryData") {
                let (recipient, wrapped) = parser::delivery_data::parse_delivery_data(&xml, node)?;
                validator::validate_recipient(&recipient)?;
                if document.secrets.is_none() {
                    if let Some(key) = keys
                        .iter()
                        .find(|k| k.certificate() == &recipient.certificate)
                    {
                        document.secrets =
                            Some(envelope::unwrap_secrets(key.private_key(), &wrapped)?);
                    }
                }
                document.recipients.bind_existing(recipient, node);
            }
        }

        // Content keys, remembering still-encrypted payloads for the
        // opportunistic decryption pass at the end.
        let mut payloads = Vec::new();
        if let Some(container) = xml.find_child(root, CPIX_NS, "ContentKeyList") {
            document.content_keys.container = Some(container);
            for node in xml.find_children(container, CPIX_NS, "ContentKey") {
                let (key, payload) = parser::content_key::parse_content_key(&xml, node)?;
                document.content_keys.bind_existing(key, node);
                payloads.push(payload);
            }
        }

        if let Some(container) = xml.find_child(root, CPIX_NS, "ContentKeyPeriodList") {
            document.content_key_periods.container = Some(container);
            for node in xml.find_children(container, CPIX_NS, "ContentKeyPeriod") {
                let period = parser::content_key_period::parse_content_key_period(&xml, node)?;
                document.content_key_periods.bind_existing(period, node);
            }
        }

        if let Some(container) = xml.find_child(root, CPIX_NS, "DRMSystemList") {
            document.drm_systems.container = Some(container);
            for node in xml.find_children(container, CPIX_NS, "DRMSystem") {
                let system = parser::drm_system::parse_drm_system(&xml, node)?;
                document.drm_systems.bind_existing(system, node);
            }
        }

        if let Some(container) = xml.find_child(root, CPIX_NS, "ContentKeyUsageRuleList") {
            document.usage_rules.container = Some(container);
            for node in xml.find_children(container, CPIX_NS, "ContentKeyUsageRule") {
                let rule = parser::usage_rule::parse_usage_rule(&xml, node)?;
                document.usage_rules.bind_existing(rule, node);
            }
        }

        // Attach container-scoped signatures to their collections
        for (applied, id) in container_signatures {
            let mut claimed = false;
            for kind in CollectionKind::all() {
                let container = document.container_node(kind);
                if let Some(container) = container {
                    if xml.attr(container, "id") == Some(id.as_str()) {
                        document.push_applied_signature(kind, applied.clone());
                        claimed = true;
                        break;
                    }
                }
            }
            if !claimed {
                return Err(Error::InvalidFormat(format!(
                    "Signature references '#{}', which is not an entity list container",
                    id
                )));
            }
        }

        // Cross-collection validation, now that every sibling exists
        validator::validate_document(&document)?;

        // Opportunistic decryption: both secrets recovered and the per-key
        // authentication tag verifies; otherwise the value stays absent
        // without aborting the load.
        document.content_keys_readable =
            document.secrets.is_some() || document.recipients.is_empty();
        if let Some(secrets) = document.secrets.clone() {
            for (entry, payload) in document.content_keys.entries.iter_mut().zip(payloads) {
                let Some(payload) = payload else { continue };
                let Some(ref mac) = payload.value_mac else {
                    continue;
                };
                if !envelope::verify_mac(&secrets, &payload.cipher_value, mac) {
                    continue;
                }
                let value = envelope::decrypt_content_key(&secrets, &payload.cipher_value)?;
                entry.entity.value = Some(value);
                validator::validate_content_key(&entry.entity)?;
            }
        }

        document.xml = Some(xml);
        Ok(document)
    }

    // ---- internal helpers ----

    fn ensure_document_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::IllegalState(
                "The document carries a signature and is read-only; \
                 remove the document signature to make changes"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_writable(&self, kind: CollectionKind) -> Result<()> {
        self.ensure_document_writable()?;
        let signed = match kind {
            CollectionKind::DeliveryData => self.recipients.is_signed(),
            CollectionKind::ContentKeys => self.content_keys.is_signed(),
            CollectionKind::ContentKeyPeriods => self.content_key_periods.is_signed(),
            CollectionKind::DrmSystems => self.drm_systems.is_signed(),
            CollectionKind::UsageRules => self.usage_rules.is_signed(),
        };
        if signed {
            return Err(Error::IllegalState(format!(
                "The {} collection carries a signature and is read-only; \
                 remove its signatures to make changes",
                kind.container_name()
            )));
        }
        Ok(())
    }

    fn collection_signer_certificates(&self, kind: CollectionKind) -> Vec<&Certificate> {
        match kind {
            CollectionKind::DeliveryData => self.recipients.signer_certificates(),
            CollectionKind::ContentKeys => self.content_keys.signer_certificates(),
            CollectionKind::ContentKeyPeriods => self.content_key_periods.signer_certificates(),
            CollectionKind::DrmSystems => self.drm_systems.signer_certificates(),
            CollectionKind::UsageRules => self.usage_rules.signer_certificates(),
        }
    }

    fn container_node(&self, kind: CollectionKind) -> Option<NodeId> {
        match kind {
            CollectionKind::DeliveryData => self.recipients.container,
            CollectionKind::ContentKeys => self.content_keys.container,
            CollectionKind::ContentKeyPeriods => self.content_key_periods.container,
            CollectionKind::DrmSystems => self.drm_systems.container,
            CollectionKind::UsageRules => self.usage_rules.container,
        }
    }

    fn push_applied_signature(&mut self, kind: CollectionKind, signature: AppliedSignature) {
        match kind {
            CollectionKind::DeliveryData => self.recipients.applied_signatures.push(signature),
            CollectionKind::ContentKeys => self.content_keys.applied_signatures.push(signature),
            CollectionKind::ContentKeyPeriods => {
                self.content_key_periods.applied_signatures.push(signature)
            }
            CollectionKind::DrmSystems => self.drm_systems.applied_signatures.push(signature),
            CollectionKind::UsageRules => self.usage_rules.applied_signatures.push(signature),
        }
    }

    /// Loaded content keys whose backing nodes store encrypted values
    pub(crate) fn has_existing_encrypted_keys(&self) -> bool {
        self.content_keys
            .entries
            .iter()
            .any(|e| e.node.is_some() && e.entity.loaded_encrypted)
    }

    /// Loaded content keys whose backing nodes store plaintext values
    fn has_existing_plain_keys(&self) -> bool {
        self.content_keys
            .entries
            .iter()
            .any(|e| e.node.is_some() && !e.entity.loaded_encrypted && e.entity.value.is_some())
    }
}

/// One collection's save step
///
/// An empty collection with no signers has its container removed entirely;
/// otherwise the container is created if absent, every new entity is
/// serialized into it and reclassified as existing, and each queued signer
/// produces one signature scoped to the container (assigning it a stable
/// reference id if it lacks one).
fn save_collection<T: CollectionEntity>(
    xml: &mut XmlDocument,
    collection: &mut EntityCollection<T>,
    kind: CollectionKind,
    mut write_entity: impl FnMut(&mut XmlDocument, NodeId, &mut T) -> Result<NodeId>,
) -> Result<()> {
    if collection.is_empty()
        && collection.pending_signers.is_empty()
        && collection.applied_signatures.is_empty()
    {
        if let Some(container) = collection.container.take() {
            if !xml.is_detached(container) {
                xml.detach(container);
            }
        }
        return Ok(());
    }

    let container = match collection.container {
        Some(container) if !xml.is_detached(container) => container,
        _ => {
            let container = writer::ensure_container(xml, kind);
            collection.container = Some(container);
            container
        }
    };

    for entry in &mut collection.entries {
        if entry.node.is_none() {
            let node = write_entity(xml, container, &mut entry.entity)?;
            entry.node = Some(node);
        }
    }

    if !collection.pending_signers.is_empty() {
        let reference_id = match xml.attr(container, "id") {
            Some(id) => id.to_string(),
            None => {
                let id = format!("{}-{}", kind.id_prefix(), Uuid::new_v4());
                xml.set_attr(container, QName::new(None, "id"), &id);
                id
            }
        };
        for signer in collection.pending_signers.drain(..).collect::<Vec<_>>() {
            let node = xmlsig::sign_element(xml, container, &reference_id, &signer)?;
            collection.applied_signatures.push(AppliedSignature {
                node,
                certificate: signer.certificate().clone(),
            });
        }
    }
    Ok(())
}
