//! Arena-based XML tree
//!
//! CPIX documents are held in memory as a tree of nodes in a flat arena.
//! Entities parsed from a loaded document are bound to their backing node
//! through a [`NodeId`] handle instead of a live reference; detaching a node
//! tombstones it, so a stale handle is detectable and never dereferences
//! into a reused slot. Node ids are never recycled within one document.
//!
//! The arena is what makes the signature and re-serialization rules work:
//! existing nodes are written back byte-for-byte equivalent (modulo
//! indentation, which canonicalization ignores), so signatures computed over
//! loaded content stay verifiable after an edit-and-save cycle that did not
//! touch the signed subtree.

use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Write as IoWrite;

/// Handle to a node in the arena
pub(crate) type NodeId = usize;

/// Qualified XML name: optional prefix plus local part
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QName {
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(prefix: Option<&str>, local: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
        }
    }

    /// Parse a raw tag or attribute name into prefix and local part
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) => Self::new(Some(prefix), local),
            None => Self::new(None, raw),
        }
    }

    /// The name as written in a document, `prefix:local` or `local`
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }
}

/// A regular (non-namespace) attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Attribute {
    pub name: QName,
    pub value: String,
}

/// Element payload: name, namespace declarations, attributes, children
#[derive(Debug, Clone)]
pub(crate) struct ElementData {
    pub name: QName,
    /// Namespace declarations on this element: `(prefix, uri)`,
    /// `None` prefix for the default namespace
    pub namespaces: Vec<(Option<String>, String)>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<NodeId>,
}

/// Node payload
#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub detached: bool,
}

/// The arena. One instance backs exactly one document.
#[derive(Debug, Clone)]
pub(crate) struct XmlDocument {
    nodes: Vec<Node>,
    root: NodeId,
}

impl XmlDocument {
    /// Create a document containing only a root element
    pub fn with_root(name: QName, namespaces: Vec<(Option<String>, String)>) -> Self {
        let root_node = Node {
            kind: NodeKind::Element(ElementData {
                name,
                namespaces,
                attributes: Vec::new(),
                children: Vec::new(),
            }),
            parent: None,
            detached: false,
        };
        Self {
            nodes: vec![root_node],
            root: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Parse a complete XML document from a string
    ///
    /// Comments, processing instructions and whitespace-only text are
    /// dropped; signatures are computed over a canonical form that excludes
    /// them anyway, and nothing in the CPIX vocabulary carries meaning in
    /// them.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);

        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;
        let mut buf = Vec::new();
        // Escaped text run accumulated across `Text`/`GeneralRef` events; flushed
        // (resolved + whitespace-trimmed) before any other event is handled.
        let mut pending = String::new();

        loop {
            let event = reader.read_event_into(&mut buf);
            // Accumulate text runs; entity references arrive as their own
            // `GeneralRef` events in quick-xml 0.39, so rebuild the escaped run.
            match event {
                Ok(Event::Text(ref t)) => {
                    let decoded = t
                        .decode()
                        .map_err(|e| Error::InvalidXml(e.to_string()))?;
                    pending.push_str(&decoded);
                    buf.clear();
                    continue;
                }
                Ok(Event::GeneralRef(ref r)) => {
                    let content = r
                        .decode()
                        .map_err(|e| Error::InvalidXml(e.to_string()))?;
                    pending.push('&');
                    pending.push_str(&content);
                    pending.push(';');
                    buf.clear();
                    continue;
                }
                _ => {}
            }
            // Any non-text event terminates the current text run.
            flush_text(&mut pending, &mut nodes, &stack)?;
            match event {
                Ok(Event::Start(ref e)) => {
                    let id = push_element(&mut nodes, &mut stack, &mut root, e)?;
                    stack.push(id);
                }
                Ok(Event::Empty(ref e)) => {
                    push_element(&mut nodes, &mut stack, &mut root, e)?;
                }
                Ok(Event::End(_)) => {
                    stack.pop().ok_or_else(|| {
                        Error::InvalidXml("Unbalanced closing tag".to_string())
                    })?;
                }
                Ok(Event::CData(ref t)) => {
                    let text = String::from_utf8(t.clone().into_inner().into_owned())
                        .map_err(|e| Error::InvalidXml(e.to_string()))?;
                    let parent = *stack.last().ok_or_else(|| {
                        Error::InvalidXml("CDATA outside the root element".to_string())
                    })?;
                    let id = nodes.len();
                    nodes.push(Node {
                        kind: NodeKind::Text(text),
                        parent: Some(parent),
                        detached: false,
                    });
                    if let NodeKind::Element(ref mut elem) = nodes[parent].kind {
                        elem.children.push(id);
                    }
                }
                // Stripped: canonicalization excludes these and the CPIX
                // schema assigns them no meaning
                Ok(Event::Comment(_)) | Ok(Event::PI(_)) | Ok(Event::Decl(_))
                | Ok(Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::InvalidXml(e.to_string())),
                #[allow(unreachable_patterns)]
                Ok(_) => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(Error::InvalidXml("Unclosed element at end of input".to_string()));
        }
        let root = root.ok_or_else(|| Error::InvalidXml("Document has no root element".to_string()))?;
        Ok(Self { nodes, root })
    }

    /// Serialize the whole document, XML declaration included
    pub fn write_to<W: IoWrite>(&self, writer: W) -> Result<()> {
        let mut xml_writer = Writer::new_with_indent(writer, b' ', 2);
        xml_writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| Error::xml_write(format!("Failed to write XML declaration: {}", e)))?;
        self.write_node(&mut xml_writer, self.root)?;
        Ok(())
    }

    fn write_node<W: IoWrite>(&self, writer: &mut Writer<W>, id: NodeId) -> Result<()> {
        match &self.nodes[id].kind {
            NodeKind::Text(text) => {
                writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(|e| Error::xml_write(format!("Failed to write text: {}", e)))?;
            }
            NodeKind::Element(elem) => {
                let qualified = elem.name.qualified();
                let mut start = BytesStart::new(qualified.as_str());
                for (prefix, uri) in &elem.namespaces {
                    let attr_name = match prefix {
                        Some(p) => format!("xmlns:{}", p),
                        None => "xmlns".to_string(),
                    };
                    start.push_attribute((attr_name.as_str(), uri.as_str()));
                }
                for attr in &elem.attributes {
                    start.push_attribute((attr.name.qualified().as_str(), attr.value.as_str()));
                }

                let children: Vec<NodeId> = elem
                    .children
                    .iter()
                    .copied()
                    .filter(|c| !self.nodes[*c].detached)
                    .collect();
                if children.is_empty() {
                    writer.write_event(Event::Empty(start)).map_err(|e| {
                        Error::xml_write(format!("Failed to write element '{}': {}", qualified, e))
                    })?;
                } else {
                    writer.write_event(Event::Start(start)).map_err(|e| {
                        Error::xml_write(format!("Failed to write element '{}': {}", qualified, e))
                    })?;
                    for child in children {
                        self.write_node(writer, child)?;
                    }
                    writer
                        .write_event(Event::End(BytesEnd::new(qualified.as_str())))
                        .map_err(|e| {
                            Error::xml_write(format!(
                                "Failed to close element '{}': {}",
                                qualified, e
                            ))
                        })?;
                }
            }
        }
        Ok(())
    }

    // ---- node construction ----

    /// Create a detached element node; attach it with `append_child`
    pub fn create_element(&mut self, name: QName) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Element(ElementData {
                name,
                namespaces: Vec::new(),
                attributes: Vec::new(),
                children: Vec::new(),
            }),
            parent: None,
            detached: false,
        });
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child].parent = Some(parent);
        if let NodeKind::Element(ref mut elem) = self.nodes[parent].kind {
            elem.children.push(child);
        }
    }

    /// Insert a child at a specific position among the parent's children
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.nodes[child].parent = Some(parent);
        if let NodeKind::Element(ref mut elem) = self.nodes[parent].kind {
            let index = index.min(elem.children.len());
            elem.children.insert(index, child);
        }
    }

    /// Detach a node from its parent and tombstone it
    ///
    /// The slot is never reused; a handle to a detached node stays
    /// distinguishable from every live node.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent {
            if let NodeKind::Element(ref mut elem) = self.nodes[parent].kind {
                elem.children.retain(|c| *c != id);
            }
        }
        self.nodes[id].parent = None;
        self.nodes[id].detached = true;
    }

    pub fn is_detached(&self, id: NodeId) -> bool {
        self.nodes[id].detached
    }

    /// Replace an element's children with a single text node
    pub fn set_text(&mut self, element: NodeId, text: &str) {
        let old_children = match &self.nodes[element].kind {
            NodeKind::Element(elem) => elem.children.clone(),
            NodeKind::Text(_) => return,
        };
        for child in old_children {
            self.detach(child);
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Text(text.to_string()),
            parent: Some(element),
            detached: false,
        });
        if let NodeKind::Element(ref mut elem) = self.nodes[element].kind {
            elem.children.push(id);
        }
    }

    // ---- node access ----

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes[id].kind {
            NodeKind::Element(elem) if !self.nodes[id].detached => Some(elem),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        if self.nodes[id].detached {
            return None;
        }
        match &mut self.nodes[id].kind {
            NodeKind::Element(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Live element children of a node, in document order
    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        match self.element(id) {
            Some(elem) => elem
                .children
                .iter()
                .copied()
                .filter(|c| !self.nodes[*c].detached)
                .filter(|c| matches!(self.nodes[*c].kind, NodeKind::Element(_)))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Concatenated text content of an element's direct text children
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(elem) = self.element(id) {
            for child in &elem.children {
                if self.nodes[*child].detached {
                    continue;
                }
                if let NodeKind::Text(ref t) = self.nodes[*child].kind {
                    out.push_str(t);
                }
            }
        }
        out
    }

    /// Attribute value by local name, ignoring any prefix
    pub fn attr<'a>(&'a self, id: NodeId, local: &str) -> Option<&'a str> {
        self.element(id).and_then(|elem| {
            elem.attributes
                .iter()
                .find(|a| a.name.local == local)
                .map(|a| a.value.as_str())
        })
    }

    /// Drop an attribute by local name, if present
    pub fn remove_attr(&mut self, id: NodeId, local: &str) {
        if let Some(elem) = self.element_mut(id) {
            elem.attributes.retain(|a| a.name.local != local);
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: QName, value: &str) {
        if let Some(elem) = self.element_mut(id) {
            if let Some(attr) = elem.attributes.iter_mut().find(|a| a.name == name) {
                attr.value = value.to_string();
            } else {
                elem.attributes.push(Attribute {
                    name,
                    value: value.to_string(),
                });
            }
        }
    }

    // ---- namespace handling ----

    /// Resolve a prefix (or the default namespace for `None`) at a node by
    /// walking the ancestor chain
    pub fn resolve_prefix(&self, start: NodeId, prefix: Option<&str>) -> Option<&str> {
        let mut current = Some(start);
        while let Some(id) = current {
            if let NodeKind::Element(ref elem) = self.nodes[id].kind {
                for (p, uri) in &elem.namespaces {
                    if p.as_deref() == prefix {
                        return Some(uri.as_str());
                    }
                }
            }
            current = self.nodes[id].parent;
        }
        None
    }

    /// The namespace URI an element's own name resolves to
    pub fn element_namespace(&self, id: NodeId) -> Option<&str> {
        let elem = self.element(id)?;
        self.resolve_prefix(id, elem.name.prefix.as_deref())
    }

    /// Find an element's first live child with the given namespace and
    /// local name
    pub fn find_child(&self, id: NodeId, ns: &str, local: &str) -> Option<NodeId> {
        self.child_elements(id).into_iter().find(|c| {
            self.element(*c)
                .is_some_and(|e| e.name.local == local)
                && self.element_namespace(*c) == Some(ns)
        })
    }

    /// All live children with the given namespace and local name
    pub fn find_children(&self, id: NodeId, ns: &str, local: &str) -> Vec<NodeId> {
        self.child_elements(id)
            .into_iter()
            .filter(|c| {
                self.element(*c)
                    .is_some_and(|e| e.name.local == local)
                    && self.element_namespace(*c) == Some(ns)
            })
            .collect()
    }

    /// Find the element carrying `id="<value>"` anywhere in the live tree
    ///
    /// CPIX id attributes have xs:ID semantics, so the first match is the
    /// only match in a schema-valid document.
    pub fn find_element_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|n| self.attr(*n, "id") == Some(value))
    }

    /// All live element descendants of a node, the node included, in
    /// document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if self.nodes[current].detached {
                continue;
            }
            if matches!(self.nodes[current].kind, NodeKind::Element(_)) {
                out.push(current);
                let children = self.child_elements(current);
                for child in children.into_iter().rev() {
                    pending.push(child);
                }
            }
        }
        out
    }
}

/// Flush an accumulated text run into a text node.
///
/// In quick-xml 0.39 a text span that contains entity references is reported
/// as several events (`Text` fragments interleaved with `GeneralRef`), so the
/// parser rebuilds the original escaped run in `pending` and resolves it here
/// in one shot — matching the single-event `unescape()` behaviour of earlier
/// versions. Leading/trailing whitespace is trimmed and whitespace-only runs
/// are dropped.
fn flush_text(pending: &mut String, nodes: &mut Vec<Node>, stack: &[NodeId]) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let raw = std::mem::take(pending);
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    let text = quick_xml::escape::unescape(trimmed)
        .map_err(|e| Error::InvalidXml(e.to_string()))?
        .into_owned();
    if text.trim().is_empty() {
        return Ok(());
    }
    let parent = *stack
        .last()
        .ok_or_else(|| Error::InvalidXml("Text content outside the root element".to_string()))?;
    let id = nodes.len();
    nodes.push(Node {
        kind: NodeKind::Text(text),
        parent: Some(parent),
        detached: false,
    });
    if let NodeKind::Element(ref mut elem) = nodes[parent].kind {
        elem.children.push(id);
    }
    Ok(())
}

fn push_element(
    nodes: &mut Vec<Node>,
    stack: &mut [NodeId],
    root: &mut Option<NodeId>,
    e: &BytesStart<'_>,
) -> Result<NodeId> {
    let raw_name = std::str::from_utf8(e.name().as_ref())
        .map_err(|err| Error::InvalidXml(err.to_string()))?
        .to_string();

    let mut namespaces = Vec::new();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| Error::InvalidXml(err.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|err| Error::InvalidXml(err.to_string()))?
            .into_owned();
        if key == "xmlns" {
            namespaces.push((None, value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.push((Some(prefix.to_string()), value));
        } else {
            attributes.push(Attribute {
                name: QName::parse(key),
                value,
            });
        }
    }

    let parent = stack.last().copied();
    let id = nodes.len();
    nodes.push(Node {
        kind: NodeKind::Element(ElementData {
            name: QName::parse(&raw_name),
            namespaces,
            attributes,
            children: Vec::new(),
        }),
        parent,
        detached: false,
    });

    match parent {
        Some(p) => {
            if let NodeKind::Element(ref mut elem) = nodes[p].kind {
                elem.children.push(id);
            }
        }
        None => {
            if root.is_some() {
                return Err(Error::InvalidXml(
                    "Multiple root elements in document".to_string(),
                ));
            }
            *root = Some(id);
        }
    }
    Ok(id)
}
