//! Canonical XML serialization
//!
//! Signatures are computed over a deterministic re-serialization of the
//! signed subtree rather than over raw document bytes, so a signature
//! survives re-indentation, comment stripping and attribute reordering in
//! the stored document, while remaining sensitive to namespace-prefix and
//! content changes that alter the canonical form.
//!
//! The canonical form produced here:
//! - excludes comments, processing instructions and the XML declaration
//!   (they are already dropped at parse time);
//! - excludes whitespace-only text nodes;
//! - renders every element as a start/end tag pair, never self-closing;
//! - sorts namespace declarations (default first, then by prefix) and
//!   attributes (by prefix, then local name);
//! - emits a namespace declaration at the first element where the prefix
//!   is visibly utilized and not already declared in the output, so the
//!   canonical form of a subtree does not change when unrelated
//!   declarations move around on its ancestors;
//! - escapes text as `&amp; &lt; &gt; &#xD;` and attribute values as
//!   `&amp; &lt; &quot; &#x9; &#xA; &#xD;`.

use crate::error::Result;
use crate::xmltree::{NodeId, NodeKind, XmlDocument};

/// Canonicalize the subtree rooted at `apex`
///
/// `omit` lists element nodes to skip entirely; the enveloped-signature
/// transform passes the signature element being computed or verified.
pub(crate) fn canonicalize(
    doc: &XmlDocument,
    apex: NodeId,
    omit: &[NodeId],
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut declared: Vec<(Option<String>, String)> = Vec::new();
    write_element(doc, apex, omit, &mut declared, &mut out)?;
    Ok(out)
}

fn write_element(
    doc: &XmlDocument,
    id: NodeId,
    omit: &[NodeId],
    declared: &mut Vec<(Option<String>, String)>,
    out: &mut Vec<u8>,
) -> Result<()> {
    let elem = match doc.element(id) {
        Some(e) => e,
        None => return Ok(()),
    };
    let qualified = elem.name.qualified();

    // Prefixes visibly utilized by this element: its own name plus any
    // prefixed attributes. Unprefixed attributes carry no namespace.
    let mut used: Vec<Option<&str>> = vec![elem.name.prefix.as_deref()];
    for attr in &elem.attributes {
        if let Some(ref p) = attr.name.prefix {
            if !used.contains(&Some(p.as_str())) {
                used.push(Some(p.as_str()));
            }
        }
    }

    let mut fresh: Vec<(Option<String>, String)> = Vec::new();
    for prefix in used {
        let resolved = doc.resolve_prefix(id, prefix);
        let uri = match resolved {
            Some(u) => u,
            None => continue, // unprefixed name with no default namespace
        };
        let already = declared
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, u)| u.as_str());
        if already != Some(uri) {
            fresh.push((prefix.map(str::to_string), uri.to_string()));
        }
    }
    fresh.sort_by(|a, b| a.0.cmp(&b.0));

    out.extend_from_slice(b"<");
    out.extend_from_slice(qualified.as_bytes());
    for (prefix, uri) in &fresh {
        match prefix {
            None => out.extend_from_slice(b" xmlns=\""),
            Some(p) => {
                out.extend_from_slice(b" xmlns:");
                out.extend_from_slice(p.as_bytes());
                out.extend_from_slice(b"=\"");
            }
        }
        out.extend_from_slice(escape_attr(uri).as_bytes());
        out.extend_from_slice(b"\"");
    }

    let mut attrs: Vec<_> = elem.attributes.iter().collect();
    attrs.sort_by(|a, b| {
        (a.name.prefix.as_deref().unwrap_or(""), a.name.local.as_str())
            .cmp(&(b.name.prefix.as_deref().unwrap_or(""), b.name.local.as_str()))
    });
    for attr in attrs {
        out.extend_from_slice(b" ");
        out.extend_from_slice(attr.name.qualified().as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(escape_attr(&attr.value).as_bytes());
        out.extend_from_slice(b"\"");
    }
    out.extend_from_slice(b">");

    let pushed = fresh.len();
    declared.extend(fresh);

    for child in &elem.children {
        let child = *child;
        if doc.node(child).detached || omit.contains(&child) {
            continue;
        }
        match &doc.node(child).kind {
            NodeKind::Text(text) => {
                if !text.trim().is_empty() {
                    out.extend_from_slice(escape_text(text).as_bytes());
                }
            }
            NodeKind::Element(_) => {
                write_element(doc, child, omit, declared, out)?;
            }
        }
    }

    declared.truncate(declared.len() - pushed);

    out.extend_from_slice(b"</");
    out.extend_from_slice(qualified.as_bytes());
    out.extend_from_slice(b">");
    Ok(())
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}
