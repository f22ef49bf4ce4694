//! Namespace-aware helpers over [`xmltree`] documents.
//!
//! Requests are assembled from templates in the envelope builder; every
//! document the server sends back goes through this module. The helpers
//! mirror the handful of lookups the protocol needs: descendant search by
//! (namespace, local name), text content, attributes, and `uuid:`-prefixed
//! identifier nodes.

use uuid::Uuid;
use xmltree::{Element, XMLNode};

use crate::error::{Result, WrError};

/// A parsed XML document.
///
/// Wraps the root element of an `xmltree` parse. Namespace URIs are
/// resolved at parse time, so lookups match on the URI rather than on
/// whatever prefix the server happened to pick.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Parse a document from its UTF-8 text.
    pub fn parse(text: &str) -> Result<Self> {
        let root = Element::parse(text.as_bytes())?;
        Ok(Document { root })
    }

    /// Build a document around an already-constructed element tree.
    pub fn from_root(root: Element) -> Self {
        Document { root }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Serialize back to UTF-8 text.
    pub fn to_xml(&self) -> Result<String> {
        let mut out = Vec::new();
        self.root
            .write(&mut out)
            .map_err(|e| WrError::Xml(e.to_string()))?;
        String::from_utf8(out).map_err(|e| WrError::Xml(e.to_string()))
    }

    /// First descendant element with the given namespace URI and local
    /// name, in document order. `None` for the namespace matches only
    /// elements that carry no namespace.
    pub fn find_first(&self, ns: Option<&str>, name: &str) -> Option<&Element> {
        find_first(&self.root, ns, name)
    }

    /// All matching descendant elements, in document order.
    pub fn find_all(&self, ns: Option<&str>, name: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        collect(&self.root, ns, name, &mut out);
        out
    }

    /// Content of a `uuid:`-prefixed identifier node (MessageID,
    /// RelatesTo, EnumerationContext).
    pub fn get_uuid(&self, ns: Option<&str>, name: &str) -> Result<Uuid> {
        let node = self
            .find_first(ns, name)
            .ok_or_else(|| WrError::Protocol(format!("no {name} element in document")))?;
        parse_uuid(&text_of(node))
            .ok_or_else(|| WrError::Protocol(format!("{name} does not hold a valid uuid")))
    }
}

fn matches(el: &Element, ns: Option<&str>, name: &str) -> bool {
    el.name == name && el.namespace.as_deref() == ns
}

/// Depth-first search for the first matching descendant (the element
/// itself included).
pub fn find_first<'a>(el: &'a Element, ns: Option<&str>, name: &str) -> Option<&'a Element> {
    if matches(el, ns, name) {
        return Some(el);
    }
    child_elements(el).find_map(|c| find_first(c, ns, name))
}

fn collect<'a>(el: &'a Element, ns: Option<&str>, name: &str, out: &mut Vec<&'a Element>) {
    if matches(el, ns, name) {
        out.push(el);
    }
    for c in child_elements(el) {
        collect(c, ns, name, out);
    }
}

/// Child elements only, skipping text and comment nodes.
pub fn child_elements(el: &Element) -> impl Iterator<Item = &Element> {
    el.children.iter().filter_map(XMLNode::as_element)
}

/// Concatenated text content of an element; empty for element-only nodes.
pub fn text_of(el: &Element) -> String {
    el.get_text().map(|t| t.into_owned()).unwrap_or_default()
}

/// Attribute lookup by local name.
pub fn attr<'a>(el: &'a Element, name: &str) -> Option<&'a str> {
    el.attributes.get(name).map(String::as_str)
}

/// True when the element carries `xsi:nil="true"`.
pub fn is_nil(el: &Element) -> bool {
    attr(el, "nil").is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Parse a `uuid:XXXXXXXX-...` token; the bare form is accepted too.
pub fn parse_uuid(text: &str) -> Option<Uuid> {
    let raw = text.trim();
    let raw = raw.strip_prefix("uuid:").unwrap_or(raw);
    Uuid::parse_str(raw).ok()
}

/// Escape text content and attribute values for inclusion in a template.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
