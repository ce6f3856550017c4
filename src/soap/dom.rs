//! Mutable XML document with namespace and ID-attribute awareness.
//!
//! Envelopes are parsed with `quick-xml` into an arena of nodes. Elements keep
//! their qualified names and attributes exactly as written, so serialising an
//! untouched document reproduces it modulo insignificant syntax (attribute
//! quoting, character references, empty-element form).

use std::collections::BTreeMap;
use std::fmt;

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

/// Namespace bound to the reserved `xml` prefix
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Attribute local name treated as an element identifier by default
pub const DEFAULT_ID_ATTRIBUTE: &str = "Id";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed XML: {0}")]
    Parse(String),

    #[error("Document has no root element")]
    NoRoot,

    #[error("Unknown entity reference &{0};")]
    UnknownEntity(String),

    #[error("Invalid UTF-8 in XML: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Handle of a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name as written, e.g. `wsu:Id`
    pub name: String,
    /// Unescaped value
    pub value: String,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        name: String,
        attributes: Vec<Attribute>,
    },
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct Declaration {
    version: String,
    /// Serialised text is always UTF-8, whatever the input declared
    has_encoding: bool,
    standalone: Option<String>,
}

/// An XML document
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    top_level: Vec<NodeId>,
    root: NodeId,
    declaration: Option<Declaration>,
    id_attributes: Vec<String>,
}

fn parse_error(e: impl fmt::Display) -> Error {
    Error::Parse(e.to_string())
}

fn utf8(bytes: &[u8]) -> Result<String> {
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// Split a qualified name into prefix and local part
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

impl Document {
    /// Parse XML text.
    ///
    /// Document type declarations are refused. Whitespace outside the root
    /// element is dropped; comments and processing instructions are kept.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut nodes: Vec<Node> = Vec::new();
        let mut top_level = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root = None;
        let mut declaration = None;

        loop {
            let event = reader.read_event().map_err(parse_error)?;
            match event {
                Event::Decl(decl) => {
                    let version = utf8(&decl.version().map_err(parse_error)?)?;
                    let has_encoding = decl.encoding().is_some();
                    let standalone = match decl.standalone() {
                        Some(sa) => Some(utf8(&sa.map_err(parse_error)?)?),
                        None => None,
                    };
                    declaration = Some(Declaration {
                        version,
                        has_encoding,
                        standalone,
                    });
                }
                Event::DocType(_) => {
                    return Err(Error::Parse("document type declarations are not allowed".into()));
                }
                Event::Start(start) => {
                    let id = push_element(&mut nodes, &mut top_level, &stack, &mut root, &start)?;
                    stack.push(id);
                }
                Event::Empty(start) => {
                    push_element(&mut nodes, &mut top_level, &stack, &mut root, &start)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(text) => {
                    let content = text.xml_content().map_err(parse_error)?;
                    push_text(&mut nodes, &stack, &content)?;
                }
                Event::GeneralRef(reference) => {
                    let name = reference.decode().map_err(parse_error)?;
                    let resolved = unescape(&format!("&{name};"))
                        .map_err(|_| Error::UnknownEntity(name.to_string()))?
                        .into_owned();
                    push_text(&mut nodes, &stack, &resolved)?;
                }
                Event::CData(cdata) => {
                    let content = utf8(&cdata.into_inner())?;
                    push_leaf(&mut nodes, &mut top_level, &stack, NodeKind::CData(content))?;
                }
                Event::Comment(comment) => {
                    let content = utf8(&comment.into_inner())?;
                    push_leaf(&mut nodes, &mut top_level, &stack, NodeKind::Comment(content))?;
                }
                Event::PI(pi) => {
                    let content = utf8(&pi)?;
                    push_leaf(
                        &mut nodes,
                        &mut top_level,
                        &stack,
                        NodeKind::ProcessingInstruction(content),
                    )?;
                }
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(Error::Parse("unexpected end of document".into()));
        }
        let root = root.ok_or(Error::NoRoot)?;

        Ok(Self {
            nodes,
            top_level,
            root,
            declaration,
            id_attributes: vec![DEFAULT_ID_ATTRIBUTE.to_string()],
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Element { .. })
    }

    /// Qualified name of an element, empty for other nodes
    pub fn name(&self, id: NodeId) -> &str {
        match &self.node(id).kind {
            NodeKind::Element { name, .. } => name,
            _ => "",
        }
    }

    pub fn local_name(&self, id: NodeId) -> &str {
        split_qname(self.name(id)).1
    }

    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        split_qname(self.name(id)).0
    }

    /// Namespace URI of an element
    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        self.lookup_namespace(id, self.prefix(id))
    }

    /// Whether `id` is an element named `{uri}local`
    pub fn is(&self, id: NodeId, uri: &str, local: &str) -> bool {
        self.is_element(id) && self.local_name(id) == local && self.namespace_uri(id) == Some(uri)
    }

    pub fn rename(&mut self, id: NodeId, new_name: impl Into<String>) {
        if let NodeKind::Element { name, .. } = &mut self.nodes[id.0].kind {
            *name = new_name.into();
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Attribute value by qualified name
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Attribute value by namespace URI and local name
    pub fn attribute_ns(&self, id: NodeId, uri: &str, local: &str) -> Option<&str> {
        self.attributes(id).iter().find_map(|a| match split_qname(&a.name) {
            (Some(prefix), name)
                if name == local
                    && prefix != "xmlns"
                    && self.lookup_namespace(id, Some(prefix)) == Some(uri) =>
            {
                Some(a.value.as_str())
            }
            _ => None,
        })
    }

    /// Set or replace an attribute by qualified name
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id.0].kind {
            match attributes.iter_mut().find(|a| a.name == name) {
                Some(attr) => attr.value = value,
                None => attributes.push(Attribute {
                    name: name.to_string(),
                    value,
                }),
            }
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id.0].kind {
            let pos = attributes.iter().position(|a| a.name == name)?;
            return Some(attributes.remove(pos).value);
        }
        None
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
    }

    pub fn child_elements_named<'a>(
        &'a self,
        id: NodeId,
        uri: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.child_elements(id)
            .filter(move |child| self.is(*child, uri, local))
    }

    pub fn first_child_named(&self, id: NodeId, uri: &str, local: &str) -> Option<NodeId> {
        self.child_elements_named(id, uri, local).next()
    }

    /// Descendant elements of `id` in document order, `id` excluded
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending: Vec<NodeId> = self.child_elements(id).collect();
        pending.reverse();
        while let Some(next) = pending.pop() {
            out.push(next);
            let before = pending.len();
            pending.extend(self.child_elements(next));
            pending[before..].reverse();
        }
        out
    }

    pub fn find_descendants(&self, id: NodeId, uri: &str, local: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|node| self.is(*node, uri, local))
            .collect()
    }

    /// Concatenated character data below `id`
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.node(id).kind {
            NodeKind::Text(text) | NodeKind::CData(text) => out.push_str(text),
            NodeKind::Element { .. } => {
                for child in self.children(id) {
                    self.collect_text(*child, out);
                }
            }
            _ => {}
        }
    }

    /// Replace the content of an element with a single text node
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
        self.append_text(id, text);
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.node(parent).children.last().copied() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(&text);
                return;
            }
        }
        let id = self.alloc(NodeKind::Text(text));
        self.attach(parent, id, None);
    }

    /// Append a new element with qualified name `name` to `parent`
    pub fn append_element(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        self.insert_element(parent, None, name)
    }

    /// Insert a new element before the child at `index`, or append with `None`
    pub fn insert_element(
        &mut self,
        parent: NodeId,
        index: Option<usize>,
        name: impl Into<String>,
    ) -> NodeId {
        let id = self.alloc(NodeKind::Element {
            name: name.into(),
            attributes: Vec::new(),
        });
        self.attach(parent, id, index);
        id
    }

    /// Append an element in namespace `uri`.
    ///
    /// Reuses a prefix already bound to `uri`; otherwise binds `preferred` (or
    /// a free variant of it) on the new element.
    pub fn append_ns_element(
        &mut self,
        parent: NodeId,
        uri: &str,
        preferred: &str,
        local: &str,
    ) -> NodeId {
        self.insert_ns_element(parent, None, uri, preferred, local)
    }

    pub fn insert_ns_element(
        &mut self,
        parent: NodeId,
        index: Option<usize>,
        uri: &str,
        preferred: &str,
        local: &str,
    ) -> NodeId {
        match self.lookup_prefix(parent, uri).map(str::to_string) {
            Some(prefix) => self.insert_element(parent, index, format!("{prefix}:{local}")),
            None => {
                let prefix = self.free_prefix(parent, preferred);
                let id = self.insert_element(parent, index, format!("{prefix}:{local}"));
                self.set_attribute(id, &format!("xmlns:{prefix}"), uri);
                id
            }
        }
    }

    /// Make sure `uri` has a prefix in scope at `id`, declaring one there if needed
    pub fn ensure_namespace(&mut self, id: NodeId, uri: &str, preferred: &str) -> String {
        if let Some(prefix) = self.lookup_prefix(id, uri) {
            return prefix.to_string();
        }
        let prefix = self.free_prefix(id, preferred);
        self.set_attribute(id, &format!("xmlns:{prefix}"), uri);
        prefix
    }

    /// Set a namespaced attribute, declaring its namespace on `id` if needed
    pub fn set_ns_attribute(
        &mut self,
        id: NodeId,
        uri: &str,
        preferred: &str,
        local: &str,
        value: impl Into<String>,
    ) {
        let prefix = self.ensure_namespace(id, uri, preferred);
        self.set_attribute(id, &format!("{prefix}:{local}"), value);
    }

    fn free_prefix(&self, id: NodeId, preferred: &str) -> String {
        if self.lookup_namespace(id, Some(preferred)).is_none() {
            return preferred.to_string();
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{preferred}{n}");
            if self.lookup_namespace(id, Some(&candidate)).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Namespace bound to `prefix` (`None` for the default namespace) at `id`
    pub fn lookup_namespace(&self, id: NodeId, prefix: Option<&str>) -> Option<&str> {
        let declaration = match prefix {
            Some("xml") => return Some(XML_NS),
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(uri) = self.attribute(node, &declaration) {
                return (!uri.is_empty()).then_some(uri);
            }
            current = self.parent(node);
        }
        None
    }

    /// A non-empty prefix bound to `uri` at `id`
    pub fn lookup_prefix(&self, id: NodeId, uri: &str) -> Option<&str> {
        let mut current = Some(id);
        while let Some(node) = current {
            for attr in self.attributes(node) {
                if let Some(prefix) = attr.name.strip_prefix("xmlns:") {
                    if attr.value == uri && self.lookup_namespace(id, Some(prefix)) == Some(uri) {
                        return Some(prefix);
                    }
                }
            }
            current = self.parent(node);
        }
        None
    }

    /// Namespace bindings in scope at `id`, keyed by prefix (`""` is the default)
    pub fn in_scope_namespaces(&self, id: NodeId) -> BTreeMap<String, String> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            chain.push(node);
            current = self.parent(node);
        }

        let mut scope = BTreeMap::new();
        for node in chain.into_iter().rev() {
            for attr in self.attributes(node) {
                let prefix = if attr.name == "xmlns" {
                    ""
                } else if let Some(prefix) = attr.name.strip_prefix("xmlns:") {
                    prefix
                } else {
                    continue;
                };
                if attr.value.is_empty() {
                    scope.remove(prefix);
                } else {
                    scope.insert(prefix.to_string(), attr.value.clone());
                }
            }
        }
        scope
    }

    /// Treat attributes with local name `name` as element identifiers
    pub fn register_id_attribute(&mut self, name: &str) {
        if !self.id_attributes.iter().any(|n| n == name) {
            self.id_attributes.push(name.to_string());
        }
    }

    pub fn id_attributes(&self) -> &[String] {
        &self.id_attributes
    }

    /// Values of every identifier attribute carried by an element
    pub fn element_ids(&self, id: NodeId) -> impl Iterator<Item = &str> + '_ {
        self.attributes(id).iter().filter_map(|a| {
            let (prefix, local) = split_qname(&a.name);
            let is_id = prefix != Some("xmlns")
                && a.name != "xmlns"
                && self.id_attributes.iter().any(|n| n == local);
            is_id.then_some(a.value.as_str())
        })
    }

    /// First identifier carried by an element, if any
    pub fn element_id(&self, id: NodeId) -> Option<&str> {
        self.element_ids(id).next()
    }

    /// All elements carrying an identifier equal to `value`
    pub fn find_by_id(&self, value: &str) -> Vec<NodeId> {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .filter(|node| self.element_ids(*node).any(|v| v == value))
            .collect()
    }

    /// Serialise the whole document
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        if let Some(decl) = &self.declaration {
            out.push_str(&format!("<?xml version=\"{}\"", decl.version));
            if decl.has_encoding {
                out.push_str(" encoding=\"UTF-8\"");
            }
            if let Some(standalone) = &decl.standalone {
                out.push_str(&format!(" standalone=\"{standalone}\""));
            }
            out.push_str("?>");
        }
        for node in &self.top_level {
            self.write_node(*node, &[], &mut out);
        }
        out
    }

    /// Serialise the subtree rooted at `id` as a standalone fragment.
    ///
    /// Namespaces inherited from ancestors are declared on the fragment root.
    pub fn subtree_xml(&self, id: NodeId) -> String {
        let own: Vec<&str> = self
            .attributes(id)
            .iter()
            .filter_map(|a| {
                if a.name == "xmlns" {
                    Some("")
                } else {
                    a.name.strip_prefix("xmlns:")
                }
            })
            .collect();

        let inherited: Vec<Attribute> = self
            .parent(id)
            .map(|parent| self.in_scope_namespaces(parent))
            .unwrap_or_default()
            .into_iter()
            .filter(|(prefix, _)| !own.contains(&prefix.as_str()))
            .map(|(prefix, uri)| Attribute {
                name: if prefix.is_empty() {
                    "xmlns".to_string()
                } else {
                    format!("xmlns:{prefix}")
                },
                value: uri,
            })
            .collect();

        let mut out = String::new();
        self.write_node(id, &inherited, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, extra_attributes: &[Attribute], out: &mut String) {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Element { name, attributes } => {
                out.push('<');
                out.push_str(name);
                for attr in extra_attributes.iter().chain(attributes) {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(&attr.value));
                    out.push('"');
                }
                if node.children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in &node.children {
                    self.write_node(*child, &[], out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::CData(text) => {
                out.push_str("<![CDATA[");
                out.push_str(text);
                out.push_str("]]>");
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::ProcessingInstruction(text) => {
                out.push_str("<?");
                out.push_str(text);
                out.push_str("?>");
            }
        }
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        match index {
            Some(index) if index < children.len() => children.insert(index, child),
            _ => children.push(child),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

fn push_element(
    nodes: &mut Vec<Node>,
    top_level: &mut Vec<NodeId>,
    stack: &[NodeId],
    root: &mut Option<NodeId>,
    start: &BytesStart,
) -> Result<NodeId> {
    let name = utf8(start.name().as_ref())?;

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(parse_error)?;
        let raw = utf8(&attr.value)?;
        // Attribute value normalisation: literal whitespace becomes a space
        let normalized = raw.replace(['\t', '\n', '\r'], " ");
        let value = unescape(&normalized).map_err(parse_error)?.into_owned();
        attributes.push(Attribute {
            name: utf8(attr.key.as_ref())?,
            value,
        });
    }

    let id = NodeId(nodes.len());
    let parent = stack.last().copied();
    nodes.push(Node {
        kind: NodeKind::Element { name, attributes },
        parent,
        children: Vec::new(),
    });

    match parent {
        Some(parent) => nodes[parent.0].children.push(id),
        None => {
            if root.is_some() {
                return Err(Error::Parse("more than one root element".into()));
            }
            *root = Some(id);
            top_level.push(id);
        }
    }
    Ok(id)
}

fn push_text(nodes: &mut Vec<Node>, stack: &[NodeId], text: &str) -> Result<()> {
    let Some(parent) = stack.last().copied() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(Error::Parse("text outside the root element".into()));
    };
    if text.is_empty() {
        return Ok(());
    }

    if let Some(last) = nodes[parent.0].children.last().copied() {
        if let NodeKind::Text(existing) = &mut nodes[last.0].kind {
            existing.push_str(text);
            return Ok(());
        }
    }

    let id = NodeId(nodes.len());
    nodes.push(Node {
        kind: NodeKind::Text(text.to_string()),
        parent: Some(parent),
        children: Vec::new(),
    });
    nodes[parent.0].children.push(id);
    Ok(())
}

fn push_leaf(
    nodes: &mut Vec<Node>,
    top_level: &mut Vec<NodeId>,
    stack: &[NodeId],
    kind: NodeKind,
) -> Result<()> {
    let parent = stack.last().copied();
    if parent.is_none() && matches!(kind, NodeKind::CData(_)) {
        return Err(Error::Parse("CDATA outside the root element".into()));
    }

    let id = NodeId(nodes.len());
    nodes.push(Node {
        kind,
        parent,
        children: Vec::new(),
    });
    match parent {
        Some(parent) => nodes[parent.0].children.push(id),
        None => top_level.push(id),
    }
    Ok(())
}

/// Escape an attribute value
pub(crate) fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 4);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape character data
pub(crate) fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 4);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ENVELOPE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns1="urn:example"><SOAP-ENV:Header/><SOAP-ENV:Body><ns1:op a="1 &amp; 2">x &lt; y</ns1:op></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;

    const SOAP: &str = "http://schemas.xmlsoap.org/soap/envelope/";

    #[test]
    fn test_parse_and_serialize() {
        let doc = Document::parse(ENVELOPE).unwrap();
        assert_eq!(
            doc.to_xml(),
            r#"<?xml version="1.0" encoding="UTF-8"?><SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns1="urn:example"><SOAP-ENV:Header/><SOAP-ENV:Body><ns1:op a="1 &amp; 2">x &lt; y</ns1:op></SOAP-ENV:Body></SOAP-ENV:Envelope>"#
        );
    }

    #[test]
    fn test_namespace_resolution() {
        let doc = Document::parse(ENVELOPE).unwrap();
        let root = doc.root();
        assert!(doc.is(root, SOAP, "Envelope"));

        let body = doc.first_child_named(root, SOAP, "Body").unwrap();
        let op = doc.child_elements(body).next().unwrap();
        assert_eq!(doc.namespace_uri(op), Some("urn:example"));
        assert_eq!(doc.attribute(op, "a"), Some("1 & 2"));
        assert_eq!(doc.text(op), "x < y");
        assert_eq!(doc.lookup_prefix(op, SOAP), Some("SOAP-ENV"));
    }

    #[test]
    fn test_char_references_resolved() {
        let doc = Document::parse("<a>&#x41;&#66;&quot;</a>").unwrap();
        assert_eq!(doc.text(doc.root()), "AB\"");
    }

    #[test]
    fn test_attribute_whitespace_normalized() {
        let doc = Document::parse("<a b=\"x\ny\tz\"/>").unwrap();
        assert_eq!(doc.attribute(doc.root(), "b"), Some("x y z"));
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(Document::parse("<a><b></a>").is_err());
        assert!(Document::parse("").is_err());
        assert!(Document::parse("<a/><b/>").is_err());
        assert!(Document::parse("<!DOCTYPE a><a/>").is_err());
        assert!(matches!(
            Document::parse("<a>&bogus;</a>"),
            Err(Error::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_append_ns_element_declares_prefix() {
        let mut doc = Document::parse(ENVELOPE).unwrap();
        let header = doc.first_child_named(doc.root(), SOAP, "Header").unwrap();

        let security = doc.append_ns_element(header, "urn:wsse", "wsse", "Security");
        assert_eq!(doc.name(security), "wsse:Security");
        assert_eq!(doc.attribute(security, "xmlns:wsse"), Some("urn:wsse"));

        // Prefix already in scope is reused without a new declaration
        let child = doc.append_ns_element(security, "urn:wsse", "other", "Token");
        assert_eq!(doc.name(child), "wsse:Token");
        assert!(doc.attributes(child).is_empty());
    }

    #[test]
    fn test_conflicting_prefix_gets_renamed() {
        let mut doc = Document::parse(r#"<a xmlns:wsu="urn:other"><b/></a>"#).unwrap();
        let b = doc.child_elements(doc.root()).next().unwrap();
        doc.set_ns_attribute(b, "urn:wsu", "wsu", "Id", "id-1");

        assert_eq!(doc.attribute(b, "wsu1:Id"), Some("id-1"));
        assert_eq!(doc.attribute_ns(b, "urn:wsu", "Id"), Some("id-1"));
    }

    #[test]
    fn test_find_by_id() {
        let mut doc = Document::parse(r#"<a xmlns:u="urn:u"><b u:Id="one"/><c Id="two"/><d ID="three"/></a>"#).unwrap();
        let b = doc.find_by_id("one");
        assert_eq!(b.len(), 1);
        assert_eq!(doc.local_name(b[0]), "b");
        assert_eq!(doc.find_by_id("two").len(), 1);
        assert!(doc.find_by_id("three").is_empty());

        doc.register_id_attribute("ID");
        assert_eq!(doc.find_by_id("three").len(), 1);
    }

    #[test]
    fn test_find_by_second_identifier() {
        let doc = Document::parse(r#"<a xmlns:u="urn:u"><b Id="payload" u:Id="signed"/></a>"#).unwrap();
        let b = doc.child_elements(doc.root()).next().unwrap();

        assert_eq!(doc.find_by_id("payload"), vec![b]);
        assert_eq!(doc.find_by_id("signed"), vec![b]);
        assert_eq!(doc.element_ids(b).collect::<Vec<_>>(), ["payload", "signed"]);
    }

    #[test]
    fn test_declaration_always_labels_utf8() {
        let doc = Document::parse(r#"<?xml version="1.0" encoding="ISO-8859-1" standalone="yes"?><a>caf&#xE9;</a>"#).unwrap();
        assert_eq!(
            doc.to_xml(),
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><a>café</a>"#
        );

        let doc = Document::parse(r#"<?xml version="1.0"?><a/>"#).unwrap();
        assert!(doc.to_xml().starts_with(r#"<?xml version="1.0"?>"#));
    }

    #[test]
    fn test_subtree_carries_inherited_namespaces() {
        let doc = Document::parse(ENVELOPE).unwrap();
        let body = doc.first_child_named(doc.root(), SOAP, "Body").unwrap();
        let xml = doc.subtree_xml(body);

        assert!(xml.starts_with("<SOAP-ENV:Body xmlns:SOAP-ENV="));
        assert!(xml.contains(r#"xmlns:ns1="urn:example""#));
        assert!(Document::parse(&xml).is_ok());
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = Document::parse("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<_> = doc
            .descendants(doc.root())
            .into_iter()
            .map(|n| doc.name(n).to_string())
            .collect();
        assert_eq!(names, ["b", "c", "d"]);
    }

    #[test]
    fn test_set_text_replaces_content() {
        let mut doc = Document::parse("<a><b/>old</a>").unwrap();
        let root = doc.root();
        doc.set_text(root, "new & shiny");
        assert_eq!(doc.to_xml(), "<a>new &amp; shiny</a>");
    }

    #[test]
    fn test_comments_and_cdata_preserved() {
        let xml = "<!--lead--><a><![CDATA[<raw>]]><!--c--><?pi data?></a>";
        let doc = Document::parse(xml).unwrap();
        assert_eq!(doc.to_xml(), xml);
        assert_eq!(doc.text(doc.root()), "<raw>");
    }
}
