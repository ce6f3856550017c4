//! Exclusive XML Canonicalization 1.0, without comments.
//!
//! Input is a single serialized element that already carries every namespace
//! declaration in scope for it (see [`Document::subtree_xml`]).
//!
//! [`Document::subtree_xml`]: crate::soap::dom::Document::subtree_xml

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use std::collections::{BTreeMap, BTreeSet};

use crate::soap::dom::{Error, XML_NS, escape_attr, escape_text};

type Result<T> = std::result::Result<T, Error>;

/// Prefix -> URI; the empty prefix is the default namespace
type NsMap = BTreeMap<String, String>;

/// Namespace bindings of one open element
#[derive(Default, Clone)]
struct Scope {
    /// Bindings in effect in the input
    declared: NsMap,
    /// Bindings already written to the output by an ancestor
    rendered: NsMap,
}

struct Canonicalizer<'a> {
    out: String,
    scopes: Vec<Scope>,
    inclusive: BTreeSet<&'a str>,
}

/// Canonicalize an element fragment.
///
/// `inclusive_ns` is the `InclusiveNamespaces` prefix list; `#default`
/// stands for the default namespace.
pub fn canonicalize(xml: impl AsRef<str>, inclusive_ns: Option<&[&str]>) -> Result<String> {
    let inclusive = inclusive_ns
        .unwrap_or_default()
        .iter()
        .map(|prefix| if *prefix == "#default" { "" } else { *prefix })
        .collect();
    let mut c14n = Canonicalizer {
        out: String::new(),
        scopes: vec![Scope::default()],
        inclusive,
    };

    let mut reader = Reader::from_str(xml.as_ref());
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::Parse(e.to_string()))?;
        // Anything outside the element (declaration, surrounding whitespace) is dropped
        let inside = c14n.scopes.len() > 1;
        match event {
            Event::Start(start) => c14n.start(&start)?,
            Event::End(end) => {
                c14n.out.push_str("</");
                c14n.out.push_str(&String::from_utf8(end.name().as_ref().to_vec())?);
                c14n.out.push('>');
                c14n.scopes.pop();
            }
            Event::Text(text) if inside => {
                let text = text
                    .xml_content()
                    .map_err(|e| Error::Parse(e.to_string()))?;
                c14n.out.push_str(&escape_text(&text));
            }
            Event::GeneralRef(reference) if inside => {
                let name = reference
                    .decode()
                    .map_err(|e| Error::Parse(e.to_string()))?;
                let resolved = unescape(&format!("&{name};"))
                    .map_err(|_| Error::UnknownEntity(name.to_string()))?
                    .into_owned();
                c14n.out.push_str(&escape_text(&resolved));
            }
            Event::CData(cdata) if inside => {
                let raw = String::from_utf8(cdata.into_inner().into_owned())?;
                let raw = raw.replace("\r\n", "\n").replace('\r', "\n");
                c14n.out.push_str(&escape_text(&raw));
            }
            Event::PI(pi) if inside => {
                c14n.out.push_str("<?");
                c14n.out.push_str(&String::from_utf8(pi.to_vec())?);
                c14n.out.push_str("?>");
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(c14n.out)
}

impl Canonicalizer<'_> {
    fn start(&mut self, element: &BytesStart) -> Result<()> {
        let parent = self.scopes.last().cloned().unwrap_or_default();
        let mut declared = parent.declared;
        let mut rendered = parent.rendered;

        let mut attributes = Vec::new();
        for attr in element.attributes().with_checks(false) {
            let attr = attr.map_err(|e| Error::Parse(e.to_string()))?;
            let key = String::from_utf8(attr.key.as_ref().to_vec())?;
            let raw = String::from_utf8(attr.value.to_vec())?.replace(['\t', '\n', '\r'], " ");
            let value = unescape(&raw)
                .map_err(|e| Error::Parse(e.to_string()))?
                .into_owned();

            let ns_prefix = match key.as_str() {
                "xmlns" => Some(String::new()),
                other => other.strip_prefix("xmlns:").map(str::to_string),
            };
            match ns_prefix {
                Some(prefix) if value.is_empty() => {
                    declared.remove(&prefix);
                }
                Some(prefix) => {
                    declared.insert(prefix, value);
                }
                None => attributes.push((key, value)),
            }
        }

        let name = String::from_utf8(element.name().as_ref().to_vec())?;
        let utilized = self.utilized_prefixes(&name, &attributes, &declared);

        // BTreeSet order puts the default namespace first, then prefixes lexically
        let mut namespaces = Vec::new();
        for prefix in utilized {
            match declared.get(prefix) {
                Some(uri) if rendered.get(prefix) != Some(uri) => {
                    namespaces.push((prefix.to_string(), uri.clone()));
                }
                Some(_) => {}
                None if prefix.is_empty() && rendered.get("").is_some_and(|u| !u.is_empty()) => {
                    namespaces.push((String::new(), String::new()));
                }
                None => {}
            }
        }

        let mut sorted: Vec<(String, &str, &str, &str)> = attributes
            .iter()
            .map(|(key, value)| {
                let (uri, local) = match key.split_once(':') {
                    Some(("xml", local)) => (XML_NS.to_string(), local),
                    Some((prefix, local)) => {
                        (declared.get(prefix).cloned().unwrap_or_default(), local)
                    }
                    None => (String::new(), key.as_str()),
                };
                (uri, local, key.as_str(), value.as_str())
            })
            .collect();
        sorted.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

        self.out.push('<');
        self.out.push_str(&name);
        for (prefix, uri) in &namespaces {
            match prefix.as_str() {
                "" => self.out.push_str(" xmlns=\""),
                prefix => {
                    self.out.push_str(" xmlns:");
                    self.out.push_str(prefix);
                    self.out.push_str("=\"");
                }
            }
            self.out.push_str(&escape_attr(uri));
            self.out.push('"');
        }
        for (_, _, key, value) in sorted {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape_attr(value));
            self.out.push('"');
        }
        self.out.push('>');

        rendered.extend(namespaces);
        self.scopes.push(Scope { declared, rendered });
        Ok(())
    }

    /// Prefixes used by the element name, its attributes or forced by the
    /// inclusive prefix list
    fn utilized_prefixes<'n>(
        &'n self,
        name: &'n str,
        attributes: &'n [(String, String)],
        declared: &NsMap,
    ) -> BTreeSet<&'n str> {
        let mut utilized = BTreeSet::new();
        utilized.insert(name.split_once(':').map_or("", |(prefix, _)| prefix));

        // `xml` is bound implicitly and never declared
        utilized.extend(
            attributes
                .iter()
                .filter_map(|(key, _)| key.split_once(':'))
                .map(|(prefix, _)| prefix)
                .filter(|prefix| *prefix != "xml"),
        );

        utilized.extend(
            self.inclusive
                .iter()
                .copied()
                .filter(|prefix| declared.contains_key(*prefix)),
        );
        utilized
    }
}
