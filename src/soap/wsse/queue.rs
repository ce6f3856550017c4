use tracing::debug;

use crate::soap::dom::{Document, NodeId};
use crate::soap::wsse::{Error, Result, algorithms, ns, prefix, unique_id};

/// An element scheduled for signing together with its identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub node: NodeId,
    pub id: String,
}

/// Elements to be referenced from `SignedInfo`, in marking order
#[derive(Debug, Default)]
pub struct SignQueue {
    entries: Vec<QueueEntry>,
}

impl SignQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `element` a `wsu:Id` and append it to the queue.
    ///
    /// A `wsu:Id` already on the element is kept when no other element carries
    /// the same identifier; otherwise a fresh one is generated. Identifier
    /// attributes in other namespaces are left alone. An element that is
    /// already queued is rejected.
    pub fn mark(&mut self, doc: &mut Document, element: NodeId) -> Result<String> {
        if !doc.is_element(element) {
            return Err(Error::Structure("only elements can be signed".into()));
        }
        if self.entries.iter().any(|entry| entry.node == element) {
            return Err(Error::Structure(format!(
                "element {} is already marked for signing",
                doc.name(element)
            )));
        }

        let id = match doc.attribute_ns(element, ns::WSU, "Id").map(str::to_string) {
            Some(existing) => {
                if doc.find_by_id(&existing) != [element] {
                    return Err(Error::Structure(format!(
                        "identifier {existing} on {} is not unique in the envelope",
                        doc.name(element)
                    )));
                }
                debug!("Reusing identifier {existing} of {}", doc.name(element));
                existing
            }
            None => {
                let id = unique_id();
                doc.set_ns_attribute(element, ns::WSU, prefix::WSU, "Id", id.as_str());
                id
            }
        };
        debug!("Marked {} for signing as {id}", doc.name(element));

        self.entries.push(QueueEntry {
            node: element,
            id: id.clone(),
        });
        Ok(id)
    }

    /// Append one `ds:Reference` per queued element to `signed_info`, in queue order
    pub fn build_references(&self, doc: &mut Document, signed_info: NodeId) {
        for entry in &self.entries {
            let reference = doc.append_ns_element(signed_info, ns::DS, prefix::DS, "Reference");
            doc.set_attribute(reference, "URI", format!("#{}", entry.id));

            let transforms = doc.append_ns_element(reference, ns::DS, prefix::DS, "Transforms");
            set_algorithm(doc, transforms, "Transform", algorithms::EXCLUSIVE_C14N);
            set_algorithm(doc, reference, "DigestMethod", algorithms::SHA1);
            doc.append_ns_element(reference, ns::DS, prefix::DS, "DigestValue");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }
}

/// Append `ds:<name Algorithm="uri"/>` to `parent`
pub(crate) fn set_algorithm(doc: &mut Document, parent: NodeId, name: &str, uri: &str) -> NodeId {
    let node = doc.append_ns_element(parent, ns::DS, prefix::DS, name);
    doc.set_attribute(node, "Algorithm", uri);
    node
}
