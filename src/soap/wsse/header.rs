use tracing::debug;

use crate::soap::dom::{Document, NodeId};
use crate::soap::is_soap_envelope_ns;
use crate::soap::wsse::{Error, Result, SignQueue, ns, prefix};

fn envelope_ns(doc: &Document) -> Result<String> {
    let root = doc.root();
    match doc.namespace_uri(root) {
        Some(uri) if doc.local_name(root) == "Envelope" && is_soap_envelope_ns(uri) => {
            Ok(uri.to_string())
        }
        _ => Err(Error::Structure(format!(
            "root element {} is not a SOAP Envelope",
            doc.name(root)
        ))),
    }
}

fn unique_envelope_child(doc: &Document, local: &str) -> Result<NodeId> {
    let uri = envelope_ns(doc)?;
    let mut found = doc.child_elements_named(doc.root(), &uri, local);
    match (found.next(), found.next()) {
        (Some(node), None) => Ok(node),
        (None, _) => Err(Error::Structure(format!("envelope has no {local}"))),
        (Some(_), Some(_)) => Err(Error::Structure(format!(
            "envelope has more than one {local}"
        ))),
    }
}

/// The single SOAP `Header` of the envelope
pub fn soap_header(doc: &Document) -> Result<NodeId> {
    unique_envelope_child(doc, "Header")
}

/// The single SOAP `Body` of the envelope
pub fn soap_body(doc: &Document) -> Result<NodeId> {
    unique_envelope_child(doc, "Body")
}

/// The existing `wsse:Security` child of the SOAP `Header`, if any
pub(crate) fn find_security_header(doc: &Document, header: NodeId) -> Result<Option<NodeId>> {
    let mut found = doc.child_elements_named(header, ns::WSSE, "Security");
    match (found.next(), found.next()) {
        (None, _) => Ok(None),
        (Some(security), None) => Ok(Some(security)),
        (Some(_), Some(_)) => Err(Error::Structure(
            "envelope has more than one Security header".into(),
        )),
    }
}

/// Append a new `wsse:Security` header declaring the `wsse`, `wsu` and `ds` namespaces
pub(crate) fn create_security_header(doc: &mut Document, header: NodeId) -> NodeId {
    // mustUnderstand is left out: Axis 1.x rejects it
    let security = doc.append_ns_element(header, ns::WSSE, prefix::WSSE, "Security");
    doc.ensure_namespace(security, ns::WSU, prefix::WSU);
    doc.ensure_namespace(security, ns::DS, prefix::DS);
    debug!("Created Security header");
    security
}

/// Find or create the `wsse:Security` header.
///
/// Timestamps inside an existing header are marked into `queue`. A new header
/// carries no `mustUnderstand` attribute.
pub fn ensure_security_header(doc: &mut Document, queue: &mut SignQueue) -> Result<NodeId> {
    let header = soap_header(doc)?;

    let Some(security) = find_security_header(doc, header)? else {
        return Ok(create_security_header(doc, header));
    };

    let timestamps: Vec<NodeId> = doc
        .child_elements_named(security, ns::WSU, "Timestamp")
        .collect();
    debug!(
        "Reusing existing Security header with {} timestamp(s)",
        timestamps.len()
    );
    for timestamp in timestamps {
        queue.mark(doc, timestamp)?;
    }
    Ok(security)
}
