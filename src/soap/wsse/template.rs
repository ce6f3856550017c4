use tracing::debug;

use crate::crypto::KeyType;
use crate::pki::Certificate;
use crate::soap::dom::{Document, NodeId};
use crate::soap::wsse::queue::set_algorithm;
use crate::soap::wsse::{Error, Result, SignQueue, algorithms, ns, prefix, token};

/// Identifier of the certificate token; one token exists per message
pub const CERT_TOKEN_ID: &str = "x509cert00";

/// Append the `wsse:BinarySecurityToken` carrying the certificate to `security`
pub fn insert_certificate_token(
    doc: &mut Document,
    security: NodeId,
    certificate: &Certificate,
) -> Result<NodeId> {
    if !doc.find_by_id(CERT_TOKEN_ID).is_empty() {
        return Err(Error::Structure(format!(
            "envelope already contains an element with id {CERT_TOKEN_ID}"
        )));
    }
    let value = certificate.token_value()?;

    let bst = doc.append_ns_element(security, ns::WSSE, prefix::WSSE, "BinarySecurityToken");
    doc.set_attribute(bst, "EncodingType", token::BASE64_BINARY);
    doc.set_attribute(bst, "ValueType", token::X509V3);
    doc.set_ns_attribute(bst, ns::WSU, prefix::WSU, "Id", CERT_TOKEN_ID);
    doc.set_text(bst, value);
    Ok(bst)
}

/// Append an unsigned `ds:Signature` skeleton to `security`.
///
/// `DigestValue` and `SignatureValue` are left empty for the signing engine.
pub fn insert_signature_template(
    doc: &mut Document,
    security: NodeId,
    queue: &SignQueue,
    key_type: &KeyType,
    certificate: &Certificate,
) -> Result<NodeId> {
    let issuer = certificate.issuer_name()?;
    let serial = certificate.serial_number()?;

    let signature = doc.append_ns_element(security, ns::DS, prefix::DS, "Signature");

    let signed_info = doc.append_ns_element(signature, ns::DS, prefix::DS, "SignedInfo");
    set_algorithm(
        doc,
        signed_info,
        "CanonicalizationMethod",
        algorithms::EXCLUSIVE_C14N,
    );
    set_algorithm(doc, signed_info, "SignatureMethod", key_type.signature_method());
    queue.build_references(doc, signed_info);

    doc.append_ns_element(signature, ns::DS, prefix::DS, "SignatureValue");

    let key_info = doc.append_ns_element(signature, ns::DS, prefix::DS, "KeyInfo");
    let token_ref =
        doc.append_ns_element(key_info, ns::WSSE, prefix::WSSE, "SecurityTokenReference");
    let reference = doc.append_ns_element(token_ref, ns::WSSE, prefix::WSSE, "Reference");
    doc.set_attribute(reference, "URI", format!("#{CERT_TOKEN_ID}"));
    doc.set_attribute(reference, "ValueType", token::X509V3);

    let x509_data = doc.append_ns_element(token_ref, ns::DS, prefix::DS, "X509Data");
    let issuer_serial = doc.append_ns_element(x509_data, ns::DS, prefix::DS, "X509IssuerSerial");
    let issuer_name = doc.append_ns_element(issuer_serial, ns::DS, prefix::DS, "X509IssuerName");
    doc.set_text(issuer_name, issuer);
    let serial_number =
        doc.append_ns_element(issuer_serial, ns::DS, prefix::DS, "X509SerialNumber");
    doc.set_text(serial_number, serial);

    debug!(
        "Inserted signature template with {} reference(s)",
        queue.len()
    );
    Ok(signature)
}
