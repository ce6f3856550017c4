#![allow(dead_code)]

use std::io::Write;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use openssl::pkey::{Id, PKey, Public};
use tempfile::NamedTempFile;

use soap_signer::crypto::{HashAlg, dsa, rsa};
use soap_signer::pki::cert_utils::{TestIdentity, identity_pem};
use soap_signer::soap::wsse::{algorithms, c14n, ns};
use soap_signer::soap::{Document, NodeId};

pub const ISSUER: &[(&str, &str)] = &[
    ("C", "HU"),
    ("L", "Budapest"),
    ("O", "Example Kft."),
    ("CN", "Example Signing CA"),
];

pub const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Write the identity into a key file; keep the handle alive while signing
pub fn key_file(identity: &TestIdentity, password: Option<&str>) -> NamedTempFile {
    let pem = identity_pem(identity, password).expect("failed to encode identity");
    let mut file = NamedTempFile::new().expect("failed to create key file");
    file.write_all(&pem).unwrap();
    file.flush().unwrap();
    file
}

/// A request envelope with the given Header content
pub fn envelope(header: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><SOAP-ENV:Envelope xmlns:SOAP-ENV="{SOAP_ENV}" xmlns:ns0="urn:example:orders" xmlns:wsse="{}" xmlns:wsu="{}"><SOAP-ENV:Header>{header}</SOAP-ENV:Header><SOAP-ENV:Body><ns0:placeOrder><ns0:item qty="2">Widget &amp; Co</ns0:item></ns0:placeOrder></SOAP-ENV:Body></SOAP-ENV:Envelope>"#,
        ns::WSSE,
        ns::WSU
    )
}

pub fn security(doc: &Document) -> NodeId {
    let header = doc
        .first_child_named(doc.root(), SOAP_ENV, "Header")
        .expect("no Header");
    let mut found = doc.child_elements_named(header, ns::WSSE, "Security");
    let security = found.next().expect("no Security header");
    assert!(found.next().is_none(), "more than one Security header");
    security
}

pub fn body(doc: &Document) -> NodeId {
    doc.first_child_named(doc.root(), SOAP_ENV, "Body")
        .expect("no Body")
}

fn ds_child(doc: &Document, parent: NodeId, local: &str) -> NodeId {
    doc.first_child_named(parent, ns::DS, local)
        .unwrap_or_else(|| panic!("missing ds:{local}"))
}

/// Targets of the `SignedInfo` references, in reference order
pub fn referenced_elements(doc: &Document) -> Vec<NodeId> {
    let signature = ds_child(doc, security(doc), "Signature");
    let signed_info = ds_child(doc, signature, "SignedInfo");
    doc.child_elements_named(signed_info, ns::DS, "Reference")
        .map(|reference| {
            let uri = doc.attribute(reference, "URI").expect("Reference without URI");
            let targets = doc.find_by_id(uri.trim_start_matches('#'));
            assert_eq!(targets.len(), 1, "{uri} must resolve to one element");
            targets[0]
        })
        .collect()
}

/// Recompute every digest and check the signature with `public_key`
pub fn verify_signature(signed: &str, public_key: &PKey<Public>) {
    let doc = Document::parse(signed).expect("signed output is not well-formed");
    let signature = ds_child(&doc, security(&doc), "Signature");
    let signed_info = ds_child(&doc, signature, "SignedInfo");

    for (reference, target) in doc
        .child_elements_named(signed_info, ns::DS, "Reference")
        .zip(referenced_elements(&doc))
    {
        let method = ds_child(&doc, reference, "DigestMethod");
        assert_eq!(doc.attribute(method, "Algorithm"), Some(algorithms::SHA1));

        let canonical = c14n::canonicalize(doc.subtree_xml(target), None).unwrap();
        let expected = BASE64.encode(HashAlg::Sha1.hash(canonical.as_bytes()).unwrap());
        let value = ds_child(&doc, reference, "DigestValue");
        assert_eq!(doc.text(value), expected, "digest mismatch");
    }

    let canonical = c14n::canonicalize(doc.subtree_xml(signed_info), None).unwrap();
    let value = doc.text(ds_child(&doc, signature, "SignatureValue"));
    let raw = BASE64.decode(value.trim()).expect("SignatureValue is not base64");

    let valid = match public_key.id() {
        Id::RSA => rsa::verify(
            public_key,
            canonical.as_bytes(),
            &rsa::RsaSignature::new(raw),
            HashAlg::Sha1,
        ),
        Id::DSA => dsa::verify(public_key, canonical.as_bytes(), &raw, HashAlg::Sha1),
        other => panic!("unexpected key type {other:?}"),
    }
    .unwrap();
    assert!(valid, "signature does not verify");
}
