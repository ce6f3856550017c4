use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::NamedTempFile;

use crate::crypto::{KeyMaterial, PasswordSource};
use crate::pki::cert_utils::{generate_rsa_identity, write_identity};
use crate::soap::dom::{Document, NodeId};
use crate::soap::wsse::engine::{OpenSslContext, OpenSslEngine};
use crate::soap::wsse::*;

const ISSUER: &[(&str, &str)] = &[("C", "HU"), ("O", "Example Kft."), ("CN", "Example CA")];

const ENVELOPE: &str = r#"<?xml version="1.0" encoding="UTF-8"?><SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns1="urn:example:service"><SOAP-ENV:Header/><SOAP-ENV:Body><ns1:getQuote><ns1:symbol>ACME</ns1:symbol></ns1:getQuote></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;

fn rsa_key_material(password: Option<&str>, keytype: Option<&str>) -> (KeyMaterial, NamedTempFile) {
    let identity = generate_rsa_identity(ISSUER).unwrap();
    let file = write_identity(&identity, password).unwrap();
    let key = KeyMaterial::load(file.path(), keytype, PasswordSource::None).unwrap();
    (key, file)
}

/// Wraps the OpenSSL engine, counting released contexts and optionally failing
struct CountingEngine {
    released: Arc<AtomicUsize>,
    fail: bool,
}

struct CountingContext {
    inner: OpenSslContext,
    released: Arc<AtomicUsize>,
    fail: bool,
}

impl Drop for CountingContext {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl SigningEngine for CountingEngine {
    type Context = CountingContext;

    fn create_context(&self, key: &KeyMaterial) -> std::result::Result<CountingContext, EngineError> {
        Ok(CountingContext {
            inner: OpenSslEngine.create_context(key)?,
            released: self.released.clone(),
            fail: self.fail,
        })
    }
}

impl SigningContext for CountingContext {
    fn sign(&mut self, doc: &mut Document, signature: NodeId) -> std::result::Result<(), EngineError> {
        if self.fail {
            return Err(EngineError::Context("simulated engine failure".into()));
        }
        self.inner.sign(doc, signature)
    }
}

fn counting_signer(key: KeyMaterial, fail: bool) -> (WsseSigner<CountingEngine>, Arc<AtomicUsize>) {
    let released = Arc::new(AtomicUsize::new(0));
    let engine = CountingEngine {
        released: released.clone(),
        fail,
    };
    (WsseSigner::with_engine(key, engine), released)
}

#[test]
fn test_context_released_after_success() {
    let (key, _file) = rsa_key_material(None, None);
    let (signer, released) = counting_signer(key, false);

    let signed = signer.sign(ENVELOPE).unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let doc = Document::parse(&signed).unwrap();
    let value = doc.find_descendants(doc.root(), ns::DS, "SignatureValue");
    assert_eq!(value.len(), 1);
    assert!(!doc.text(value[0]).is_empty());
}

#[test]
fn test_engine_failure_is_terminal() {
    let (key, _file) = rsa_key_material(None, None);
    let (signer, released) = counting_signer(key, true);

    let mut doc = Document::parse(ENVELOPE).unwrap();
    let before = doc.to_xml();

    let result = signer.sign_document(&mut doc);
    assert!(matches!(result, Err(Error::Signing(EngineError::Context(_)))));
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(doc.to_xml(), before);

    assert!(matches!(signer.sign(ENVELOPE), Err(Error::Signing(_))));
    assert_eq!(released.load(Ordering::SeqCst), 2);
}

#[test]
fn test_key_load_failure_is_signing_error() {
    // An explicit keytype skips key inspection, so the missing password only
    // shows up when the signing context loads the key
    let (key, _file) = rsa_key_material(Some("s3cret"), Some("RSA"));
    let (signer, released) = counting_signer(key, false);

    let result = signer.sign(ENVELOPE);
    assert!(matches!(result, Err(Error::Signing(EngineError::Key(_)))));
    assert_eq!(released.load(Ordering::SeqCst), 0);
}

/// Run the pipeline up to the point where the engine takes over
fn prepared_template(key: &KeyMaterial) -> (Document, NodeId, NodeId) {
    let mut doc = Document::parse(ENVELOPE).unwrap();
    let mut queue = SignQueue::new();
    let body = soap_body(&doc).unwrap();
    queue.mark(&mut doc, body).unwrap();
    let security = ensure_security_header(&mut doc, &mut queue).unwrap();
    insert_certificate_token(&mut doc, security, key.certificate()).unwrap();
    let signature =
        insert_signature_template(&mut doc, security, &queue, key.key_type(), key.certificate())
            .unwrap();
    (doc, body, signature)
}

#[test]
fn test_engine_rejects_filled_placeholders() {
    let (key, _file) = rsa_key_material(None, None);
    let (mut doc, _, signature) = prepared_template(&key);

    let digest = doc.find_descendants(signature, ns::DS, "DigestValue")[0];
    doc.set_text(digest, "AAAA");

    let mut context = OpenSslEngine.create_context(&key).unwrap();
    assert!(matches!(
        context.sign(&mut doc, signature),
        Err(EngineError::AlreadyFilled(_))
    ));
}

#[test]
fn test_engine_rejects_unresolved_reference() {
    let (key, _file) = rsa_key_material(None, None);
    let (mut doc, body, signature) = prepared_template(&key);

    let id_attr = doc
        .attributes(body)
        .iter()
        .find(|a| a.name.ends_with(":Id"))
        .map(|a| a.name.clone())
        .unwrap();
    doc.remove_attribute(body, &id_attr);

    let mut context = OpenSslEngine.create_context(&key).unwrap();
    assert!(matches!(
        context.sign(&mut doc, signature),
        Err(EngineError::UnresolvedReference(_))
    ));
}

#[test]
fn test_engine_rejects_ambiguous_reference() {
    let (key, _file) = rsa_key_material(None, None);
    let (mut doc, body, signature) = prepared_template(&key);

    let id = doc.element_id(body).unwrap().to_string();
    let op = doc.child_elements(body).next().unwrap();
    doc.set_attribute(op, "Id", id);

    let mut context = OpenSslEngine.create_context(&key).unwrap();
    assert!(matches!(
        context.sign(&mut doc, signature),
        Err(EngineError::AmbiguousReference(_))
    ));
}

#[test]
fn test_locate_signature_picks_template() {
    let (key, _file) = rsa_key_material(None, None);
    let (doc, _, signature) = prepared_template(&key);
    let security = doc.parent(signature).unwrap();

    assert_eq!(OpenSslEngine.locate_signature(&doc, security).unwrap(), signature);
}

#[test]
fn test_unsupported_signature_method() {
    let (key, _file) = rsa_key_material(None, Some("urn:example:no-such-method"));
    let signer = WsseSigner::new(key);

    assert!(matches!(
        signer.sign(ENVELOPE),
        Err(Error::Signing(EngineError::UnsupportedAlgorithm(_)))
    ));
}

#[test]
fn test_marshalled_then_sending() {
    let (key, _file) = rsa_key_material(None, None);
    let chain = PluginChain::new()
        .with(Timestamper::default())
        .with(WsseSigner::new(key));

    let signed = chain.process(ENVELOPE).unwrap();
    let doc = Document::parse(&signed).unwrap();

    let refs = doc.find_descendants(doc.root(), ns::DS, "Reference");
    assert_eq!(refs.len(), 2);

    let body = soap_body(&doc).unwrap();
    let first = doc.attribute(refs[0], "URI").unwrap();
    assert_eq!(Some(&first[1..]), doc.element_id(body));

    let timestamp = doc.find_descendants(doc.root(), ns::WSU, "Timestamp");
    let second = doc.attribute(refs[1], "URI").unwrap();
    assert_eq!(Some(&second[1..]), doc.element_id(timestamp[0]));
}

#[test]
fn test_invalid_envelope_text() {
    let (key, _file) = rsa_key_material(None, None);
    let signer = WsseSigner::new(key);

    assert!(matches!(signer.sign("<unclosed>"), Err(Error::Xml(_))));
    assert!(matches!(
        signer.sign(r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/"><SOAP-ENV:Body/></SOAP-ENV:Envelope>"#),
        Err(Error::Structure(_))
    ));
}
