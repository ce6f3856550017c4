use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use openssl::pkey::{PKey, Private};
use tracing::{debug, trace};

use super::{EngineError, SigningContext, SigningEngine, init};
use crate::crypto::{HashAlg, KeyMaterial, dsa, rsa};
use crate::soap::dom::{Document, NodeId};
use crate::soap::wsse::{algorithms, c14n, ns};

/// Namespace of the `InclusiveNamespaces` transform parameter
const EXC_C14N_NS: &str = algorithms::EXCLUSIVE_C14N;

/// XML-DSig engine backed by OpenSSL and exclusive canonicalization
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenSslEngine;

impl SigningEngine for OpenSslEngine {
    type Context = OpenSslContext;

    fn create_context(&self, key: &KeyMaterial) -> Result<Self::Context, EngineError> {
        init();
        let private_key = key.private_key().map_err(EngineError::Key)?;
        trace!("Signing context acquired for {}", key.keyfile().display());
        Ok(OpenSslContext { key: private_key })
    }
}

/// Signing context holding the loaded private key
pub struct OpenSslContext {
    key: PKey<Private>,
}

impl Drop for OpenSslContext {
    fn drop(&mut self) {
        trace!("Signing context released");
    }
}

#[derive(Debug, Clone, Copy)]
enum SignatureAlg {
    Rsa(HashAlg),
    Dsa(HashAlg),
}

fn signature_algorithm(uri: &str) -> Result<SignatureAlg, EngineError> {
    match uri {
        algorithms::RSA_SHA1 => Ok(SignatureAlg::Rsa(HashAlg::Sha1)),
        algorithms::RSA_SHA256 => Ok(SignatureAlg::Rsa(HashAlg::Sha256)),
        algorithms::RSA_SHA512 => Ok(SignatureAlg::Rsa(HashAlg::Sha512)),
        algorithms::DSA_SHA1 => Ok(SignatureAlg::Dsa(HashAlg::Sha1)),
        other => Err(EngineError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn digest_algorithm(uri: &str) -> Result<HashAlg, EngineError> {
    match uri {
        algorithms::SHA1 => Ok(HashAlg::Sha1),
        algorithms::SHA256 => Ok(HashAlg::Sha256),
        algorithms::SHA512 => Ok(HashAlg::Sha512),
        other => Err(EngineError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn child(doc: &Document, parent: NodeId, local: &str) -> Result<NodeId, EngineError> {
    doc.first_child_named(parent, ns::DS, local)
        .ok_or_else(|| EngineError::MissingElement(local.to_string()))
}

fn algorithm_of(doc: &Document, node: NodeId) -> Result<&str, EngineError> {
    doc.attribute(node, "Algorithm").ok_or_else(|| {
        EngineError::MissingElement(format!("Algorithm on {}", doc.local_name(node)))
    })
}

/// Prefixes listed by an `InclusiveNamespaces` child of `node`
fn inclusive_prefixes(doc: &Document, node: NodeId) -> Option<Vec<String>> {
    let params = doc.first_child_named(node, EXC_C14N_NS, "InclusiveNamespaces")?;
    let list = doc.attribute(params, "PrefixList")?;
    Some(list.split_whitespace().map(str::to_string).collect())
}

fn canonicalize(
    doc: &Document,
    node: NodeId,
    prefixes: Option<&[String]>,
) -> Result<String, EngineError> {
    let prefixes: Option<Vec<&str>> =
        prefixes.map(|list| list.iter().map(String::as_str).collect());
    Ok(c14n::canonicalize(
        doc.subtree_xml(node),
        prefixes.as_deref(),
    )?)
}

fn ensure_empty(doc: &Document, node: NodeId) -> Result<(), EngineError> {
    if doc.text(node).trim().is_empty() {
        Ok(())
    } else {
        Err(EngineError::AlreadyFilled(doc.local_name(node).to_string()))
    }
}

impl OpenSslContext {
    fn digest_reference(&self, doc: &mut Document, reference: NodeId) -> Result<(), EngineError> {
        let uri = doc.attribute(reference, "URI").unwrap_or_default().to_string();
        let id = uri
            .strip_prefix('#')
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EngineError::UnresolvedReference(uri.clone()))?;

        let target = match doc.find_by_id(id).as_slice() {
            [target] => *target,
            [] => return Err(EngineError::UnresolvedReference(uri)),
            _ => return Err(EngineError::AmbiguousReference(uri)),
        };

        let mut prefixes = None;
        if let Some(transforms) = doc.first_child_named(reference, ns::DS, "Transforms") {
            for transform in doc.child_elements_named(transforms, ns::DS, "Transform") {
                let algorithm = algorithm_of(doc, transform)?;
                if algorithm != algorithms::EXCLUSIVE_C14N {
                    return Err(EngineError::UnsupportedAlgorithm(algorithm.to_string()));
                }
                prefixes = inclusive_prefixes(doc, transform);
            }
        }

        let digest_method = child(doc, reference, "DigestMethod")?;
        let hash = digest_algorithm(algorithm_of(doc, digest_method)?)?;
        let digest_value = child(doc, reference, "DigestValue")?;
        ensure_empty(doc, digest_value)?;

        let canonical = canonicalize(doc, target, prefixes.as_deref())?;
        let digest = hash.hash(canonical.as_bytes())?;
        debug!("Digested {uri} ({hash}, {} bytes canonical)", canonical.len());

        doc.set_text(digest_value, BASE64.encode(digest));
        Ok(())
    }
}

impl SigningContext for OpenSslContext {
    fn sign(&mut self, doc: &mut Document, signature: NodeId) -> Result<(), EngineError> {
        let signed_info = child(doc, signature, "SignedInfo")?;

        let c14n_method = child(doc, signed_info, "CanonicalizationMethod")?;
        let c14n_uri = algorithm_of(doc, c14n_method)?;
        if c14n_uri != algorithms::EXCLUSIVE_C14N {
            return Err(EngineError::UnsupportedAlgorithm(c14n_uri.to_string()));
        }
        let prefixes = inclusive_prefixes(doc, c14n_method);

        let method = child(doc, signed_info, "SignatureMethod")?;
        let algorithm = signature_algorithm(algorithm_of(doc, method)?)?;

        let signature_value = child(doc, signature, "SignatureValue")?;
        ensure_empty(doc, signature_value)?;

        let references: Vec<NodeId> = doc
            .child_elements_named(signed_info, ns::DS, "Reference")
            .collect();
        if references.is_empty() {
            return Err(EngineError::MissingElement("Reference".into()));
        }
        for reference in references {
            self.digest_reference(doc, reference)?;
        }

        let canonical = canonicalize(doc, signed_info, prefixes.as_deref())?;
        let value = match algorithm {
            SignatureAlg::Rsa(hash) => rsa::sign(&self.key, canonical.as_bytes(), hash)?
                .as_bytes()
                .to_vec(),
            SignatureAlg::Dsa(hash) => dsa::sign(&self.key, canonical.as_bytes(), hash)?,
        };

        doc.set_text(signature_value, BASE64.encode(value));
        Ok(())
    }
}
