//! Signing engine seam.
//!
//! The engine receives a document whose signature template is complete and
//! fills every `DigestValue` and the `SignatureValue` in place.

mod dsig;

pub use dsig::{OpenSslContext, OpenSslEngine};

use std::sync::OnceLock;

use tracing::debug;

use crate::crypto::{self, KeyMaterial};
use crate::soap::dom::{self, Document, NodeId};
use crate::soap::wsse::ns;

static INIT: OnceLock<()> = OnceLock::new();

/// Initialise the crypto subsystem once per process.
///
/// There is no matching shutdown: the subsystem lives as long as the process.
pub fn init() {
    INIT.get_or_init(|| {
        openssl::init();
        debug!("Crypto subsystem initialised");
    });
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Cannot create signing context: {0}")]
    Context(String),

    #[error("Cannot load signing key: {0}")]
    Key(#[source] crypto::Error),

    #[error("Signature template has no {0}")]
    MissingElement(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Reference {0} does not resolve to any element")]
    UnresolvedReference(String),

    #[error("Reference {0} resolves to more than one element")]
    AmbiguousReference(String),

    #[error("{0} is already filled")]
    AlreadyFilled(String),

    #[error("Canonicalization failed: {0}")]
    Canonicalization(#[from] dom::Error),

    #[error("Digest or signature computation failed: {0}")]
    Crypto(#[from] crypto::Error),
}

/// A canonicalization and signing backend
pub trait SigningEngine {
    type Context: SigningContext;

    /// Declare an attribute local name that identifies elements
    fn register_id_attribute(&self, doc: &mut Document, name: &str) {
        doc.register_id_attribute(name);
    }

    /// Find the `ds:Signature` to fill below `scope`, the last one in document order
    fn locate_signature(&self, doc: &Document, scope: NodeId) -> Result<NodeId, EngineError> {
        doc.find_descendants(scope, ns::DS, "Signature")
            .pop()
            .ok_or_else(|| EngineError::MissingElement("Signature".into()))
    }

    /// Acquire a signing context bound to the private key of `key`.
    ///
    /// The context is released when dropped.
    fn create_context(&self, key: &KeyMaterial) -> Result<Self::Context, EngineError>;
}

/// Per-message signing state holding the private key
pub trait SigningContext {
    /// Compute all digests and the signature value of `signature`
    fn sign(&mut self, doc: &mut Document, signature: NodeId) -> Result<(), EngineError>;
}
