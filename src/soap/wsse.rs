pub mod c14n;
pub mod engine;
mod error;
mod header;
mod id;
mod queue;
mod signer;
mod template;
#[cfg(test)]
mod tests;
mod timestamp;

pub use engine::{EngineError, OpenSslEngine, SigningContext, SigningEngine};
pub use error::Error;
pub use header::{ensure_security_header, soap_body, soap_header};
pub use id::{ID_PREFIX, unique_id};
pub use queue::{QueueEntry, SignQueue};
pub use signer::{MessagePlugin, PluginChain, WsseSigner, align_body_prefix};
pub use template::{CERT_TOKEN_ID, insert_certificate_token, insert_signature_template};
pub use timestamp::{Timestamp, Timestamper};

pub type Result<T> = std::result::Result<T, Error>;

// Algorithm URIs
pub mod algorithms {
    // Digest algorithms
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

    // Signature algorithms
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
    pub const DSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#dsa-sha1";
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

    // Canonicalization algorithms
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
}

// Token profile URIs
pub mod token {
    pub const BASE64_BINARY: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
    pub const X509V3: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
}

// Namespaces
pub mod ns {
    pub const WSSE: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
    pub const WSU: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
    pub const DS: &str = "http://www.w3.org/2000/09/xmldsig#";
}

pub mod prefix {
    pub const WSSE: &str = "wsse";
    pub const WSU: &str = "wsu";
    pub const DS: &str = "ds";
}
