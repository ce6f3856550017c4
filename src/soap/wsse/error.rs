use std::path::PathBuf;

use openssl::error::ErrorStack;

use crate::soap::dom;
use crate::soap::wsse::EngineError;
use crate::{crypto, pki};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid keytype {0:?}: expected \"RSA\", \"DSA\" or a signature method URI")]
    InvalidKeyType(String),

    #[error("Unknown keytype: {0}")]
    UnsupportedKey(String),

    #[error("Cannot load private key from {path}: {source}")]
    KeyLoad {
        path: PathBuf,
        #[source]
        source: ErrorStack,
    },

    #[error("Certificate error: {0}")]
    Certificate(#[source] pki::Error),

    #[error("The certificate issuer has a name with an illegal character encoding")]
    IssuerEncoding,

    #[error("Signature failed: {0}")]
    Signing(#[from] EngineError),

    #[error("Invalid SOAP message: {0}")]
    Structure(String),

    #[error("XML processing error: {0}")]
    Xml(#[from] dom::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[source] crypto::Error),

    #[error("Timestamp lifetime of {0} seconds is out of range")]
    TimestampLifetime(i64),

    #[error("Cannot format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

impl From<pki::Error> for Error {
    fn from(err: pki::Error) -> Self {
        match err {
            pki::Error::IssuerEncoding => Error::IssuerEncoding,
            pki::Error::Io { path, source } => Error::Io { path, source },
            other => Error::Certificate(other),
        }
    }
}

impl From<crypto::Error> for Error {
    fn from(err: crypto::Error) -> Self {
        match err {
            crypto::Error::InvalidKeyType(token) => Error::InvalidKeyType(token),
            crypto::Error::UnsupportedKey(kind) => Error::UnsupportedKey(kind),
            crypto::Error::KeyLoad { path, source } => Error::KeyLoad { path, source },
            crypto::Error::Io { path, source } => Error::Io { path, source },
            crypto::Error::Certificate(err) => err.into(),
            other => Error::Crypto(other),
        }
    }
}
