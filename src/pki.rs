pub mod cert_utils;
mod certificate;

pub use certificate::{Certificate, decode_issuer, strip_pem};

use openssl::error::ErrorStack;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for certificate handling
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No PEM certificate found: {0}")]
    Parse(#[source] ErrorStack),

    #[error("The certificate issuer has a name with an illegal character encoding")]
    IssuerEncoding,

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] ErrorStack),
}
