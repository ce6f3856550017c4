use openssl::error::ErrorStack;
use std::path::PathBuf;
use thiserror::Error;

pub(crate) type CryptoResult<T> = Result<T, Error>;

/// Error type for key material and signing primitives
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid data format or corrupted data
    #[error("Invalid data: {0}")]
    Invalid(String),

    /// The keytype setting is neither `RSA`, `DSA` nor a signature method URI
    #[error("Invalid keytype {0:?}: expected \"RSA\", \"DSA\" or a signature method URI")]
    InvalidKeyType(String),

    /// The private key uses an algorithm that cannot produce XML-DSig signatures here
    #[error("Unsupported key algorithm: {0}")]
    UnsupportedKey(String),

    /// The private key could not be read from the key file
    #[error("Failed to load private key from {path}: {source}")]
    KeyLoad {
        path: PathBuf,
        #[source]
        source: ErrorStack,
    },

    /// The key file could not be read
    #[error("Failed to read key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The certificate in the key file is unusable
    #[error("Certificate error: {0}")]
    Certificate(#[from] crate::pki::Error),

    /// Internal OpenSSL error
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] ErrorStack),
}
