pub mod dsa;
mod errors;
pub mod keys;
pub mod rsa;

pub use errors::Error;
pub use keys::{KeyMaterial, KeyType, PasswordSource};

pub(crate) use errors::CryptoResult;
use openssl::hash::{Hasher, MessageDigest as Digest};
use std::fmt;

/// Hash algorithms used for reference digests and signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-512
    Sha512,
}

impl HashAlg {
    /// Hash the given data with this hash algorithm
    pub fn hash(&self, data: impl AsRef<[u8]>) -> CryptoResult<Vec<u8>> {
        let mut hasher = Hasher::new(self.into())?;
        hasher.update(data.as_ref())?;
        Ok(hasher.finish()?.to_vec())
    }
}

impl From<&HashAlg> for Digest {
    fn from(hash_alg: &HashAlg) -> Self {
        match hash_alg {
            HashAlg::Sha1 => Digest::sha1(),
            HashAlg::Sha256 => Digest::sha256(),
            HashAlg::Sha512 => Digest::sha512(),
        }
    }
}

impl From<HashAlg> for Digest {
    fn from(hash_alg: HashAlg) -> Self {
        (&hash_alg).into()
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlg::Sha1 => "SHA-1",
            HashAlg::Sha256 => "SHA-256",
            HashAlg::Sha512 => "SHA-512",
        };
        write!(f, "{name}")
    }
}
