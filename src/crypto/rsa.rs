use crate::crypto::HashAlg;
use crate::crypto::errors::{CryptoResult, Error};
use openssl::pkey::{HasPublic, PKeyRef, Private};
use openssl::sign::{Signer, Verifier};
use std::fmt;

/// Represents an RSA PKCS#1 v1.5 signature
#[derive(Clone, PartialEq, Eq)]
pub struct RsaSignature {
    data: Vec<u8>,
}

impl RsaSignature {
    /// Create a new RSA signature
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Get the signature data as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Convert signature to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }

    /// Get the signature length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if signature is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for RsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSignature")
            .field("size", &self.len())
            .field("hex", &self.to_hex())
            .finish()
    }
}

/// Sign data using an RSA private key (PKCS#1 v1.5 with DigestInfo)
pub fn sign(
    private_key: &PKeyRef<Private>,
    data: impl AsRef<[u8]>,
    hash_alg: HashAlg,
) -> CryptoResult<RsaSignature> {
    if private_key.rsa().is_err() {
        return Err(Error::Invalid(format!(
            "RSA signature requested with a {:?} key",
            private_key.id()
        )));
    }

    let mut signer = Signer::new(hash_alg.into(), private_key)?;
    signer.update(data.as_ref())?;
    Ok(RsaSignature::new(signer.sign_to_vec()?))
}

/// Verify RSA signature
pub fn verify<T: HasPublic>(
    public_key: &PKeyRef<T>,
    data: impl AsRef<[u8]>,
    signature: &RsaSignature,
    hash_alg: HashAlg,
) -> CryptoResult<bool> {
    let mut verifier = Verifier::new(hash_alg.into(), public_key)?;
    verifier.update(data.as_ref())?;
    Ok(verifier.verify(signature.as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;

    fn generate_key() -> PKey<Private> {
        PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
    }

    #[test]
    fn test_rsa_sign_verify() {
        let key = generate_key();
        let data = b"test data";

        for hash_alg in [HashAlg::Sha1, HashAlg::Sha256] {
            let signature = sign(&key, data, hash_alg).unwrap();
            assert_eq!(signature.len(), 256);
            assert!(verify(&key, data, &signature, hash_alg).unwrap());
            assert!(!verify(&key, b"wrong data", &signature, hash_alg).unwrap());
        }
    }

    #[test]
    fn test_cross_key_verification_fails() {
        let key1 = generate_key();
        let key2 = generate_key();

        let signature = sign(&key1, b"test data", HashAlg::Sha1).unwrap();
        assert!(!verify(&key2, b"test data", &signature, HashAlg::Sha1).unwrap());
    }

    #[test]
    fn test_sign_rejects_non_rsa_key() {
        let dsa = openssl::dsa::Dsa::generate(1024).unwrap();
        let key = PKey::from_dsa(dsa).unwrap();
        assert!(matches!(
            sign(&key, b"data", HashAlg::Sha1),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_signature_debug_format() {
        let key = generate_key();
        let signature = sign(&key, b"test data", HashAlg::Sha1).unwrap();
        let debug_str = format!("{signature:?}");

        assert!(debug_str.contains("RsaSignature"));
        assert!(debug_str.contains("size"));
        assert!(debug_str.contains("hex"));
    }
}
