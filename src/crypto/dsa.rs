//! DSA signatures in the XML-DSig wire format.
//!
//! OpenSSL emits DSA signatures as a DER `SEQUENCE { r, s }`, while XML-DSig
//! carries the raw concatenation `r || s`, each integer left-padded to the
//! byte length of the subgroup order `q` (20 bytes for `dsa-sha1`).

use crate::crypto::HashAlg;
use crate::crypto::errors::{CryptoResult, Error};
use openssl::bn::BigNum;
use openssl::dsa::DsaSig;
use openssl::pkey::{HasPublic, PKeyRef, Private};
use openssl::sign::{Signer, Verifier};

/// Sign data with a DSA private key and return `r || s`
pub fn sign(
    private_key: &PKeyRef<Private>,
    data: impl AsRef<[u8]>,
    hash_alg: HashAlg,
) -> CryptoResult<Vec<u8>> {
    let dsa = private_key.dsa().map_err(|_| {
        Error::Invalid(format!(
            "DSA signature requested with a {:?} key",
            private_key.id()
        ))
    })?;
    let component_len = dsa.q().num_bytes();

    let mut signer = Signer::new(hash_alg.into(), private_key)?;
    signer.update(data.as_ref())?;
    let der = signer.sign_to_vec()?;

    let sig = DsaSig::from_der(&der)?;
    let mut raw = sig.r().to_vec_padded(component_len)?;
    raw.extend(sig.s().to_vec_padded(component_len)?);
    Ok(raw)
}

/// Verify an `r || s` DSA signature
pub fn verify<T: HasPublic>(
    public_key: &PKeyRef<T>,
    data: impl AsRef<[u8]>,
    signature: &[u8],
    hash_alg: HashAlg,
) -> CryptoResult<bool> {
    if signature.is_empty() || signature.len() % 2 != 0 {
        return Err(Error::Invalid(format!(
            "DSA signature has odd length {}",
            signature.len()
        )));
    }

    let (r, s) = signature.split_at(signature.len() / 2);
    let sig = DsaSig::from_private_components(BigNum::from_slice(r)?, BigNum::from_slice(s)?)?;
    let der = sig.to_der()?;

    let mut verifier = Verifier::new(hash_alg.into(), public_key)?;
    verifier.update(data.as_ref())?;
    Ok(verifier.verify(&der)?)
}
