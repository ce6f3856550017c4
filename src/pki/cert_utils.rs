//! Self-signed signing identities for tests and local tooling.

use openssl::asn1::{Asn1Integer, Asn1Time, Asn1Type};
use openssl::bn::{BigNum, MsbOption};
use openssl::dsa::Dsa;
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::symm::Cipher;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509, X509Builder, X509Name, X509NameBuilder};

/// A certificate with its private key
#[derive(Debug, Clone)]
pub struct TestIdentity {
    pub cert: X509,
    pub key: PKey<Private>,
}

/// Generate a self-signed RSA 2048 identity whose issuer is `name`
pub fn generate_rsa_identity(name: &[(&str, &str)]) -> Result<TestIdentity, ErrorStack> {
    let key = PKey::from_rsa(Rsa::generate(2048)?)?;
    self_signed(key, &create_x509_name(name)?)
}

/// Generate a self-signed DSA 1024 identity whose issuer is `name`
pub fn generate_dsa_identity(name: &[(&str, &str)]) -> Result<TestIdentity, ErrorStack> {
    let key = PKey::from_dsa(Dsa::generate(1024)?)?;
    self_signed(key, &create_x509_name(name)?)
}

/// Generate a self-signed P-256 identity whose issuer is `name`
pub fn generate_ec_identity(name: &[(&str, &str)]) -> Result<TestIdentity, ErrorStack> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    let key = PKey::from_ec_key(EcKey::generate(&group)?)?;
    self_signed(key, &create_x509_name(name)?)
}

/// Generate a self-signed RSA identity whose issuer is `name` followed by a
/// T61String common name holding the raw `common_name` bytes.
///
/// The bytes are patched into the DER after signing, so the self-signature
/// no longer verifies. Only the issuer text and the key pair are usable.
pub fn generate_rsa_identity_with_raw_cn(
    name: &[(&str, &str)],
    common_name: &[u8],
) -> Result<TestIdentity, ErrorStack> {
    let key = PKey::from_rsa(Rsa::generate(2048)?)?;
    let marker = "Q".repeat(common_name.len());

    let mut name_builder = X509NameBuilder::new()?;
    for (field, value) in name {
        name_builder.append_entry_by_text(field, value)?;
    }
    name_builder.append_entry_by_nid_with_type(Nid::COMMONNAME, &marker, Asn1Type::T61STRING)?;
    let identity = self_signed(key, &name_builder.build())?;

    // Patch inside the encoded name only, then swap the whole name in
    let original = identity.cert.issuer_name().to_der()?;
    let patched = replace_bytes(&original, marker.as_bytes(), common_name);
    let der = replace_bytes(&identity.cert.to_der()?, &original, &patched);

    Ok(TestIdentity {
        cert: X509::from_der(&der)?,
        key: identity.key,
    })
}

/// Certificate PEM followed by the PKCS#8 private key PEM.
///
/// With a `password` the key is encrypted with AES-256-CBC.
pub fn identity_pem(identity: &TestIdentity, password: Option<&str>) -> Result<Vec<u8>, ErrorStack> {
    let mut pem = identity.cert.to_pem()?;
    let key = match password {
        Some(password) => identity
            .key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), password.as_bytes())?,
        None => identity.key.private_key_to_pem_pkcs8()?,
    };
    pem.extend(key);
    Ok(pem)
}

/// Write the combined identity PEM into a temporary key file
#[cfg(test)]
pub fn write_identity(
    identity: &TestIdentity,
    password: Option<&str>,
) -> std::io::Result<tempfile::NamedTempFile> {
    use std::io::Write;

    let pem = identity_pem(identity, password).map_err(std::io::Error::other)?;
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(&pem)?;
    file.flush()?;
    Ok(file)
}

fn self_signed(key: PKey<Private>, subject_name: &X509Name) -> Result<TestIdentity, ErrorStack> {
    let mut cert_builder = X509Builder::new()?;
    cert_builder.set_version(2)?;

    let serial_number = generate_serial_number()?;
    cert_builder.set_serial_number(&serial_number)?;

    cert_builder.set_subject_name(subject_name)?;
    cert_builder.set_issuer_name(subject_name)?;
    cert_builder.set_pubkey(&key)?;

    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(365)?;
    cert_builder.set_not_before(&not_before)?;
    cert_builder.set_not_after(&not_after)?;

    cert_builder.append_extension(BasicConstraints::new().build()?)?;
    cert_builder.append_extension(KeyUsage::new().critical().digital_signature().build()?)?;

    cert_builder.sign(&key, MessageDigest::sha256())?;

    Ok(TestIdentity {
        cert: cert_builder.build(),
        key,
    })
}

fn generate_serial_number() -> Result<Asn1Integer, ErrorStack> {
    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
    serial.to_asn1_integer()
}

fn create_x509_name(entries: &[(&str, &str)]) -> Result<X509Name, ErrorStack> {
    let mut name_builder = X509NameBuilder::new()?;
    for (key, value) in entries {
        name_builder.append_entry_by_text(key, value)?;
    }
    Ok(name_builder.build())
}

/// Replace every occurrence of `from` with the same-length `to`
fn replace_bytes(data: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    if from.is_empty() || from.len() != to.len() {
        return out;
    }
    let mut i = 0;
    while i + from.len() <= out.len() {
        if out[i..i + from.len()] == *from {
            out[i..i + from.len()].copy_from_slice(to);
            i += from.len();
        } else {
            i += 1;
        }
    }
    out
}
