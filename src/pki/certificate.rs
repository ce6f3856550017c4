use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use openssl::x509::X509;
use tracing::warn;

use super::Error;

const BEGIN_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----";
const END_CERTIFICATE: &str = "-----END CERTIFICATE-----";

/// An X.509 certificate as embedded in the WS-Security header.
#[derive(Debug, Clone)]
pub struct Certificate {
    x509: Arc<X509>,
}

impl Certificate {
    /// Load the first PEM certificate found in `path`.
    ///
    /// The file may also contain the private key; other PEM blocks are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_pem(&pem)
    }

    /// Parse the first certificate in PEM data
    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        let x509 = X509::from_pem(pem).map_err(Error::Parse)?;
        Ok(Self::from(x509))
    }

    /// Base64 certificate body with the PEM armour and line breaks removed
    pub fn token_value(&self) -> Result<String, Error> {
        let pem = self.x509.to_pem()?;
        Ok(strip_pem(&String::from_utf8_lossy(&pem)))
    }

    /// Issuer distinguished name as `attr=value` pairs joined by `", "`.
    ///
    /// Values are decoded as UTF-8, then as Latin-1.
    pub fn issuer_name(&self) -> Result<String, Error> {
        let mut raw = Vec::new();
        for (i, entry) in self.x509.issuer_name().entries().enumerate() {
            if i > 0 {
                raw.extend_from_slice(b", ");
            }
            let object = entry.object();
            match object.nid().short_name() {
                Ok(name) => raw.extend_from_slice(name.as_bytes()),
                Err(_) => raw.extend_from_slice(object.to_string().as_bytes()),
            }
            raw.push(b'=');
            raw.extend_from_slice(entry.data().as_slice());
        }
        decode_issuer(&raw).map(Cow::into_owned)
    }

    /// Serial number in decimal notation
    pub fn serial_number(&self) -> Result<String, Error> {
        let serial = self.x509.serial_number().to_bn()?;
        Ok(serial.to_dec_str()?.to_string())
    }
}

impl From<X509> for Certificate {
    fn from(x509: X509) -> Self {
        Self {
            x509: Arc::new(x509),
        }
    }
}

/// Remove PEM markers and every line break from a PEM certificate
pub fn strip_pem(pem: &str) -> String {
    pem.replace(BEGIN_CERTIFICATE, "")
        .replace(END_CERTIFICATE, "")
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect()
}

/// Decode a raw issuer name, trying UTF-8 first and Latin-1 second.
///
/// Bytes `0x80..=0x9F` have no printable Latin-1 meaning; a name containing
/// them in a non UTF-8 sequence is rejected.
pub fn decode_issuer(raw: &[u8]) -> Result<Cow<'_, str>, Error> {
    if let Ok(text) = std::str::from_utf8(raw) {
        return Ok(Cow::Borrowed(text));
    }

    if raw.iter().any(|b| (0x80..=0x9F).contains(b)) {
        return Err(Error::IssuerEncoding);
    }

    warn!("Certificate issuer name is not valid UTF-8, decoding as Latin-1");
    Ok(Cow::Owned(raw.iter().map(|&b| char::from(b)).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::cert_utils::{generate_rsa_identity, generate_rsa_identity_with_raw_cn};

    #[test]
    fn test_strip_pem() {
        let pem = "-----BEGIN CERTIFICATE-----\nMIIB\r\nAbCd\n-----END CERTIFICATE-----\n";
        assert_eq!(strip_pem(pem), "MIIBAbCd");
    }

    #[test]
    fn test_token_value_has_no_armour() {
        let identity = generate_rsa_identity(&[("CN", "Token Test")]).unwrap();
        let cert = Certificate::from(identity.cert);
        let value = cert.token_value().unwrap();

        assert!(!value.contains("-----"));
        assert!(!value.contains('\n'));
        assert_eq!(strip_pem(&value), value);
        assert!(value.starts_with("MII"));
    }

    #[test]
    fn test_ascii_issuer_resolves_as_utf8() {
        let raw = b"C=HU, O=Example, CN=Example CA";
        assert!(matches!(decode_issuer(raw).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_latin1_issuer_fallback() {
        let raw = b"CN=Caf\xe9";
        let decoded = decode_issuer(raw).unwrap();
        assert!(matches!(decoded, Cow::Owned(_)));
        assert_eq!(decoded, "CN=Caf\u{e9}");
    }

    #[test]
    fn test_undecodable_issuer() {
        let raw = b"CN=\x81\x9f";
        assert!(matches!(decode_issuer(raw), Err(Error::IssuerEncoding)));
    }

    #[test]
    fn test_issuer_and_serial() {
        let identity = generate_rsa_identity(&[
            ("C", "HU"),
            ("O", "Example Kft."),
            ("CN", "Example CA"),
        ])
        .unwrap();
        let expected_serial = identity
            .cert
            .serial_number()
            .to_bn()
            .unwrap()
            .to_dec_str()
            .unwrap()
            .to_string();
        let cert = Certificate::from(identity.cert);

        assert_eq!(
            cert.issuer_name().unwrap(),
            "C=HU, O=Example Kft., CN=Example CA"
        );
        assert_eq!(cert.serial_number().unwrap(), expected_serial);
        assert!(cert.serial_number().unwrap().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_utf8_issuer() {
        let identity = generate_rsa_identity(&[("CN", "Kiraly Andras Tanusitvany"), ("O", "Árvíztűrő")]).unwrap();
        let cert = Certificate::from(identity.cert);
        assert_eq!(
            cert.issuer_name().unwrap(),
            "CN=Kiraly Andras Tanusitvany, O=Árvíztűrő"
        );
    }

    #[test]
    fn test_latin1_issuer_in_certificate() {
        let identity = generate_rsa_identity_with_raw_cn(&[("C", "HU")], b"Caf\xe9").unwrap();
        let cert = Certificate::from(identity.cert);
        assert_eq!(cert.issuer_name().unwrap(), "C=HU, CN=Caf\u{e9}");
    }

    #[test]
    fn test_control_bytes_in_certificate_issuer() {
        let identity = generate_rsa_identity_with_raw_cn(&[("C", "HU")], b"Caf\x85").unwrap();
        let cert = Certificate::from(identity.cert);
        assert!(matches!(cert.issuer_name(), Err(Error::IssuerEncoding)));
    }

    #[test]
    fn test_from_pem_without_certificate() {
        assert!(matches!(
            Certificate::from_pem(b"not a certificate"),
            Err(Error::Parse(_))
        ));
    }
}
