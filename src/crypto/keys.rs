//! Key material: the certificate, the private key location and the signing
//! algorithm identity derived from them.

use crate::config::SignerConfig;
use crate::crypto::errors::{CryptoResult, Error};
use crate::pki::Certificate;
use crate::soap::wsse::algorithms;
use openssl::pkey::{Id, PKey, Private};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Signing algorithm family of the configured key.
///
/// Decided once when the key material is loaded and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    /// RSA key, signs with `rsa-sha1`
    Rsa,
    /// DSA key, signs with `dsa-sha1`
    Dsa,
    /// Pre-resolved signature method URI, used verbatim
    Method(String),
}

impl KeyType {
    /// Parse an explicit keytype setting.
    ///
    /// `RSA` and `DSA` are matched case-sensitively. Any other value must be a
    /// signature method URI and is passed through unchanged.
    pub fn parse(token: &str) -> CryptoResult<Self> {
        match token {
            "RSA" => Ok(KeyType::Rsa),
            "DSA" => Ok(KeyType::Dsa),
            uri if is_method_uri(uri) => Ok(KeyType::Method(uri.to_string())),
            other => Err(Error::InvalidKeyType(other.to_string())),
        }
    }

    /// Map the algorithm of a loaded private key to a key type
    pub fn detect(key: &PKey<Private>) -> CryptoResult<Self> {
        match key.id() {
            Id::RSA => Ok(KeyType::Rsa),
            Id::DSA => Ok(KeyType::Dsa),
            other => Err(Error::UnsupportedKey(format!("{other:?}"))),
        }
    }

    /// XML-DSig `SignatureMethod` algorithm URI for this key type
    pub fn signature_method(&self) -> &str {
        match self {
            KeyType::Rsa => algorithms::RSA_SHA1,
            KeyType::Dsa => algorithms::DSA_SHA1,
            KeyType::Method(uri) => uri,
        }
    }
}

impl FromStr for KeyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Rsa => write!(f, "RSA"),
            KeyType::Dsa => write!(f, "DSA"),
            KeyType::Method(uri) => write!(f, "{uri}"),
        }
    }
}

fn is_method_uri(token: &str) -> bool {
    !token.is_empty()
        && !token.chars().any(char::is_whitespace)
        && (token.contains("://") || token.starts_with("urn:"))
}

type PasswordCallback = Arc<dyn Fn() -> Option<SecretString> + Send + Sync>;

/// Where the password of an encrypted private key comes from
#[derive(Clone, Default)]
pub enum PasswordSource {
    /// The key is not encrypted
    #[default]
    None,
    /// Literal password
    Literal(SecretString),
    /// Invoked each time the key is loaded
    Callback(PasswordCallback),
}

impl PasswordSource {
    /// Use a callback that produces the password on demand
    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn() -> Option<SecretString> + Send + Sync + 'static,
    {
        PasswordSource::Callback(Arc::new(callback))
    }

    /// Use a callback that receives `context` on every invocation
    pub fn callback_with_context<C, F>(context: C, callback: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&C) -> Option<SecretString> + Send + Sync + 'static,
    {
        PasswordSource::Callback(Arc::new(move || callback(&context)))
    }

    fn resolve(&self) -> Option<SecretString> {
        match self {
            PasswordSource::None => None,
            PasswordSource::Literal(password) => Some(password.clone()),
            PasswordSource::Callback(callback) => callback(),
        }
    }
}

impl From<Option<SecretString>> for PasswordSource {
    fn from(password: Option<SecretString>) -> Self {
        password.map_or(PasswordSource::None, PasswordSource::Literal)
    }
}

impl fmt::Debug for PasswordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordSource::None => write!(f, "PasswordSource::None"),
            PasswordSource::Literal(_) => write!(f, "PasswordSource::Literal([REDACTED])"),
            PasswordSource::Callback(_) => write!(f, "PasswordSource::Callback"),
        }
    }
}

/// Certificate, private key location and algorithm identity for one signer
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    keyfile: PathBuf,
    certificate: Certificate,
    key_type: KeyType,
    password: PasswordSource,
}

impl KeyMaterial {
    /// Load the certificate from `keyfile` and resolve the key type.
    ///
    /// Without an explicit `keytype` the private key is loaded once and its
    /// algorithm inspected.
    pub fn load(
        keyfile: impl Into<PathBuf>,
        keytype: Option<&str>,
        password: PasswordSource,
    ) -> CryptoResult<Self> {
        let keyfile = keyfile.into();
        let certificate = Certificate::load(&keyfile)?;

        let key_type = match keytype {
            Some(token) => KeyType::parse(token)?,
            None => {
                let key = load_private_key(&keyfile, &password)?;
                let detected = KeyType::detect(&key)?;
                debug!("Detected {detected} key in {}", keyfile.display());
                detected
            }
        };

        info!(
            "Loaded key material from {} (key type: {key_type})",
            keyfile.display()
        );

        Ok(Self {
            keyfile,
            certificate,
            key_type,
            password,
        })
    }

    /// Load key material as described by the signer configuration.
    ///
    /// A callback in `callback` takes precedence over a configured password.
    pub fn from_config(
        config: &SignerConfig,
        callback: Option<PasswordSource>,
    ) -> CryptoResult<Self> {
        let password = callback.unwrap_or_else(|| config.password.clone().into());
        Self::load(config.keyfile.clone(), config.keytype.as_deref(), password)
    }

    /// Read the private key from the key file.
    ///
    /// The key is not cached: callers hold it only while signing.
    pub fn private_key(&self) -> CryptoResult<PKey<Private>> {
        load_private_key(&self.keyfile, &self.password)
    }

    pub fn key_type(&self) -> &KeyType {
        &self.key_type
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn keyfile(&self) -> &Path {
        &self.keyfile
    }
}

fn load_private_key(keyfile: &Path, password: &PasswordSource) -> CryptoResult<PKey<Private>> {
    let pem = std::fs::read(keyfile).map_err(|source| Error::Io {
        path: keyfile.to_path_buf(),
        source,
    })?;

    // An empty passphrase keeps OpenSSL from prompting on the terminal when an
    // encrypted key arrives without a password.
    let result = match password {
        PasswordSource::Callback(_) => PKey::private_key_from_pem_callback(&pem, |buf| {
            let secret = password
                .resolve()
                .unwrap_or_else(|| SecretString::from(String::new()));
            let bytes = secret.expose_secret().as_bytes();
            if bytes.len() > buf.len() {
                return Err(openssl::error::ErrorStack::get());
            }
            buf[..bytes.len()].copy_from_slice(bytes);
            Ok(bytes.len())
        }),
        _ => {
            let secret = password
                .resolve()
                .unwrap_or_else(|| SecretString::from(String::new()));
            PKey::private_key_from_pem_passphrase(&pem, secret.expose_secret().as_bytes())
        }
    };

    result.map_err(|source| Error::KeyLoad {
        path: keyfile.to_path_buf(),
        source,
    })
}
