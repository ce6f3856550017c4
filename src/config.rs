use std::{collections::HashMap, path::PathBuf};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;

/// Settings of a single WS-Security signer.
#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    /// PEM file holding the certificate and the private key
    pub keyfile: PathBuf,
    /// `RSA`, `DSA` or a signature method URI; detected from the key if unset
    #[serde(default)]
    pub keytype: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Rename the SOAP `Body` to the `Envelope` prefix before signing
    #[serde(default = "default_align_body_prefix")]
    pub align_body_prefix: bool,
}

fn default_align_body_prefix() -> bool {
    true
}

impl SignerConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("align_body_prefix", true)?
            .add_source(File::with_name("config/signer").required(false));

        // An explicit map replaces the process environment so tests stay isolated
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // SIGNER_KEYFILE, SIGNER_KEYTYPE, SIGNER_PASSWORD
            builder = builder.add_source(
                Environment::with_prefix("SIGNER")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}
