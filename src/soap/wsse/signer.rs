use tracing::{debug, info};

use crate::config::SignerConfig;
use crate::crypto::{KeyMaterial, PasswordSource};
use crate::soap::dom::{DEFAULT_ID_ATTRIBUTE, Document};
use crate::soap::wsse::engine::{self, OpenSslEngine, SigningContext, SigningEngine};
use crate::soap::wsse::{
    Result, SignQueue, ensure_security_header, insert_certificate_token,
    insert_signature_template, soap_body,
};

/// Hooks invoked by the SOAP client on every outgoing message
pub trait MessagePlugin {
    /// The envelope has been built and can still be edited as a document
    fn marshalled(&self, _doc: &mut Document) -> Result<()> {
        Ok(())
    }

    /// The envelope text is about to be sent; returns the text to send instead
    fn sending(&self, envelope: &str) -> Result<String> {
        Ok(envelope.to_string())
    }
}

/// Plugins applied in registration order
#[derive(Default)]
pub struct PluginChain {
    plugins: Vec<Box<dyn MessagePlugin + Send + Sync>>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, plugin: impl MessagePlugin + Send + Sync + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run both hooks of every plugin over an outgoing envelope
    pub fn process(&self, envelope: &str) -> Result<String> {
        let mut doc = Document::parse(envelope)?;
        self.marshalled(&mut doc)?;
        self.sending(&doc.to_xml())
    }
}

impl MessagePlugin for PluginChain {
    fn marshalled(&self, doc: &mut Document) -> Result<()> {
        self.plugins
            .iter()
            .try_for_each(|plugin| plugin.marshalled(doc))
    }

    fn sending(&self, envelope: &str) -> Result<String> {
        self.plugins
            .iter()
            .try_fold(envelope.to_string(), |text, plugin| plugin.sending(&text))
    }
}

/// Signs the Body (and a Timestamp found in an existing Security header) of
/// outgoing SOAP envelopes with an X.509 certificate.
pub struct WsseSigner<E: SigningEngine = OpenSslEngine> {
    key: KeyMaterial,
    engine: E,
    align_body_prefix: bool,
}

impl WsseSigner<OpenSslEngine> {
    pub fn new(key: KeyMaterial) -> Self {
        engine::init();
        Self::with_engine(key, OpenSslEngine)
    }

    /// Build a signer from configuration, loading the key material
    pub fn from_config(config: &SignerConfig) -> Result<Self> {
        Self::from_config_with_password(config, None)
    }

    /// Like [`WsseSigner::from_config`], with a password source such as a callback
    pub fn from_config_with_password(
        config: &SignerConfig,
        password: Option<PasswordSource>,
    ) -> Result<Self> {
        let key = KeyMaterial::from_config(config, password)?;
        Ok(Self::new(key).with_body_prefix_alignment(config.align_body_prefix))
    }
}

impl<E: SigningEngine> WsseSigner<E> {
    pub fn with_engine(key: KeyMaterial, engine: E) -> Self {
        info!(
            "WS-Security signer ready ({} key from {})",
            key.key_type(),
            key.keyfile().display()
        );
        Self {
            key,
            engine,
            align_body_prefix: true,
        }
    }

    /// Rename the `Body` to the `Envelope` prefix in the `marshalled` hook
    pub fn with_body_prefix_alignment(mut self, enabled: bool) -> Self {
        self.align_body_prefix = enabled;
        self
    }

    pub fn key_material(&self) -> &KeyMaterial {
        &self.key
    }

    /// Sign an envelope and return the signed text
    pub fn sign(&self, envelope: &str) -> Result<String> {
        let mut doc = Document::parse(envelope)?;
        self.sign_document(&mut doc)?;
        let signed = doc.to_xml();
        debug!("WS call text after signature:\n{signed}");
        Ok(signed)
    }

    /// Sign a parsed envelope.
    ///
    /// On error `doc` is left untouched.
    pub fn sign_document(&self, doc: &mut Document) -> Result<()> {
        let mut work = doc.clone();
        self.sign_in_place(&mut work)?;
        *doc = work;
        Ok(())
    }

    fn sign_in_place(&self, doc: &mut Document) -> Result<()> {
        // The Body is queued first so that its Reference precedes any Timestamp
        let mut queue = SignQueue::new();
        let body = soap_body(doc)?;
        queue.mark(doc, body)?;
        let security = ensure_security_header(doc, &mut queue)?;

        insert_certificate_token(doc, security, self.key.certificate())?;
        insert_signature_template(
            doc,
            security,
            &queue,
            self.key.key_type(),
            self.key.certificate(),
        )?;

        self.engine
            .register_id_attribute(doc, DEFAULT_ID_ATTRIBUTE);
        let signature = self.engine.locate_signature(doc, security)?;

        let mut context = self.engine.create_context(&self.key)?;
        context.sign(doc, signature)?;
        Ok(())
    }
}

impl<E: SigningEngine> MessagePlugin for WsseSigner<E> {
    fn marshalled(&self, doc: &mut Document) -> Result<()> {
        if self.align_body_prefix {
            align_body_prefix(doc)?;
        }
        Ok(())
    }

    fn sending(&self, envelope: &str) -> Result<String> {
        self.sign(envelope)
    }
}

/// Give the SOAP `Body` the same prefix as the `Envelope`.
///
/// Some stacks (Axis) only accept a single prefix for the envelope namespace.
/// Nothing changes when the Envelope prefix is not bound to the same
/// namespace at the Body.
pub fn align_body_prefix(doc: &mut Document) -> Result<()> {
    let root = doc.root();
    let body = soap_body(doc)?;

    let envelope_prefix = doc.prefix(root).map(str::to_string);
    if doc.prefix(body).map(str::to_string) == envelope_prefix {
        return Ok(());
    }

    let envelope_ns = doc.namespace_uri(root).map(str::to_string);
    if doc.lookup_namespace(body, envelope_prefix.as_deref()) != envelope_ns.as_deref() {
        debug!("Envelope prefix is rebound at the Body, leaving Body prefix unchanged");
        return Ok(());
    }

    let name = match &envelope_prefix {
        Some(prefix) => format!("{prefix}:Body"),
        None => "Body".to_string(),
    };
    debug!("Renaming {} to {name}", doc.name(body));
    doc.rename(body, name);
    Ok(())
}
