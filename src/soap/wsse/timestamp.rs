use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;

use crate::soap::dom::{Document, NodeId};
use crate::soap::wsse::header::{create_security_header, find_security_header};
use crate::soap::wsse::{Error, MessagePlugin, Result, ns, prefix, soap_header};

const DEFAULT_TTL_SECONDS: i64 = 5 * 60;

/// Creation and expiry instants of a `wsu:Timestamp`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    pub created: String,
    pub expires: String,
}

impl Timestamp {
    /// Create a new timestamp valid for `ttl_seconds` (default 300) from now.
    ///
    /// A negative lifetime, or one that overflows the representable date
    /// range, is rejected.
    pub fn new(ttl_seconds: Option<i64>) -> Result<Self> {
        let seconds = ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS);
        if seconds < 0 {
            return Err(Error::TimestampLifetime(seconds));
        }
        let now = OffsetDateTime::now_utc();
        let expires = now
            .checked_add(Duration::seconds(seconds))
            .ok_or(Error::TimestampLifetime(seconds))?;

        let created = now.format(&Rfc3339)?;
        let expires = expires.format(&Rfc3339)?;

        Ok(Self { created, expires })
    }

    /// Insert as the first child of `security`
    pub fn insert(&self, doc: &mut Document, security: NodeId) -> NodeId {
        let timestamp = doc.insert_ns_element(security, Some(0), ns::WSU, prefix::WSU, "Timestamp");
        let created = doc.append_ns_element(timestamp, ns::WSU, prefix::WSU, "Created");
        doc.set_text(created, self.created.as_str());
        let expires = doc.append_ns_element(timestamp, ns::WSU, prefix::WSU, "Expires");
        doc.set_text(expires, self.expires.as_str());
        timestamp
    }
}

/// Adds a `wsu:Timestamp` to the Security header of outgoing envelopes.
///
/// Runs on the parsed document, before the signer, so the timestamp ends up
/// referenced from `SignedInfo` after the Body.
#[derive(Debug, Clone)]
pub struct Timestamper {
    ttl_seconds: i64,
}

impl Default for Timestamper {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl Timestamper {
    pub fn new(ttl_seconds: i64) -> Self {
        Self { ttl_seconds }
    }
}

impl MessagePlugin for Timestamper {
    fn marshalled(&self, doc: &mut Document) -> Result<()> {
        let timestamp = Timestamp::new(Some(self.ttl_seconds))?;
        let header = soap_header(doc)?;
        let security = match find_security_header(doc, header)? {
            Some(security) => {
                if doc.first_child_named(security, ns::WSU, "Timestamp").is_some() {
                    debug!("Security header already carries a timestamp");
                    return Ok(());
                }
                security
            }
            None => create_security_header(doc, header),
        };

        timestamp.insert(doc, security);
        debug!("Inserted timestamp valid for {}s", self.ttl_seconds);
        Ok(())
    }
}
