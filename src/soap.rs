pub mod dom;
pub mod wsse;

pub use dom::{Document, NodeId};

pub mod ns {
    /// SOAP 1.1 envelope namespace
    pub const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
    /// SOAP 1.2 envelope namespace
    pub const SOAP12_ENV: &str = "http://www.w3.org/2003/05/soap-envelope";
}

/// Whether `uri` is a SOAP envelope namespace
pub fn is_soap_envelope_ns(uri: &str) -> bool {
    uri == ns::SOAP_ENV || uri == ns::SOAP12_ENV
}
