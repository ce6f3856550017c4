pub mod config;
pub mod crypto;
pub mod pki;
pub mod soap;
pub mod telemetry;
