//! Credential exchange against the vendor's account endpoints.
//!
//! Three sequential HTTP calls turn an email/password pair into the
//! short-lived mutual-TLS bundle the security broker requires. The chain is
//! re-run in full on every connect; nothing is cached here.

pub mod client;
pub mod error;

pub use client::{AuthClient, MqttCertInfo, SessionIdentity};
pub use error::AuthError;
