//! # Security MQTT Channel
//!
//! The mutual-TLS MQTT transport used for smart-lock telemetry and control.
//! This module owns the full path from account credentials to emitted
//! events:
//!
//! ```text
//! mqtt/
//! ├── service.rs  - connection state machine actor and caller handle
//! ├── envelope.rs - nested command-envelope construction
//! ├── router.rs   - inbound message decode pipeline
//! ├── topics.rs   - topic shapes and regional broker selection
//! ├── tls.rs      - client-certificate TLS configuration
//! └── error.rs    - error taxonomy
//! ```
//!
//! ## Lifecycle
//!
//! `connect()` exchanges the account credentials for a short-lived client
//! certificate (see [`crate::auth`]), opens the TLS connection on port 8883
//! and resolves once the broker acknowledges it. Subscriptions issued
//! before that point are queued and flushed on the transition into
//! `Connected`. There is no automatic reconnection: a lost connection
//! surfaces as a [`crate::events::LockEvent::Closed`] event and the caller
//! decides when to call `connect()` again.
//!
//! ## Ordering and correlation
//!
//! The wire protocol has no request-id. Lock command responses are matched
//! to devices by serial and topic direction only, which means overlapping
//! commands to one device are indistinguishable on the response side.

pub mod envelope;
pub mod error;
pub(crate) mod router;
pub mod service;
pub mod tls;
pub mod topics;

pub use envelope::{LockCommandEncoder, LockIntent, PlainLockEncoder};
pub use error::MqttError;
pub use service::{ConnectionState, LockMqttHandle, LockMqttService, CONNECT_TIMEOUT};
