//! Reverse-engineered client for the eufy smart-lock MQTT telemetry and
//! control channel.
//!
//! Two independent transports are covered: the certificate-authenticated
//! security channel (lock status, lock/unlock commands) and the legacy
//! push-notification channel. Both are exposed as spawned actor services
//! with cloneable handles; decoded activity is delivered to the caller as
//! [`events::LockEvent`] values over a tokio mpsc channel.
//!
//! ```no_run
//! use std::sync::Arc;
//! use eufy_lock_mqtt::{AccountConfig, LockMqttService, PlainLockEncoder};
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (events_tx, mut events_rx) = mpsc::channel(100);
//! let account = AccountConfig {
//!     email: "user@example.com".into(),
//!     password: "secret".into(),
//!     openudid: "device-id".into(),
//! };
//! let handle = LockMqttService::spawn(account, Arc::new(PlainLockEncoder), events_tx);
//!
//! // Subscriptions issued before connect are queued and flushed once the
//! // broker acknowledges the connection.
//! handle.subscribe_lock("SN123", "T85D0").await?;
//! handle.connect("https://security-app.eufylife.com").await?;
//!
//! while let Some(event) = events_rx.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod codec;
pub mod config;
pub mod events;
pub mod mqtt;
pub mod push;

pub use auth::{AuthClient, AuthError, MqttCertInfo};
pub use config::{AccountConfig, PushCredentials};
pub use events::LockEvent;
pub use mqtt::{
    ConnectionState, LockCommandEncoder, LockIntent, LockMqttHandle, LockMqttService, MqttError,
    PlainLockEncoder,
};
pub use push::{NoticeDecoder, PushMqttHandle, PushMqttService};
