//! Legacy push-notification channel (second, independently authenticated
//! MQTT connection).

pub mod service;

pub use service::{NoticeDecoder, PushMqttHandle, PushMqttService};
