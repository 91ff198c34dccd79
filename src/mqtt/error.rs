use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthError;

/// Errors surfaced by the security-channel service.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("authentication chain failed: {0}")]
    Auth(#[from] AuthError),

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("service channel error: {0}")]
    Channel(String),
}
