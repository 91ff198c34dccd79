use serde::Deserialize;

/// Account material the caller supplies for the security channel.
///
/// Nothing in this crate persists these values; token and certificate
/// caching is the caller's concern.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub email: String,
    pub password: String,
    /// Stable per-install device identifier, sent to the certificate
    /// endpoint and folded into the broker client id.
    pub openudid: String,
}

/// Credentials for the legacy push-notification channel.
///
/// The legacy broker authenticates with a username derived from the app
/// client id and the account email as password; no per-session certificate
/// is issued for it.
#[derive(Debug, Clone, Deserialize)]
pub struct PushCredentials {
    pub client_id: String,
    pub email: String,
    /// PEM root certificate to trust for the push broker. When absent the
    /// platform trust store is used.
    #[serde(default)]
    pub ca_pem: Option<Vec<u8>>,
}
