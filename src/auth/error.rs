use thiserror::Error;

/// Failures of the credential chain. Each step fails fast; there is no
/// retry inside this layer.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login rejected, no access token in response: {0}")]
    Login(String),

    #[error("user-center exchange failed: {0}")]
    UserCenter(String),

    #[error("certificate issuance failed with code {code}: {message}")]
    Certificate { code: i64, message: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}
