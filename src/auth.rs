use std::env;
use std::fmt;

use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;

/// Token endpoint of the instance metadata server, the ambient credential
/// source on GCE and Cloud Run.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Bearer token for the Google REST APIs.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn token(&self) -> &str {
        &self.0
    }

    /// A token that authorizes nothing. Calls made with it fail with
    /// `permission_denied`, which every pipeline step already degrades on.
    pub fn empty() -> Self {
        AccessToken(String::new())
    }
}

impl From<String> for AccessToken {
    fn from(token: String) -> Self {
        AccessToken(token)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Resolves ambient service credentials: `GOOGLE_ACCESS_TOKEN` when set,
/// otherwise the metadata server. Fetched once at startup; invocations are
/// short-lived so expiry is not tracked.
pub async fn resolve_access_token(
    http: &reqwest::Client,
    metadata_url: &str,
) -> Result<AccessToken, ApiError> {
    if let Ok(token) = env::var("GOOGLE_ACCESS_TOKEN") {
        if !token.trim().is_empty() {
            debug!("using access token from environment");
            return Ok(AccessToken(token));
        }
    }

    let response = http
        .get(metadata_url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(ApiError::from)?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::from_status(status, body));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(AccessToken(token.access_token))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let token = AccessToken::from("ya29.secret".to_string());
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
        assert_eq!(token.token(), "ya29.secret");
    }
}
