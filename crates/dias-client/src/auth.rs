//! Token authentication against the archive's identity service.

use reqwest::Client;
use serde::Deserialize;

use crate::api::Credentials;
use crate::error::{DiasError, Result};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Obtain a short-lived bearer token via the password grant.
pub async fn request_token(
    client: &Client,
    token_url: &str,
    credentials: &Credentials,
) -> Result<String> {
    let form = [
        ("client_id", "CLOUDFERRO_PUBLIC"),
        ("username", credentials.username.as_str()),
        ("password", credentials.password.as_str()),
        ("grant_type", "password"),
    ];

    let response = client.post(token_url).form(&form).send().await?;
    let status = response.status();
    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| DiasError::Auth(format!("invalid token response ({status}): {e}")))?;

    body.access_token
        .ok_or_else(|| DiasError::Auth(format!("no access token in response ({status})")))
}
