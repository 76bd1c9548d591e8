use std::time::Duration;

use gcs_s3_relay_core::error::RelayError;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;

const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const SERVICE_ACCOUNT_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

/// Client for the platform metadata server of the function's service account.
#[derive(Debug, Clone)]
pub struct MetadataServer {
    http: Client,
    base_url: String,
}

impl MetadataServer {
    pub fn from_env() -> Result<Self, RelayError> {
        let host = std::env::var("GCE_METADATA_HOST")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());
        Self::new(&host)
    }

    pub fn new(host: &str) -> Result<Self, RelayError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| RelayError::auth(format!("failed to build metadata client: {error}")))?;
        Ok(Self {
            http,
            base_url: service_account_url(host),
        })
    }

    /// Signed identity token (JWT) whose audience is `audience`.
    pub fn identity_token(&self, audience: &str) -> Result<String, RelayError> {
        let request = self
            .get("identity")
            .query(&[("audience", audience), ("format", "full")]);
        let response = send(request, "identity token")?;
        response
            .text()
            .map(|token| token.trim().to_string())
            .map_err(|error| RelayError::auth(format!("failed to read identity token: {error}")))
    }

    /// OAuth access token used for storage API calls.
    pub fn access_token(&self) -> Result<String, RelayError> {
        let response = send(self.get("token"), "access token")?;
        response
            .json::<AccessTokenResponse>()
            .map(|body| body.access_token)
            .map_err(|error| RelayError::auth(format!("failed to decode access token: {error}")))
    }

    fn get(&self, resource: &str) -> RequestBuilder {
        self.http
            .get(format!("{}/{resource}", self.base_url))
            .header("Metadata-Flavor", "Google")
    }
}

fn send(
    request: RequestBuilder,
    what: &str,
) -> Result<reqwest::blocking::Response, RelayError> {
    let response = request
        .send()
        .map_err(|error| RelayError::auth(format!("metadata server {what} request failed: {error}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::auth(format!(
            "metadata server {what} request returned HTTP {status}"
        )));
    }
    Ok(response)
}

pub fn service_account_url(host: &str) -> String {
    format!("http://{}{SERVICE_ACCOUNT_PATH}", host.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_service_account_url_for_host_override() {
        assert_eq!(
            service_account_url("127.0.0.1:8085/"),
            "http://127.0.0.1:8085/computeMetadata/v1/instance/service-accounts/default"
        );
        assert_eq!(
            service_account_url(DEFAULT_METADATA_HOST),
            "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default"
        );
    }
}
