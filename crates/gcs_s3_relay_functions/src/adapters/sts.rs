use aws_config::{BehaviorVersion, Region};
use aws_sdk_sts::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use gcs_s3_relay_core::error::RelayError;
use tracing::{debug, error};

use crate::adapters::block_on;
use crate::adapters::credentials::{CredentialProvider, TemporaryCredentials};
use crate::adapters::metadata_server::MetadataServer;

pub const DEFAULT_SESSION_DURATION_SECONDS: i32 = 3600;

/// Federated credential exchange: a platform-issued identity token with the
/// role as audience is traded for role session credentials via
/// `AssumeRoleWithWebIdentity`.
pub struct StsCredentialProvider {
    metadata: MetadataServer,
    session_name: String,
    duration_seconds: i32,
}

impl StsCredentialProvider {
    pub fn new(metadata: MetadataServer, session_name: impl Into<String>) -> Self {
        Self {
            metadata,
            session_name: session_name.into(),
            duration_seconds: DEFAULT_SESSION_DURATION_SECONDS,
        }
    }
}

impl CredentialProvider for StsCredentialProvider {
    fn exchange(
        &self,
        role_identifier: &str,
        region: &str,
    ) -> Result<TemporaryCredentials, RelayError> {
        let identity_token = self.metadata.identity_token(role_identifier).map_err(|failure| {
            error!(audience = role_identifier, error = %failure, "failed to mint identity token");
            failure
        })?;

        let response = block_on(async {
            // AssumeRoleWithWebIdentity is an unsigned call.
            let config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .no_credentials()
                .load()
                .await;
            aws_sdk_sts::Client::new(&config)
                .assume_role_with_web_identity()
                .role_arn(role_identifier)
                .role_session_name(&self.session_name)
                .web_identity_token(identity_token)
                .duration_seconds(self.duration_seconds)
                .send()
                .await
        })
        .map_err(|failure| {
            RelayError::auth(format!(
                "assume role with web identity failed: {}",
                DisplayErrorContext(&failure)
            ))
        })?;

        let credentials = response
            .credentials()
            .ok_or_else(|| RelayError::auth("role session returned no credentials"))?;
        let expiration = credentials.expiration();
        let expires_at = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
            .ok_or_else(|| RelayError::auth("role session returned an invalid expiry"))?;

        debug!(role = role_identifier, expires_at = %expires_at, "obtained destination credentials");
        Ok(TemporaryCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expires_at,
        })
    }
}
