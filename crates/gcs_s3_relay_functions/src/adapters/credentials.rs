use std::fmt;

use chrono::{DateTime, Duration, Utc};
use gcs_s3_relay_core::error::RelayError;

use crate::adapters::object_store::DestinationStore;

/// Short-lived destination-store credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TemporaryCredentials {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Exchanges the workload identity for destination credentials.
pub trait CredentialProvider {
    fn exchange(
        &self,
        role_identifier: &str,
        region: &str,
    ) -> Result<TemporaryCredentials, RelayError>;
}

/// Builds a destination store bound to one set of credentials.
pub trait DestinationConnector {
    type Store: DestinationStore;

    fn connect(
        &self,
        credentials: &TemporaryCredentials,
        region: &str,
    ) -> Result<Self::Store, RelayError>;
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn credentials() -> TemporaryCredentials {
        TemporaryCredentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expires_at: Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap(),
        }
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", credentials());
        assert!(rendered.contains("ASIAEXAMPLE"));
        assert!(!rendered.contains("secret\""));
        assert!(!rendered.contains("\"token\""));
    }

    #[test]
    fn expiry_checks_respect_margin() {
        let creds = credentials();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 57, 0).unwrap();

        assert!(!creds.is_expired(now));
        assert!(creds.expires_within(now, Duration::minutes(5)));
        assert!(!creds.expires_within(now, Duration::minutes(1)));
        assert!(creds.is_expired(creds.expires_at));
    }
}
