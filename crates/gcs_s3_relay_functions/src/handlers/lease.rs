use chrono::{DateTime, Duration, Utc};
use gcs_s3_relay_core::error::RelayError;
use tracing::info;

use crate::adapters::credentials::{CredentialProvider, DestinationConnector, TemporaryCredentials};

pub const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Destination credentials and the store bound to them, held for one
/// invocation. Credentials are re-exchanged once they come within the refresh
/// margin of expiry, never after.
pub struct DestinationLease<'a, P, C: DestinationConnector> {
    provider: &'a P,
    connector: &'a C,
    role_identifier: &'a str,
    region: &'a str,
    margin: Duration,
    current: Option<(TemporaryCredentials, C::Store)>,
    exchanges: u32,
}

impl<'a, P, C> DestinationLease<'a, P, C>
where
    P: CredentialProvider,
    C: DestinationConnector,
{
    pub fn new(provider: &'a P, connector: &'a C, role_identifier: &'a str, region: &'a str) -> Self {
        Self {
            provider,
            connector,
            role_identifier,
            region,
            margin: Duration::minutes(REFRESH_MARGIN_MINUTES),
            current: None,
            exchanges: 0,
        }
    }

    pub fn acquire(&mut self, now: DateTime<Utc>) -> Result<&C::Store, RelayError> {
        let needs_exchange = match &self.current {
            Some((credentials, _)) => credentials.expires_within(now, self.margin),
            None => true,
        };

        if needs_exchange {
            let credentials = self.provider.exchange(self.role_identifier, self.region)?;
            let store = self.connector.connect(&credentials, self.region)?;
            self.exchanges += 1;
            info!(
                role = self.role_identifier,
                region = self.region,
                expires_at = %credentials.expires_at,
                exchange = self.exchanges,
                "acquired destination credentials"
            );
            self.current = Some((credentials, store));
        }

        self.current
            .as_ref()
            .map(|(_, store)| store)
            .ok_or_else(|| RelayError::auth("destination credentials are unavailable"))
    }

    pub fn exchanges(&self) -> u32 {
        self.exchanges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{
        fixed_now, InMemoryConnector, InMemoryDestination, Journal, StaticCredentialProvider,
    };

    const ROLE: &str = "arn:aws:iam::123456789012:role/relay";

    #[test]
    fn reuses_credentials_inside_the_refresh_margin() {
        let destination = InMemoryDestination::new(Journal::default());
        let connector = InMemoryConnector::new(&destination);
        let provider = StaticCredentialProvider::expiring_at(fixed_now() + Duration::hours(1));
        let mut lease = DestinationLease::new(&provider, &connector, ROLE, "eu-west-1");

        lease.acquire(fixed_now()).expect("first acquire");
        lease
            .acquire(fixed_now() + Duration::minutes(30))
            .expect("second acquire");
        lease
            .acquire(fixed_now() + Duration::minutes(54))
            .expect("third acquire");

        assert_eq!(lease.exchanges(), 1);
        assert_eq!(
            provider.exchanges(),
            vec![(ROLE.to_string(), "eu-west-1".to_string())]
        );
        assert_eq!(connector.connected_with(), vec!["ASIA1"]);
    }

    #[test]
    fn re_exchanges_when_expiry_is_near() {
        let destination = InMemoryDestination::new(Journal::default());
        let connector = InMemoryConnector::new(&destination);
        let provider = StaticCredentialProvider::expiring_at(fixed_now() + Duration::hours(1));
        let mut lease = DestinationLease::new(&provider, &connector, ROLE, "eu-west-1");

        lease.acquire(fixed_now()).expect("first acquire");
        provider.set_expiry(fixed_now() + Duration::hours(2));
        lease
            .acquire(fixed_now() + Duration::minutes(56))
            .expect("refresh acquire");
        lease
            .acquire(fixed_now() + Duration::minutes(90))
            .expect("reuse refreshed credentials");

        assert_eq!(lease.exchanges(), 2);
        assert_eq!(connector.connected_with(), vec!["ASIA1", "ASIA2"]);
    }

    #[test]
    fn exchange_failure_is_an_auth_error() {
        let destination = InMemoryDestination::new(Journal::default());
        let connector = InMemoryConnector::new(&destination);
        let provider = StaticCredentialProvider::expiring_at(fixed_now() + Duration::hours(1));
        provider.fail_exchanges();
        let mut lease = DestinationLease::new(&provider, &connector, ROLE, "eu-west-1");

        let error = lease.acquire(fixed_now()).expect_err("exchange should fail");
        assert_eq!(error.code(), "auth_error");
        assert!(connector.connected_with().is_empty());
    }
}
