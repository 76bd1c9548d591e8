//! Scheduled retry path: every stale object still in the staging bucket is
//! handed to the transfer engine again.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use gcs_s3_relay_core::contract::{
    format_timestamp, Initiator, SweepSummary, TransferOutcome, TransferRequest,
};
use gcs_s3_relay_core::error::RelayError;
use gcs_s3_relay_core::sweep::SweepTally;
use tracing::{error, info};

use crate::adapters::credentials::{CredentialProvider, DestinationConnector};
use crate::adapters::object_store::{ListedObject, SourceStore};
use crate::config::RelayConfig;
use crate::handlers::lease::DestinationLease;
use crate::handlers::transfer::transfer_object;

/// Returns `Err` only for invocation-wide failures: credentials, a listing page,
/// or a lease refresh that could not be completed. Per-object failures,
/// including entries the listing could not decode, are counted.
pub fn handle_sweep<P, C>(
    config: &RelayConfig,
    now: DateTime<Utc>,
    source: &impl SourceStore,
    provider: &P,
    connector: &C,
) -> Result<SweepSummary, RelayError>
where
    P: CredentialProvider,
    C: DestinationConnector,
{
    let mut tally = SweepTally::new(now, config.age_threshold_minutes);
    info!(
        bucket = %config.staging_bucket,
        cutoff = %format_timestamp(&tally.cutoff()),
        age_threshold_minutes = config.age_threshold_minutes,
        "starting sweep"
    );

    let mut lease = DestinationLease::new(
        provider,
        connector,
        &config.role_identifier,
        &config.destination_region,
    );
    lease.acquire(now)?;
    let started_at = Instant::now();

    for listed in source.list_objects(&config.staging_bucket) {
        let metadata = match listed? {
            ListedObject::Object(metadata) => metadata,
            ListedObject::Unreadable { key, cause } => {
                error!(
                    object = %key,
                    error_code = cause.code(),
                    error = %cause,
                    "skipping unreadable listing entry"
                );
                tally.record_unreadable();
                continue;
            }
        };
        if !tally.observe(metadata.created_at) {
            continue;
        }

        let elapsed = Duration::from_std(started_at.elapsed()).unwrap_or_else(|_| Duration::zero());
        let destination = lease.acquire(now + elapsed)?;
        let request = TransferRequest::new(
            config.staging_bucket.as_str(),
            metadata.key.as_str(),
            config.destination_bucket.as_str(),
            Initiator::CleanupFunction,
        );
        let outcome = transfer_object(&request, &metadata, source, destination);
        if let TransferOutcome::Failure { key, cause } = &outcome {
            error!(
                object = %key,
                error_code = cause.code(),
                error = %cause,
                "sweep transfer failed"
            );
        }
        tally.record(&outcome);
    }

    let summary = tally.finish();
    info!(
        total_files = summary.total_files,
        stale_files = summary.stale_files,
        success = summary.successes,
        failures = summary.failures,
        already_transferred = summary.already_transferred,
        age_threshold_minutes = summary.age_threshold_minutes,
        cutoff_time = %format_timestamp(&summary.cutoff_time),
        credential_exchanges = lease.exchanges(),
        "sweep finished"
    );
    Ok(summary)
}
