use chrono::{DateTime, Utc};
use gcs_s3_relay_core::contract::{Initiator, TransferOutcome, TransferRequest};
use gcs_s3_relay_core::error::RelayError;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::adapters::credentials::{CredentialProvider, DestinationConnector};
use crate::adapters::object_store::SourceStore;
use crate::config::RelayConfig;
use crate::handlers::lease::DestinationLease;
use crate::handlers::transfer::transfer_object;

/// The fields of a storage object-finalized notification the relay needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageObjectEvent {
    pub bucket: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDisposition {
    /// The payload did not describe a storage object.
    Rejected { reason: String },
    /// The event came from a bucket other than the staging bucket.
    Skipped { bucket: String, key: String },
    Processed(TransferOutcome),
    /// Setup for the transfer failed before the engine ran.
    Failed { key: String, cause: RelayError },
}

impl EventDisposition {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Skipped { .. } => "skipped",
            Self::Processed(outcome) => outcome.status(),
            Self::Failed { .. } => "failed",
        }
    }

    pub fn to_body(&self) -> Value {
        match self {
            Self::Rejected { reason } => json!({
                "status": self.status(),
                "message": reason,
            }),
            Self::Skipped { bucket, key } => json!({
                "status": self.status(),
                "bucket": bucket,
                "key": key,
            }),
            Self::Processed(TransferOutcome::Success {
                key,
                source_bucket,
                destination_bucket,
                was_gzip_at_source,
                input_bytes,
                output_bytes,
            }) => json!({
                "status": self.status(),
                "key": key,
                "source_bucket": source_bucket,
                "destination_bucket": destination_bucket,
                "gzip_input": was_gzip_at_source,
                "input_size": input_bytes,
                "output_size": output_bytes,
            }),
            Self::Processed(TransferOutcome::AlreadyExists { key }) => json!({
                "status": self.status(),
                "key": key,
            }),
            Self::Processed(TransferOutcome::Failure { key, cause }) | Self::Failed { key, cause } => {
                json!({
                    "status": self.status(),
                    "key": key,
                    "error": cause.to_string(),
                    "error_code": cause.code(),
                })
            }
        }
    }
}

/// Accepts the bare object document or a CloudEvent whose `data` carries it.
pub fn parse_object_event(event: Value) -> Result<StorageObjectEvent, String> {
    let Some(object) = event.as_object() else {
        return Err("Event payload must be a JSON object".to_string());
    };

    let document = match object.get("data") {
        None => event.clone(),
        Some(Value::Object(_)) => object["data"].clone(),
        Some(Value::String(text)) => serde_json::from_str(text)
            .map_err(|error| format!("Malformed CloudEvent data: {error}"))?,
        Some(_) => return Err("CloudEvent data must be a JSON object".to_string()),
    };

    let parsed = serde_json::from_value::<StorageObjectEvent>(document)
        .map_err(|error| format!("Malformed storage object event: {error}"))?;
    if parsed.bucket.trim().is_empty() || parsed.name.is_empty() {
        return Err("Storage object event must name a bucket and an object".to_string());
    }
    Ok(parsed)
}

/// Runs at most one transfer for the created object and never returns an
/// error; a failed object is left in place for the next sweep.
pub fn handle_object_created<P, C>(
    event: &StorageObjectEvent,
    config: &RelayConfig,
    now: DateTime<Utc>,
    source: &impl SourceStore,
    provider: &P,
    connector: &C,
) -> EventDisposition
where
    P: CredentialProvider,
    C: DestinationConnector,
{
    if event.bucket != config.staging_bucket {
        warn!(
            bucket = %event.bucket,
            expected = %config.staging_bucket,
            object = %event.name,
            "ignoring event from unexpected bucket"
        );
        return EventDisposition::Skipped {
            bucket: event.bucket.clone(),
            key: event.name.clone(),
        };
    }

    let setup_failed = |cause: RelayError| {
        error!(
            object = %event.name,
            error_code = cause.code(),
            error = %cause,
            "transfer setup failed"
        );
        EventDisposition::Failed {
            key: event.name.clone(),
            cause,
        }
    };

    let metadata = match source.get_metadata(&config.staging_bucket, &event.name) {
        Ok(metadata) => metadata,
        Err(cause) => return setup_failed(cause),
    };

    let mut lease = DestinationLease::new(
        provider,
        connector,
        &config.role_identifier,
        &config.destination_region,
    );
    let destination = match lease.acquire(now) {
        Ok(store) => store,
        Err(cause) => return setup_failed(cause),
    };

    let request = TransferRequest::new(
        config.staging_bucket.as_str(),
        event.name.as_str(),
        config.destination_bucket.as_str(),
        Initiator::TransferFunction,
    );
    let outcome = transfer_object(&request, &metadata, source, destination);
    info!(object = %event.name, status = outcome.status(), "event processed");
    EventDisposition::Processed(outcome)
}
