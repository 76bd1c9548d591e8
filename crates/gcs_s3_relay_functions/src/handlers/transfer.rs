//! Moves one object from the staging store to the destination store.
//!
//! Order per object is existence check, adapter selection, upload, delete. The
//! source is deleted only after the destination copy is confirmed, either by
//! the existence check or by a completed upload.

use std::time::Instant;

use gcs_s3_relay_core::content::{is_gzip_encoded, upload_options};
use gcs_s3_relay_core::contract::{ObjectMetadata, TransferOutcome, TransferRequest};
use gcs_s3_relay_core::error::RelayError;
use gcs_s3_relay_core::stream::{ByteSource, GzipCompressingSource, PassthroughSource};
use tracing::{debug, error, info};

use crate::adapters::object_store::{DestinationStore, SourceStore};

/// Opens the stored bytes of an already gzip-encoded object for verbatim relay.
pub fn open_passthrough<'a>(
    source: &'a impl SourceStore,
    bucket: &str,
    key: &str,
) -> Result<PassthroughSource<Box<dyn ByteSource + 'a>>, RelayError> {
    Ok(PassthroughSource::new(source.open_read_stream_raw(bucket, key)?))
}

/// Never fails: every error is folded into `TransferOutcome::Failure` so batch
/// callers can carry on with the next object.
pub fn transfer_object(
    request: &TransferRequest,
    metadata: &ObjectMetadata,
    source: &impl SourceStore,
    destination: &impl DestinationStore,
) -> TransferOutcome {
    let started_at = Instant::now();
    match run_transfer(request, metadata, source, destination) {
        Ok(outcome) => {
            if let TransferOutcome::Success {
                source_bucket,
                destination_bucket,
                was_gzip_at_source,
                input_bytes,
                output_bytes,
                key,
            } = &outcome
            {
                info!(
                    source = %format!("gs://{source_bucket}/{key}"),
                    target = %format!("s3://{destination_bucket}/{key}"),
                    gzip_input = *was_gzip_at_source,
                    input_size = *input_bytes,
                    output_size = *output_bytes,
                    duration_ms = started_at.elapsed().as_millis() as u64,
                    "transferred object"
                );
            }
            outcome
        }
        Err(cause) => {
            error!(
                object = request.key(),
                bucket = %request.source.bucket,
                error_code = cause.code(),
                error = %cause,
                duration_ms = started_at.elapsed().as_millis() as u64,
                "transfer failed"
            );
            TransferOutcome::Failure {
                key: request.key().to_string(),
                cause,
            }
        }
    }
}

fn run_transfer(
    request: &TransferRequest,
    metadata: &ObjectMetadata,
    source: &impl SourceStore,
    destination: &impl DestinationStore,
) -> Result<TransferOutcome, RelayError> {
    let source_bucket = request.source.bucket.as_str();
    let key = request.key();
    let destination_bucket = request.destination_bucket.as_str();

    if destination.head_object(destination_bucket, key)? {
        info!(object = key, "object already present at destination, deleting source copy");
        delete_source(source, source_bucket, key)?;
        return Ok(TransferOutcome::AlreadyExists {
            key: key.to_string(),
        });
    }

    let options = upload_options(request, metadata);
    let was_gzip_at_source = is_gzip_encoded(metadata.content_encoding.as_deref());
    debug!(
        object = key,
        content_encoding = metadata.content_encoding.as_deref().unwrap_or("none"),
        size = metadata.size,
        passthrough = was_gzip_at_source,
        "selected stream adapter"
    );

    let output_bytes = if was_gzip_at_source {
        let mut stream = open_passthrough(source, source_bucket, key)?;
        destination.streaming_upload(destination_bucket, key, &mut stream, &options)?;
        stream.bytes_emitted()
    } else {
        let plain = source.open_read_stream(source_bucket, key)?;
        let mut stream = GzipCompressingSource::new(plain);
        destination.streaming_upload(destination_bucket, key, &mut stream, &options)?;
        stream.bytes_emitted()
    };

    delete_source(source, source_bucket, key)?;

    Ok(TransferOutcome::Success {
        key: key.to_string(),
        source_bucket: source_bucket.to_string(),
        destination_bucket: destination_bucket.to_string(),
        was_gzip_at_source,
        input_bytes: metadata.size,
        output_bytes,
    })
}

/// Only called once a destination copy is confirmed. A source object that is
/// already gone was removed by a concurrent transfer of the same key.
fn delete_source(source: &impl SourceStore, bucket: &str, key: &str) -> Result<(), RelayError> {
    match source.delete(bucket, key) {
        Ok(()) => Ok(()),
        Err(error) if error.is_not_found() => {
            debug!(object = key, "source object already deleted");
            Ok(())
        }
        Err(error) => Err(error),
    }
}
