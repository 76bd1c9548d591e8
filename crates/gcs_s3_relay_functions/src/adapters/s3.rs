//! Destination store backed by S3.
//!
//! Bodies that fit in one part go up with a single `PutObject`; anything larger
//! uses a multipart upload so at most one part is buffered at a time. Both
//! paths only make the object visible once the final request succeeds.

use std::collections::HashMap;
use std::time::SystemTime;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use chrono::Utc;
use gcs_s3_relay_core::contract::UploadOptions;
use gcs_s3_relay_core::error::RelayError;
use gcs_s3_relay_core::stream::ByteSource;
use tracing::{debug, warn};

use crate::adapters::block_on;
use crate::adapters::credentials::{DestinationConnector, TemporaryCredentials};
use crate::adapters::object_store::DestinationStore;

pub const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;
const CREDENTIALS_PROVIDER_NAME: &str = "sts-web-identity";

#[derive(Debug, Clone, Copy)]
pub struct S3Connector {
    pub part_size: usize,
}

impl Default for S3Connector {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

impl DestinationConnector for S3Connector {
    type Store = S3DestinationStore;

    fn connect(
        &self,
        credentials: &TemporaryCredentials,
        region: &str,
    ) -> Result<Self::Store, RelayError> {
        Ok(S3DestinationStore::new(credentials, region, self.part_size))
    }
}

pub struct S3DestinationStore {
    client: aws_sdk_s3::Client,
    credentials: TemporaryCredentials,
    part_size: usize,
}

impl S3DestinationStore {
    pub fn new(credentials: &TemporaryCredentials, region: &str, part_size: usize) -> Self {
        let provider = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
            Some(SystemTime::from(credentials.expires_at)),
            CREDENTIALS_PROVIDER_NAME,
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(provider)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
            credentials: credentials.clone(),
            part_size: part_size.max(1),
        }
    }

    /// Credentials are never presented past their expiry; a transfer that
    /// outlives its lease fails here instead of being retried with stale keys.
    fn ensure_lease(&self) -> Result<(), RelayError> {
        if self.credentials.is_expired(Utc::now()) {
            return Err(RelayError::auth(format!(
                "destination credentials expired at {}",
                self.credentials.expires_at.to_rfc3339()
            )));
        }
        Ok(())
    }

    fn put_single(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<(), RelayError> {
        self.ensure_lease()?;
        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_encoding(&options.content_encoding)
            .content_type(&options.content_type)
            .set_metadata(Some(metadata_map(options)))
            .body(ByteStream::from(body));

        block_on(request.send())
            .map(|_| ())
            .map_err(|error| RelayError::upload(bucket, key, DisplayErrorContext(&error).to_string()))
    }

    fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        first_part: Vec<u8>,
        body: &mut dyn ByteSource,
        options: &UploadOptions,
    ) -> Result<(), RelayError> {
        self.ensure_lease()?;
        let created = block_on(
            self.client
                .create_multipart_upload()
                .bucket(bucket)
                .key(key)
                .content_encoding(&options.content_encoding)
                .content_type(&options.content_type)
                .set_metadata(Some(metadata_map(options)))
                .send(),
        )
        .map_err(|error| RelayError::upload(bucket, key, DisplayErrorContext(&error).to_string()))?;

        let Some(upload_id) = created.upload_id().map(str::to_string) else {
            return Err(RelayError::upload(
                bucket,
                key,
                "multipart upload was created without an upload id",
            ));
        };

        match self.upload_parts(bucket, key, &upload_id, first_part, body) {
            Ok(parts) => self.complete(bucket, key, &upload_id, parts),
            Err(error) => {
                self.abort(bucket, key, &upload_id);
                Err(error)
            }
        }
    }

    fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        first_part: Vec<u8>,
        body: &mut dyn ByteSource,
    ) -> Result<Vec<CompletedPart>, RelayError> {
        let mut parts = Vec::new();
        let mut next = first_part;
        let mut part_number = 1i32;

        while !next.is_empty() {
            self.ensure_lease()?;
            let response = block_on(
                self.client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(next))
                    .send(),
            )
            .map_err(|error| RelayError::upload(bucket, key, DisplayErrorContext(&error).to_string()))?;

            debug!(object = key, part_number, "uploaded part");
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(response.e_tag().map(str::to_string))
                    .build(),
            );
            part_number += 1;
            next = read_part(body, self.part_size)?;
        }

        Ok(parts)
    }

    fn complete(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), RelayError> {
        self.ensure_lease()?;
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        let result = block_on(
            self.client
                .complete_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .multipart_upload(completed)
                .send(),
        );

        match result {
            Ok(_) => Ok(()),
            Err(error) => {
                self.abort(bucket, key, upload_id);
                Err(RelayError::upload(
                    bucket,
                    key,
                    DisplayErrorContext(&error).to_string(),
                ))
            }
        }
    }

    fn abort(&self, bucket: &str, key: &str, upload_id: &str) {
        let result = block_on(
            self.client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .send(),
        );
        if let Err(error) = result {
            warn!(
                object = key,
                upload_id,
                error = %DisplayErrorContext(&error),
                "failed to abort multipart upload"
            );
        }
    }
}

impl DestinationStore for S3DestinationStore {
    fn head_object(&self, bucket: &str, key: &str) -> Result<bool, RelayError> {
        self.ensure_lease()?;
        match block_on(self.client.head_object().bucket(bucket).key(key).send()) {
            Ok(_) => Ok(true),
            Err(error) => {
                if error
                    .as_service_error()
                    .is_some_and(|service_error| service_error.is_not_found())
                {
                    Ok(false)
                } else {
                    Err(RelayError::fetch(
                        bucket,
                        key,
                        format!("existence check failed: {}", DisplayErrorContext(&error)),
                    ))
                }
            }
        }
    }

    fn streaming_upload(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn ByteSource,
        options: &UploadOptions,
    ) -> Result<(), RelayError> {
        let first_part = read_part(body, self.part_size)?;
        if first_part.len() < self.part_size {
            return self.put_single(bucket, key, first_part, options);
        }
        self.put_multipart(bucket, key, first_part, body, options)
    }
}

/// Pulls up to `part_size` bytes; a short part means the body is exhausted.
pub fn read_part(body: &mut dyn ByteSource, part_size: usize) -> Result<Vec<u8>, RelayError> {
    let mut part = Vec::with_capacity(part_size);
    while part.len() < part_size {
        let chunk = body.read(Some(part_size - part.len()))?;
        if chunk.is_empty() {
            break;
        }
        part.extend_from_slice(&chunk);
    }
    Ok(part)
}

fn metadata_map(options: &UploadOptions) -> HashMap<String, String> {
    options
        .metadata
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
