use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

pub const GZIP_ENCODING: &str = "gzip";
pub const JSON_LINES_CONTENT_TYPE: &str = "application/x-ndjson";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
pub const NO_ENCODING_LABEL: &str = "none";

pub const METADATA_SOURCE_BUCKET: &str = "source-bucket";
pub const METADATA_SOURCE_SIZE: &str = "source-size";
pub const METADATA_ORIGINAL_ENCODING: &str = "original-encoding";
pub const METADATA_TRANSFERRED_BY: &str = "transferred-by";

/// Which entry point started a transfer; recorded on the destination object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Initiator {
    TransferFunction,
    CleanupFunction,
}

impl Initiator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransferFunction => "transfer-function",
            Self::CleanupFunction => "cleanup-function",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Source object attributes as read from the staging store at transfer time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source: ObjectRef,
    pub destination_bucket: String,
    pub initiator: Initiator,
}

impl TransferRequest {
    pub fn new(
        source_bucket: impl Into<String>,
        key: impl Into<String>,
        destination_bucket: impl Into<String>,
        initiator: Initiator,
    ) -> Self {
        Self {
            source: ObjectRef::new(source_bucket, key),
            destination_bucket: destination_bucket.into(),
            initiator,
        }
    }

    pub fn key(&self) -> &str {
        &self.source.key
    }
}

/// Attributes attached to the destination object by a streaming upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub content_encoding: String,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    AlreadyExists {
        key: String,
    },
    Success {
        key: String,
        source_bucket: String,
        destination_bucket: String,
        was_gzip_at_source: bool,
        input_bytes: u64,
        output_bytes: u64,
    },
    Failure {
        key: String,
        cause: RelayError,
    },
}

impl TransferOutcome {
    pub fn key(&self) -> &str {
        match self {
            Self::AlreadyExists { key } | Self::Success { key, .. } | Self::Failure { key, .. } => {
                key
            }
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "already_exists",
            Self::Success { .. } => "success",
            Self::Failure { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Aggregate counters reported by one sweep invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub total_files: u64,
    pub stale_files: u64,
    #[serde(rename = "success")]
    pub successes: u64,
    pub failures: u64,
    pub already_transferred: u64,
    pub age_threshold_minutes: i64,
    #[serde(with = "rfc3339_seconds")]
    pub cutoff_time: DateTime<Utc>,
}

mod rfc3339_seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|value| value.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}
