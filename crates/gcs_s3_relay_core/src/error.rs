use thiserror::Error;

/// Failure taxonomy shared by the stores, the transfer engine and the handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Destination credentials could not be obtained or are no longer valid.
    #[error("credential exchange failed: {message}")]
    Auth { message: String },

    #[error("failed to read {bucket}/{key}: {message}")]
    Fetch {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("failed to upload {bucket}/{key}: {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },

    /// The object vanished between two steps of an operation.
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("failed to delete {bucket}/{key}: {message}")]
    Delete {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("gzip stream failed: {message}")]
    Stream { message: String },
}

impl RelayError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn fetch(bucket: &str, key: &str, message: impl Into<String>) -> Self {
        Self::Fetch {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn upload(bucket: &str, key: &str, message: impl Into<String>) -> Self {
        Self::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn delete(bucket: &str, key: &str, message: impl Into<String>) -> Self {
        Self::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code used in response bodies and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth_error",
            Self::Fetch { .. } => "fetch_error",
            Self::Upload { .. } => "upload_error",
            Self::NotFound { .. } => "not_found",
            Self::Config { .. } => "config_error",
            Self::Delete { .. } => "delete_error",
            Self::Stream { .. } => "stream_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
