use gcs_s3_relay_core::contract::{ObjectMetadata, UploadOptions};
use gcs_s3_relay_core::error::RelayError;
use gcs_s3_relay_core::stream::ByteSource;

/// `Err` items are page failures and end the listing.
pub type ObjectListing<'a> = Box<dyn Iterator<Item = Result<ListedObject, RelayError>> + 'a>;

/// One listing entry. An entry whose resource could not be decoded is still
/// reported so the caller can count it and move on.
#[derive(Debug, Clone, PartialEq)]
pub enum ListedObject {
    Object(ObjectMetadata),
    Unreadable { key: String, cause: RelayError },
}

/// Read side of the staging store.
pub trait SourceStore {
    /// Fresh metadata for one object; `RelayError::NotFound` when it is gone.
    fn get_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, RelayError>;

    /// Object content as readers normally see it.
    fn open_read_stream(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Box<dyn ByteSource + '_>, RelayError>;

    /// Object content exactly as stored, with no transport decoding.
    fn open_read_stream_raw(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Box<dyn ByteSource + '_>, RelayError>;

    /// Lazily paginated listing; implementations hold at most one page.
    fn list_objects<'a>(&'a self, bucket: &'a str) -> ObjectListing<'a>;

    fn delete(&self, bucket: &str, key: &str) -> Result<(), RelayError>;
}

/// Write side of the destination store.
pub trait DestinationStore {
    /// Metadata-only existence check.
    fn head_object(&self, bucket: &str, key: &str) -> Result<bool, RelayError>;

    /// Streams `body` to `bucket/key`. The object must only become visible once
    /// this returns `Ok`.
    fn streaming_upload(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn ByteSource,
        options: &UploadOptions,
    ) -> Result<(), RelayError>;
}

impl<T: DestinationStore + ?Sized> DestinationStore for &T {
    fn head_object(&self, bucket: &str, key: &str) -> Result<bool, RelayError> {
        (**self).head_object(bucket, key)
    }

    fn streaming_upload(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn ByteSource,
        options: &UploadOptions,
    ) -> Result<(), RelayError> {
        (**self).streaming_upload(bucket, key, body, options)
    }
}
