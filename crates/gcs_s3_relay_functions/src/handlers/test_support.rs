use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use gcs_s3_relay_core::contract::{ObjectMetadata, UploadOptions};
use gcs_s3_relay_core::error::RelayError;
use gcs_s3_relay_core::stream::{ByteSource, MemorySource};

use crate::adapters::credentials::{CredentialProvider, DestinationConnector, TemporaryCredentials};
use crate::adapters::object_store::{DestinationStore, ListedObject, ObjectListing, SourceStore};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip fixture should encode");
    encoder.finish().expect("gzip fixture should finish")
}

pub fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut decoded)
        .expect("uploaded body should be valid gzip");
    decoded
}

/// Shared ordered record of store calls across fakes.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    fn record(&self, entry: String) {
        self.entries.lock().expect("journal lock").push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("journal lock").clone()
    }
}

#[derive(Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_type: Option<String>,
    content_encoding: Option<String>,
    created_at: DateTime<Utc>,
}

pub struct InMemorySource {
    bucket: String,
    journal: Journal,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    vanishing: Mutex<BTreeSet<String>>,
    fail_deletes: Mutex<bool>,
    fail_listing_after: Mutex<Option<usize>>,
    unreadable: Mutex<BTreeSet<String>>,
}

impl InMemorySource {
    pub fn new(bucket: &str, journal: Journal) -> Self {
        Self {
            bucket: bucket.to_string(),
            journal,
            objects: Mutex::new(BTreeMap::new()),
            vanishing: Mutex::new(BTreeSet::new()),
            fail_deletes: Mutex::new(false),
            fail_listing_after: Mutex::new(None),
            unreadable: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn put(
        &self,
        key: &str,
        body: &[u8],
        content_type: Option<&str>,
        content_encoding: Option<&str>,
    ) {
        self.put_at(
            key,
            body,
            content_type,
            content_encoding,
            fixed_now() - Duration::minutes(5),
        );
    }

    pub fn put_at(
        &self,
        key: &str,
        body: &[u8],
        content_type: Option<&str>,
        content_encoding: Option<&str>,
        created_at: DateTime<Utc>,
    ) {
        self.objects.lock().expect("objects lock").insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                content_type: content_type.map(str::to_string),
                content_encoding: content_encoding.map(str::to_string),
                created_at,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.objects.lock().expect("objects lock").remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().expect("objects lock").contains_key(key)
    }

    /// The object disappears just before its delete call lands.
    pub fn vanish_on_delete(&self, key: &str) {
        self.vanishing
            .lock()
            .expect("vanishing lock")
            .insert(key.to_string());
    }

    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock().expect("flag lock") = true;
    }

    /// Lists `key` as an entry whose resource cannot be decoded.
    pub fn put_unreadable(&self, key: &str) {
        self.unreadable
            .lock()
            .expect("unreadable lock")
            .insert(key.to_string());
    }

    pub fn fail_listing_after(&self, listed: usize) {
        *self.fail_listing_after.lock().expect("flag lock") = Some(listed);
    }

    fn stored(&self, bucket: &str, key: &str) -> Result<StoredObject, RelayError> {
        if bucket != self.bucket {
            return Err(RelayError::not_found(bucket, key));
        }
        self.objects
            .lock()
            .expect("objects lock")
            .get(key)
            .cloned()
            .ok_or_else(|| RelayError::not_found(bucket, key))
    }
}

fn metadata_of(key: &str, object: &StoredObject) -> ObjectMetadata {
    ObjectMetadata {
        key: key.to_string(),
        size: object.body.len() as u64,
        content_type: object.content_type.clone(),
        content_encoding: object.content_encoding.clone(),
        created_at: object.created_at,
    }
}

/// Reads metadata straight from the fake without touching the journal.
pub fn metadata_for(source: &InMemorySource, key: &str) -> ObjectMetadata {
    let bucket = source.bucket.clone();
    let object = source
        .stored(&bucket, key)
        .expect("fixture object should exist");
    metadata_of(key, &object)
}

impl SourceStore for InMemorySource {
    fn get_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, RelayError> {
        self.journal.record(format!("metadata {bucket}/{key}"));
        self.stored(bucket, key)
            .map(|object| metadata_of(key, &object))
    }

    fn open_read_stream(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Box<dyn ByteSource + '_>, RelayError> {
        self.journal.record(format!("read {bucket}/{key}"));
        let object = self.stored(bucket, key)?;
        // Plain reads of gzip objects are served decoded, as GCS transcoding does.
        let body = if object.content_encoding.as_deref() == Some("gzip") {
            gunzip(&object.body)
        } else {
            object.body
        };
        Ok(Box::new(MemorySource::new(body)))
    }

    fn open_read_stream_raw(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Box<dyn ByteSource + '_>, RelayError> {
        self.journal.record(format!("read-raw {bucket}/{key}"));
        let object = self.stored(bucket, key)?;
        Ok(Box::new(MemorySource::new(object.body)))
    }

    fn list_objects<'a>(&'a self, bucket: &'a str) -> ObjectListing<'a> {
        let mut entries: BTreeMap<String, ListedObject> = BTreeMap::new();
        if bucket == self.bucket {
            for (key, object) in self.objects.lock().expect("objects lock").iter() {
                entries.insert(key.clone(), ListedObject::Object(metadata_of(key, object)));
            }
            for key in self.unreadable.lock().expect("unreadable lock").iter() {
                let cause = RelayError::fetch(bucket, key, "invalid object size: many");
                entries.insert(
                    key.clone(),
                    ListedObject::Unreadable {
                        key: key.clone(),
                        cause,
                    },
                );
            }
        }
        let listed: Vec<ListedObject> = entries.into_values().collect();
        let fail_after = *self.fail_listing_after.lock().expect("flag lock");

        let mut items: Vec<Result<ListedObject, RelayError>> = match fail_after {
            Some(limit) => listed.into_iter().take(limit).map(Ok).collect(),
            None => listed.into_iter().map(Ok).collect(),
        };
        if fail_after.is_some() {
            items.push(Err(RelayError::fetch(bucket, "", "listing page failed: HTTP 503")));
        }
        Box::new(items.into_iter())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), RelayError> {
        self.journal.record(format!("delete {bucket}/{key}"));
        if *self.fail_deletes.lock().expect("flag lock") {
            return Err(RelayError::delete(bucket, key, "HTTP 503"));
        }
        if self.vanishing.lock().expect("vanishing lock").remove(key) {
            self.remove(key);
            return Err(RelayError::not_found(bucket, key));
        }
        match self.objects.lock().expect("objects lock").remove(key) {
            Some(_) => Ok(()),
            None => Err(RelayError::not_found(bucket, key)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedObject {
    pub body: Vec<u8>,
    pub options: UploadOptions,
}

#[derive(Debug)]
pub struct InMemoryDestination {
    journal: Journal,
    objects: Mutex<BTreeMap<String, UploadedObject>>,
    uploads: Mutex<usize>,
    fail_uploads: Mutex<bool>,
    failing_keys: Mutex<BTreeSet<String>>,
    fail_head_requests: Mutex<bool>,
}

impl InMemoryDestination {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            objects: Mutex::new(BTreeMap::new()),
            uploads: Mutex::new(0),
            fail_uploads: Mutex::new(false),
            failing_keys: Mutex::new(BTreeSet::new()),
            fail_head_requests: Mutex::new(false),
        }
    }

    pub fn seed(&self, key: &str, body: &[u8]) {
        self.objects.lock().expect("objects lock").insert(
            key.to_string(),
            UploadedObject {
                body: body.to_vec(),
                options: UploadOptions {
                    content_encoding: "gzip".to_string(),
                    content_type: "application/octet-stream".to_string(),
                    metadata: BTreeMap::new(),
                },
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<UploadedObject> {
        self.objects.lock().expect("objects lock").get(key).cloned()
    }

    pub fn upload_count(&self) -> usize {
        *self.uploads.lock().expect("uploads lock")
    }

    pub fn fail_uploads(&self) {
        *self.fail_uploads.lock().expect("flag lock") = true;
    }

    pub fn fail_uploads_for(&self, key: &str) {
        self.failing_keys
            .lock()
            .expect("flag lock")
            .insert(key.to_string());
    }

    pub fn fail_head_requests(&self) {
        *self.fail_head_requests.lock().expect("flag lock") = true;
    }
}

impl DestinationStore for InMemoryDestination {
    fn head_object(&self, bucket: &str, key: &str) -> Result<bool, RelayError> {
        self.journal.record(format!("head {bucket}/{key}"));
        if *self.fail_head_requests.lock().expect("flag lock") {
            return Err(RelayError::fetch(bucket, key, "existence check failed: HTTP 403"));
        }
        Ok(self.objects.lock().expect("objects lock").contains_key(key))
    }

    fn streaming_upload(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn ByteSource,
        options: &UploadOptions,
    ) -> Result<(), RelayError> {
        self.journal.record(format!("upload {bucket}/{key}"));
        let failing = *self.fail_uploads.lock().expect("flag lock")
            || self.failing_keys.lock().expect("flag lock").contains(key);
        let mut received = Vec::new();
        loop {
            let chunk = body.read(Some(16 * 1024))?;
            if chunk.is_empty() {
                break;
            }
            received.extend_from_slice(&chunk);
            if failing {
                return Err(RelayError::upload(bucket, key, "connection reset mid-upload"));
            }
        }

        *self.uploads.lock().expect("uploads lock") += 1;
        self.objects.lock().expect("objects lock").insert(
            key.to_string(),
            UploadedObject {
                body: received,
                options: options.clone(),
            },
        );
        Ok(())
    }
}

/// Issues credentials with a configurable expiry and counts exchanges.
pub struct StaticCredentialProvider {
    expires_at: Mutex<DateTime<Utc>>,
    exchanges: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
}

impl StaticCredentialProvider {
    pub fn expiring_at(expires_at: DateTime<Utc>) -> Self {
        Self {
            expires_at: Mutex::new(expires_at),
            exchanges: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        }
    }

    pub fn set_expiry(&self, expires_at: DateTime<Utc>) {
        *self.expires_at.lock().expect("expiry lock") = expires_at;
    }

    pub fn fail_exchanges(&self) {
        *self.failing.lock().expect("flag lock") = true;
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.lock().expect("exchanges lock").len()
    }

    pub fn exchanges(&self) -> Vec<(String, String)> {
        self.exchanges.lock().expect("exchanges lock").clone()
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn exchange(
        &self,
        role_identifier: &str,
        region: &str,
    ) -> Result<TemporaryCredentials, RelayError> {
        if *self.failing.lock().expect("flag lock") {
            return Err(RelayError::auth("identity token was rejected"));
        }
        let mut exchanges = self.exchanges.lock().expect("exchanges lock");
        exchanges.push((role_identifier.to_string(), region.to_string()));
        Ok(TemporaryCredentials {
            access_key_id: format!("ASIA{}", exchanges.len()),
            secret_access_key: "secret".to_string(),
            session_token: "session".to_string(),
            expires_at: *self.expires_at.lock().expect("expiry lock"),
        })
    }
}

/// Hands out the same in-memory destination for every credential set.
pub struct InMemoryConnector<'a> {
    destination: &'a InMemoryDestination,
    connected_with: Mutex<Vec<String>>,
}

impl<'a> InMemoryConnector<'a> {
    pub fn new(destination: &'a InMemoryDestination) -> Self {
        Self {
            destination,
            connected_with: Mutex::new(Vec::new()),
        }
    }

    pub fn connected_with(&self) -> Vec<String> {
        self.connected_with.lock().expect("connect lock").clone()
    }
}

impl<'a> DestinationConnector for InMemoryConnector<'a> {
    type Store = &'a InMemoryDestination;

    fn connect(
        &self,
        credentials: &TemporaryCredentials,
        _region: &str,
    ) -> Result<Self::Store, RelayError> {
        self.connected_with
            .lock()
            .expect("connect lock")
            .push(credentials.access_key_id.clone());
        Ok(self.destination)
    }
}
