//! Staging store backed by the Cloud Storage JSON API.
//!
//! The HTTP client is built without transport decompression, so the raw read
//! path hands back exactly the bytes the bucket stores.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gcs_s3_relay_core::contract::{ObjectMetadata, ObjectRef};
use gcs_s3_relay_core::error::RelayError;
use gcs_s3_relay_core::stream::{ByteSource, ReaderSource};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::ACCEPT_ENCODING;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::adapters::metadata_server::MetadataServer;
use crate::adapters::object_store::{ListedObject, ObjectListing, SourceStore};

pub const GCS_API_BASE: &str = "https://storage.googleapis.com";
const LIST_PAGE_SIZE: &str = "1000";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const LISTING_KEY: &str = "(listing)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    size: String,
    content_type: Option<String>,
    content_encoding: Option<String>,
    time_created: DateTime<Utc>,
}

impl ObjectResource {
    fn into_metadata(self, bucket: &str) -> Result<ObjectMetadata, RelayError> {
        let size = self.size.parse::<u64>().map_err(|error| {
            RelayError::fetch(bucket, &self.name, format!("invalid object size: {error}"))
        })?;
        Ok(ObjectMetadata {
            key: self.name,
            size,
            content_type: self.content_type,
            content_encoding: self.content_encoding,
            created_at: self.time_created,
        })
    }

    fn into_listed(self, bucket: &str) -> ListedObject {
        let key = self.name.clone();
        match self.into_metadata(bucket) {
            Ok(metadata) => ListedObject::Object(metadata),
            Err(cause) => ListedObject::Unreadable { key, cause },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectPage {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

pub struct GcsSourceStore {
    http: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl GcsSourceStore {
    /// Uses `STORAGE_EMULATOR_HOST` when set, otherwise the public endpoint with
    /// a service-account access token from the metadata server.
    pub fn connect(metadata: &MetadataServer) -> Result<Self, RelayError> {
        match std::env::var("STORAGE_EMULATOR_HOST")
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            Some(endpoint) => Self::new(&endpoint, None),
            None => Self::new(GCS_API_BASE, Some(metadata.access_token()?)),
        }
    }

    pub fn new(endpoint: &str, access_token: Option<String>) -> Result<Self, RelayError> {
        let base_url = parse_endpoint(endpoint)?;
        let http = Client::builder()
            .no_gzip()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(|error| RelayError::config(format!("failed to build storage client: {error}")))?;
        Ok(Self {
            http,
            base_url,
            access_token,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn open_media(
        &self,
        bucket: &str,
        key: &str,
        preserve_encoding: bool,
    ) -> Result<Box<dyn ByteSource + '_>, RelayError> {
        let url = object_url(&self.base_url, bucket, Some(key))?;
        let mut request = self
            .authorized(self.http.get(url))
            .query(&[("alt", "media")]);
        if preserve_encoding {
            request = request.header(ACCEPT_ENCODING, "gzip");
        }

        let response = request
            .send()
            .map_err(|error| RelayError::fetch(bucket, key, error.to_string()))?;
        let response = check_read_status(response, bucket, key)?;
        Ok(Box::new(ReaderSource::new(
            response,
            ObjectRef::new(bucket, key),
        )))
    }

    fn fetch_page(&self, bucket: &str, page_token: Option<&str>) -> Result<ObjectPage, RelayError> {
        let url = object_url(&self.base_url, bucket, None)?;
        let mut request = self
            .authorized(self.http.get(url))
            .query(&[("maxResults", LIST_PAGE_SIZE)]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request
            .send()
            .map_err(|error| RelayError::fetch(bucket, LISTING_KEY, error.to_string()))?;
        let response = check_read_status(response, bucket, LISTING_KEY)?;
        response.json::<ObjectPage>().map_err(|error| {
            RelayError::fetch(bucket, LISTING_KEY, format!("invalid listing page: {error}"))
        })
    }
}

impl SourceStore for GcsSourceStore {
    fn get_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, RelayError> {
        let url = object_url(&self.base_url, bucket, Some(key))?;
        let response = self
            .authorized(self.http.get(url))
            .send()
            .map_err(|error| RelayError::fetch(bucket, key, error.to_string()))?;
        let response = check_read_status(response, bucket, key)?;
        let resource = response.json::<ObjectResource>().map_err(|error| {
            RelayError::fetch(bucket, key, format!("invalid object resource: {error}"))
        })?;
        resource.into_metadata(bucket)
    }

    fn open_read_stream(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Box<dyn ByteSource + '_>, RelayError> {
        self.open_media(bucket, key, false)
    }

    fn open_read_stream_raw(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Box<dyn ByteSource + '_>, RelayError> {
        self.open_media(bucket, key, true)
    }

    fn list_objects<'a>(&'a self, bucket: &'a str) -> ObjectListing<'a> {
        Box::new(ObjectPages {
            store: self,
            bucket,
            page: VecDeque::new(),
            next_page_token: None,
            exhausted: false,
        })
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), RelayError> {
        let url = object_url(&self.base_url, bucket, Some(key))?;
        let response = self
            .authorized(self.http.delete(url))
            .send()
            .map_err(|error| RelayError::delete(bucket, key, error.to_string()))?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RelayError::not_found(bucket, key)),
            status => Err(RelayError::delete(bucket, key, format!("HTTP {status}"))),
        }
    }
}

struct ObjectPages<'a> {
    store: &'a GcsSourceStore,
    bucket: &'a str,
    page: VecDeque<ObjectResource>,
    next_page_token: Option<String>,
    exhausted: bool,
}

impl Iterator for ObjectPages<'_> {
    type Item = Result<ListedObject, RelayError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(resource) = self.page.pop_front() {
                return Some(Ok(resource.into_listed(self.bucket)));
            }
            if self.exhausted {
                return None;
            }

            match self
                .store
                .fetch_page(self.bucket, self.next_page_token.as_deref())
            {
                Ok(page) => {
                    self.next_page_token = page.next_page_token;
                    self.exhausted = self.next_page_token.is_none();
                    self.page = page.items.into();
                }
                Err(error) => {
                    self.exhausted = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

fn check_read_status(response: Response, bucket: &str, key: &str) -> Result<Response, RelayError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(RelayError::not_found(bucket, key)),
        status => Err(RelayError::fetch(bucket, key, format!("HTTP {status}"))),
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, RelayError> {
    let trimmed = endpoint.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&candidate)
        .map_err(|error| RelayError::config(format!("invalid storage endpoint '{endpoint}': {error}")))?;
    if url.cannot_be_a_base() {
        return Err(RelayError::config(format!(
            "storage endpoint '{endpoint}' cannot be used as a base URL"
        )));
    }
    Ok(url)
}

/// JSON API resource URL for a bucket's objects, or for one object when `key`
/// is given. The key is encoded as a single path segment.
pub fn object_url(base: &Url, bucket: &str, key: Option<&str>) -> Result<Url, RelayError> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            RelayError::config(format!("storage endpoint '{base}' cannot be used as a base URL"))
        })?;
        segments
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o"]);
        if let Some(key) = key {
            segments.push(key);
        }
    }
    Ok(url)
}
