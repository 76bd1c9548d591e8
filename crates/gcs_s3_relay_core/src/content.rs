use std::collections::BTreeMap;

use crate::contract::{
    ObjectMetadata, TransferRequest, UploadOptions, DEFAULT_CONTENT_TYPE, GZIP_ENCODING,
    JSON_LINES_CONTENT_TYPE, METADATA_ORIGINAL_ENCODING, METADATA_SOURCE_BUCKET,
    METADATA_SOURCE_SIZE, METADATA_TRANSFERRED_BY, NO_ENCODING_LABEL,
};

const JSON_LINES_EXTENSIONS: [&str; 2] = [".jsonl", ".ndjson"];

pub fn resolve_content_type(key: &str, recorded: Option<&str>) -> String {
    if JSON_LINES_EXTENSIONS
        .iter()
        .any(|extension| key.ends_with(extension))
    {
        return JSON_LINES_CONTENT_TYPE.to_string();
    }

    match recorded {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => DEFAULT_CONTENT_TYPE.to_string(),
    }
}

pub fn is_gzip_encoded(content_encoding: Option<&str>) -> bool {
    content_encoding == Some(GZIP_ENCODING)
}

pub fn original_encoding_label(content_encoding: Option<&str>) -> &str {
    match content_encoding {
        Some(value) if !value.is_empty() => value,
        _ => NO_ENCODING_LABEL,
    }
}

/// Destination attributes for a transfer. The destination object is always
/// gzip-encoded, whichever branch produced its bytes.
pub fn upload_options(request: &TransferRequest, metadata: &ObjectMetadata) -> UploadOptions {
    let recorded_encoding = metadata.content_encoding.as_deref();
    let provenance = BTreeMap::from([
        (
            METADATA_SOURCE_BUCKET.to_string(),
            request.source.bucket.clone(),
        ),
        (METADATA_SOURCE_SIZE.to_string(), metadata.size.to_string()),
        (
            METADATA_ORIGINAL_ENCODING.to_string(),
            original_encoding_label(recorded_encoding).to_string(),
        ),
        (
            METADATA_TRANSFERRED_BY.to_string(),
            request.initiator.as_str().to_string(),
        ),
    ]);

    UploadOptions {
        content_encoding: GZIP_ENCODING.to_string(),
        content_type: resolve_content_type(&request.source.key, metadata.content_type.as_deref()),
        metadata: provenance,
    }
}
