use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use gcs_s3_relay_core::error::RelayError;
use gcs_s3_relay_functions::adapters::gcs::GcsSourceStore;
use gcs_s3_relay_functions::adapters::metadata_server::MetadataServer;
use gcs_s3_relay_functions::adapters::s3::S3Connector;
use gcs_s3_relay_functions::adapters::sts::StsCredentialProvider;
use gcs_s3_relay_functions::config::RelayConfig;
use gcs_s3_relay_functions::handlers::event::{
    handle_object_created, parse_object_event, EventDisposition, StorageObjectEvent,
};
use gcs_s3_relay_functions::http::{invocation_span, run_blocking, serve};
use gcs_s3_relay_functions::logging::init_logging;
use serde_json::{json, Value};
use tracing::{error, warn};

const FUNCTION_NAME: &str = "transfer_function";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;
    let config = RelayConfig::from_env().map_err(|error| {
        error!(error_code = error.code(), error = %error, "invalid configuration");
        error
    })?;

    let router = Router::new()
        .route("/", post(handle_request))
        .with_state(Arc::new(config));
    serve(router).await
}

/// Always answers 200 so the platform never re-delivers; failed objects are
/// picked up by the next cleanup sweep.
async fn handle_request(
    State(config): State<Arc<RelayConfig>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let span = invocation_span(FUNCTION_NAME, &headers);
    let payload = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);

    let disposition = run_blocking(span, move || match parse_object_event(payload) {
        Ok(event) => process_event(&event, &config),
        Err(reason) => {
            warn!(reason = %reason, "rejected event payload");
            EventDisposition::Rejected { reason }
        }
    })
    .await;

    match disposition {
        Ok(disposition) => (StatusCode::OK, Json(disposition.to_body())),
        Err(failure) => {
            error!(error = %failure, "event handler panicked");
            (
                StatusCode::OK,
                Json(json!({"status": "failed", "error": failure.to_string()})),
            )
        }
    }
}

fn process_event(event: &StorageObjectEvent, config: &RelayConfig) -> EventDisposition {
    let setup = || -> Result<(GcsSourceStore, StsCredentialProvider), RelayError> {
        let metadata = MetadataServer::from_env()?;
        let source = GcsSourceStore::connect(&metadata)?;
        let provider = StsCredentialProvider::new(metadata, config.role_session_name.clone());
        Ok((source, provider))
    };

    match setup() {
        Ok((source, provider)) => handle_object_created(
            event,
            config,
            Utc::now(),
            &source,
            &provider,
            &S3Connector::default(),
        ),
        Err(cause) => {
            error!(object = %event.name, error_code = cause.code(), error = %cause, "client setup failed");
            EventDisposition::Failed {
                key: event.name.clone(),
                cause,
            }
        }
    }
}
