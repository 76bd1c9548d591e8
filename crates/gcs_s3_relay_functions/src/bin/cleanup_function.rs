use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use gcs_s3_relay_core::contract::SweepSummary;
use gcs_s3_relay_core::error::RelayError;
use gcs_s3_relay_functions::adapters::gcs::GcsSourceStore;
use gcs_s3_relay_functions::adapters::metadata_server::MetadataServer;
use gcs_s3_relay_functions::adapters::s3::S3Connector;
use gcs_s3_relay_functions::adapters::sts::StsCredentialProvider;
use gcs_s3_relay_functions::config::RelayConfig;
use gcs_s3_relay_functions::handlers::sweep::handle_sweep;
use gcs_s3_relay_functions::http::{invocation_span, run_blocking, serve};
use gcs_s3_relay_functions::logging::init_logging;
use serde_json::json;
use tracing::error;

const FUNCTION_NAME: &str = "cleanup_function";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;
    let config = RelayConfig::from_env().map_err(|error| {
        error!(error_code = error.code(), error = %error, "invalid configuration");
        error
    })?;

    let router = Router::new()
        .route("/", get(handle_request).post(handle_request))
        .with_state(Arc::new(config));
    serve(router).await
}

async fn handle_request(State(config): State<Arc<RelayConfig>>, headers: HeaderMap) -> Response {
    let span = invocation_span(FUNCTION_NAME, &headers);
    match run_blocking(span, move || run_sweep(&config)).await {
        Ok(Ok(summary)) => (StatusCode::OK, Json(summary)).into_response(),
        Ok(Err(cause)) => {
            error!(error_code = cause.code(), error = %cause, "cleanup sweep failed");
            error_response(&cause.to_string(), cause.code())
        }
        Err(failure) => {
            error!(error = %failure, "cleanup sweep panicked");
            error_response(&failure.to_string(), "internal_error")
        }
    }
}

fn run_sweep(config: &RelayConfig) -> Result<SweepSummary, RelayError> {
    let metadata = MetadataServer::from_env()?;
    let source = GcsSourceStore::connect(&metadata)?;
    let provider = StsCredentialProvider::new(metadata, config.role_session_name.clone());
    handle_sweep(
        config,
        Utc::now(),
        &source,
        &provider,
        &S3Connector::default(),
    )
}

fn error_response(message: &str, code: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "error_code": code,
        })),
    )
        .into_response()
}
