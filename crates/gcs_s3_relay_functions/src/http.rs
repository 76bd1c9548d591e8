//! Shared HTTP plumbing for the function binaries.

use std::net::{Ipv4Addr, SocketAddr};

use axum::http::HeaderMap;
use axum::Router;
use gcs_s3_relay_core::error::RelayError;
use tokio::net::TcpListener;
use tracing::{field, info, info_span, Span};

pub const DEFAULT_PORT: u16 = 8080;
pub const TRACE_CONTEXT_HEADER: &str = "x-cloud-trace-context";

pub fn listen_addr(port: Option<&str>) -> Result<SocketAddr, RelayError> {
    let port = match port.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw
            .parse::<u16>()
            .map_err(|error| RelayError::config(format!("PORT must be a port number: {error}")))?,
        _ => DEFAULT_PORT,
    };
    Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
}

pub async fn serve(router: Router) -> Result<(), Box<dyn std::error::Error>> {
    let addr = listen_addr(std::env::var("PORT").ok().as_deref())?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}

pub fn project_id() -> Option<String> {
    ["GOOGLE_CLOUD_PROJECT", "GCP_PROJECT"]
        .into_iter()
        .find_map(|name| std::env::var(name).ok().filter(|value| !value.is_empty()))
}

/// Builds the log-correlation resource from a `TRACE_ID/SPAN_ID;o=1` header.
pub fn trace_resource(header: Option<&str>, project: Option<&str>) -> Option<String> {
    let trace_id = header?.split('/').next()?.trim();
    if trace_id.is_empty() || !trace_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("projects/{}/traces/{trace_id}", project?))
}

pub fn invocation_span(function: &'static str, headers: &HeaderMap) -> Span {
    let span = info_span!("invocation", function, trace = field::Empty);
    let header = headers
        .get(TRACE_CONTEXT_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Some(trace) = trace_resource(header, project_id().as_deref()) {
        span.record("trace", trace.as_str());
    }
    span
}

/// Handlers do blocking I/O, so they run on the blocking pool inside the
/// invocation span.
pub async fn run_blocking<T, F>(span: Span, work: F) -> Result<T, tokio::task::JoinError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || span.in_scope(work)).await
}
