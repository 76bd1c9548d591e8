//! Shared relay domain primitives.
//!
//! This crate owns the transfer data model, the error taxonomy, content and
//! encoding rules, the streaming gzip adapters and the staleness rules used by
//! the sweep. It intentionally excludes cloud SDK and HTTP runtime concerns;
//! those live in `gcs_s3_relay_functions`.

pub mod content;
pub mod contract;
pub mod error;
pub mod stream;
pub mod sweep;
