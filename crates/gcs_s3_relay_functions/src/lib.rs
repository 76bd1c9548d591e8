//! Cloud adapters and handlers for the staging-to-archive relay.
//!
//! This crate owns runtime integration details (GCS reads, S3 writes, STS web
//! identity exchange, HTTP function entry points) and the transfer engine that
//! drives them through the seams in `adapters`. Domain rules come from
//! `gcs_s3_relay_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod http;
pub mod logging;
