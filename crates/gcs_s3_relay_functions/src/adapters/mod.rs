pub mod credentials;
pub mod gcs;
pub mod metadata_server;
pub mod object_store;
pub mod s3;
pub mod sts;

use std::future::Future;

/// Drives an SDK future to completion from the synchronous transfer path.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
