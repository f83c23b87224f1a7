#![allow(dead_code)]

use std::sync::Arc;

use dagbuild::engine::{BuildOptions, Executor};
use dagbuild::exec::Runner;
use dagbuild::fingerprint::FingerprintStore;
use dagbuild::types::StoreErrorPolicy;

pub use dagbuild_test_utils::init_tracing;

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Executor with explicit concurrency and default policies.
pub fn executor<R, S>(runner: R, store: Arc<S>, concurrency: usize) -> Executor
where
    R: Runner + 'static,
    S: FingerprintStore + 'static,
{
    Executor::new(Arc::new(runner), store).with_options(BuildOptions {
        concurrency,
        force: false,
        on_store_error: StoreErrorPolicy::Fail,
    })
}
