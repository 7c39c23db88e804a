use std::future::Future;
use std::pin::Pin;

use crate::error::SinkError;

/// External-store adapter — the narrow contract a terminal stage persists
/// aggregates through.
///
/// The engine doesn't enumerate or know concrete stores. For the engine,
/// a store is just this trait.
///
/// Timeouts on store calls are the adapter's responsibility: an expired
/// call is reported as a `SinkError`, not silently retried.
pub trait SinkAdapter: Send + Sync {
    /// One-time, idempotent preparation of the destination (namespace,
    /// table). Safe to call at startup even if already prepared; whether it
    /// clears or no-ops is documented per adapter. Called by the embedder
    /// once, before the pipeline starts — not per sink replica.
    fn bootstrap(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;

    /// Idempotent upsert: writing the same `(key, value)` twice leaves the
    /// store as after one write.
    fn write(
        &self,
        key: &str,
        value: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;

    /// Point lookup by key.
    fn read(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<i64>, SinkError>> + Send + '_>>;
}
