use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

use freshet_api::{SinkAdapter, SinkError};

/// In-memory sink adapter. For tests and local runs — no durability.
///
/// Bootstrap clears the store (documented destructive, like the reference
/// file-backed adapter). Every successful write is also appended to a
/// write log so tests can assert on per-key write ordering; the log is
/// observability, not part of the store's observable key/value state.
pub struct MemorySink {
    entries: RwLock<HashMap<String, i64>>,
    log: RwLock<Vec<(String, i64)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            log: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of the current key → value map.
    pub async fn entries(&self) -> HashMap<String, i64> {
        self.entries.read().await.clone()
    }

    /// All successful writes, in arrival order.
    pub async fn write_log(&self) -> Vec<(String, i64)> {
        self.log.read().await.clone()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkAdapter for MemorySink {
    fn bootstrap(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            self.entries.write().await.clear();
            self.log.write().await.clear();
            Ok(())
        })
    }

    fn write(
        &self,
        key: &str,
        value: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            self.entries.write().await.insert(key.clone(), value);
            self.log.write().await.push((key, value));
            Ok(())
        })
    }

    fn read(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<i64>, SinkError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.entries.read().await.get(&key).copied()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read() {
        let sink = MemorySink::new();
        sink.write("a", 5).await.unwrap();
        assert_eq!(sink.read("a").await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn absent_key_reads_none() {
        let sink = MemorySink::new();
        assert_eq!(sink.read("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn double_write_is_idempotent() {
        let sink = MemorySink::new();
        sink.write("k", 9).await.unwrap();
        sink.write("k", 9).await.unwrap();
        assert_eq!(sink.read("k").await.unwrap(), Some(9));
        assert_eq!(sink.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_clears_previous_state() {
        let sink = MemorySink::new();
        sink.write("k", 1).await.unwrap();
        sink.bootstrap().await.unwrap();
        assert_eq!(sink.read("k").await.unwrap(), None);
        assert!(sink.write_log().await.is_empty());
        // Idempotent: a second bootstrap is a no-op on an empty store.
        sink.bootstrap().await.unwrap();
    }
}
