use std::hash::Hasher;

use seahash::SeaHasher;

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("empty routing key")]
    EmptyKey,
}

/// Maps a record's routing key to the shard worker that must process it.
///
/// Same key → same shard for the lifetime of the router, so every record
/// for a key reaches the one worker owning that key's state, in order.
/// Which keys share a shard is unspecified.
#[derive(Debug, Clone, Copy)]
pub struct ShardRouter {
    shards: usize,
}

impl ShardRouter {
    pub fn new(shards: usize) -> Self {
        Self {
            shards: shards.max(1),
        }
    }

    pub fn shards(&self) -> usize {
        self.shards
    }

    /// Select the shard for `key`. Deterministic, no side effects.
    ///
    /// An absent key is a per-record error: the caller drops the record
    /// and the pipeline continues.
    pub fn route(&self, key: &str) -> Result<usize, RoutingError> {
        if key.is_empty() {
            return Err(RoutingError::EmptyKey);
        }
        let mut hasher = SeaHasher::new();
        hasher.write(key.as_bytes());
        Ok((hasher.finish() % self.shards as u64) as usize)
    }
}
