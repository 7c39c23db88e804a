use serde::{Deserialize, Serialize};

use crate::util::now_ms;

/// The unit of data flowing through a pipeline.
///
/// `key` is the routing key: it decides which shard worker of the next
/// stateful stage processes the record. `value` is opaque to the engine —
/// only stages interpret it. Immutable once created; consumed exactly once
/// by the next stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub key: String,
    pub value: T,
    /// Production timestamp, Unix milliseconds.
    pub ts_ms: i64,
}

impl<T> Record<T> {
    pub fn new(key: impl Into<String>, value: T) -> Self {
        Self {
            key: key.into(),
            value,
            ts_ms: now_ms(),
        }
    }
}

impl Record<()> {
    /// The tick record the engine feeds to source stages in place of an
    /// upstream record. Carries no key: ticks are never routed.
    pub fn tick() -> Self {
        Self {
            key: String::new(),
            value: (),
            ts_ms: now_ms(),
        }
    }
}
