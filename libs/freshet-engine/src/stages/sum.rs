use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use freshet_api::{Record, Stage, StageError, StageOutput};

/// Running per-key totals. One record in, one updated total out.
///
/// The shard router guarantees every record for a key reaches the same
/// worker, in arrival order and never two in flight, so the map needs no
/// synchronization. Entries appear on first sight of a key and live for
/// the stage's lifetime — the totals are cumulative.
pub struct Sum {
    totals: HashMap<String, i64>,
}

impl Sum {
    pub fn new() -> Self {
        Self {
            totals: HashMap::new(),
        }
    }
}

impl Default for Sum {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for Sum {
    type In = i64;
    type Out = i64;

    fn process(
        &mut self,
        record: Record<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<StageOutput<i64>, StageError>> + Send + '_>> {
        let total = self.totals.entry(record.key.clone()).or_insert(0);
        *total += record.value;
        tracing::debug!(key = %record.key, total = *total, "accumulated");
        let out = Record::new(record.key, *total);
        Box::pin(async move { Ok(StageOutput::Continue(vec![out])) })
    }
}
