use std::future::Future;
use std::pin::Pin;

use freshet_api::{Record, Stage, StageError, StageOutput, now_ms};

/// Deterministic record generator for driving a pipeline end to end.
///
/// Each tick emits exactly one record: `value` counts 1..=total, `key`
/// cycles `count mod num_keys`. After `total` records it signals
/// completion. Everything but the timestamp is a pure function of `count`.
pub struct FakeSource {
    count: u64,
    total: u64,
    num_keys: u64,
}

impl FakeSource {
    pub fn new(total: u64, num_keys: u64) -> Self {
        Self {
            count: 0,
            total,
            num_keys: num_keys.max(1),
        }
    }
}

impl Stage for FakeSource {
    type In = ();
    type Out = i64;

    fn process(
        &mut self,
        _tick: Record<()>,
    ) -> Pin<Box<dyn Future<Output = Result<StageOutput<i64>, StageError>> + Send + '_>> {
        let output = if self.count >= self.total {
            StageOutput::Complete
        } else {
            self.count += 1;
            let key = (self.count % self.num_keys).to_string();
            StageOutput::Continue(vec![Record {
                key,
                value: self.count as i64,
                ts_ms: now_ms(),
            }])
        };
        Box::pin(async move { Ok(output) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next(source: &mut FakeSource) -> StageOutput<i64> {
        source.process(Record::tick()).await.unwrap()
    }

    #[tokio::test]
    async fn emits_total_records_then_completes() {
        let mut source = FakeSource::new(5, 2);
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for _ in 0..5 {
            match next(&mut source).await {
                StageOutput::Continue(records) => {
                    assert_eq!(records.len(), 1);
                    keys.push(records[0].key.clone());
                    values.push(records[0].value);
                }
                StageOutput::Complete => panic!("completed early"),
            }
        }
        assert_eq!(keys, ["1", "0", "1", "0", "1"]);
        assert_eq!(values, [1, 2, 3, 4, 5]);

        // Exhausted: completes on this tick and every later one.
        assert!(matches!(next(&mut source).await, StageOutput::Complete));
        assert!(matches!(next(&mut source).await, StageOutput::Complete));
    }

    #[tokio::test]
    async fn zero_total_completes_immediately() {
        let mut source = FakeSource::new(0, 4);
        assert!(matches!(next(&mut source).await, StageOutput::Complete));
    }
}
