use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use freshet_api::{Record, SinkAdapter, Stage, StageError, StageOutput};
use freshet_engine::stages::{FakeSource, SinkStage, Sum};
use freshet_engine::{Pipeline, PipelineError, PipelineState, SourceOptions, StageOptions};
use freshet_sink_memory::MemorySink;

/// Ground truth for what FakeSource → Sum must leave in the store.
fn expected_totals(total: u64, num_keys: u64) -> HashMap<String, i64> {
    let mut totals = HashMap::new();
    for count in 1..=total {
        *totals.entry((count % num_keys).to_string()).or_insert(0) += count as i64;
    }
    totals
}

async fn run_summing_pipeline(
    total: u64,
    num_keys: u64,
    agg_replicas: usize,
    buffer: usize,
) -> Arc<MemorySink> {
    let adapter = Arc::new(MemorySink::new());
    adapter.bootstrap().await.unwrap();

    let sink_adapter = adapter.clone();
    let pipeline = Pipeline::source(
        "source",
        SourceOptions::default(),
        move || FakeSource::new(total, num_keys),
    )
    .transform(
        "sum",
        StageOptions {
            replicas: agg_replicas,
            buffer,
        },
        Sum::new,
    )
    .sink(
        "store",
        StageOptions { replicas: 1, buffer },
        move || SinkStage::new(sink_adapter.clone()),
    );

    let handle = pipeline.handle();
    pipeline.run().await.unwrap();
    assert_eq!(handle.state(), PipelineState::Terminated);
    adapter
}

#[tokio::test]
async fn aggregates_every_record() {
    let adapter = run_summing_pipeline(100, 5, 2, 16).await;
    assert_eq!(adapter.entries().await, expected_totals(100, 5));
    // One-in-one-out through the whole chain: no record lost or duplicated.
    assert_eq!(adapter.write_log().await.len(), 100);
}

#[tokio::test]
async fn concrete_five_record_scenario() {
    // total=5, num_keys=2: keys 1,0,1,0,1 with values 1..=5.
    let adapter = run_summing_pipeline(5, 2, 1, 8).await;

    let entries = adapter.entries().await;
    assert_eq!(entries.get("0"), Some(&6));
    assert_eq!(entries.get("1"), Some(&9));

    let mut per_key: HashMap<String, Vec<i64>> = HashMap::new();
    for (key, value) in adapter.write_log().await {
        per_key.entry(key).or_default().push(value);
    }
    assert_eq!(per_key["1"], [1, 4, 9]);
    assert_eq!(per_key["0"], [2, 6]);
}

#[tokio::test]
async fn per_key_writes_arrive_in_order() {
    let adapter = run_summing_pipeline(200, 7, 3, 16).await;

    // Running totals of positive values are strictly increasing, so any
    // reordering or duplication within a key would show up here.
    let mut per_key: HashMap<String, Vec<i64>> = HashMap::new();
    for (key, value) in adapter.write_log().await {
        per_key.entry(key).or_default().push(value);
    }
    assert_eq!(per_key.len(), 7);
    for (key, values) in per_key {
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1], "key {key} written out of order");
        }
    }
}

#[tokio::test]
async fn tiny_buffers_apply_backpressure_without_loss() {
    let adapter = run_summing_pipeline(300, 3, 1, 1).await;
    assert_eq!(adapter.entries().await, expected_totals(300, 3));
    assert_eq!(adapter.write_log().await.len(), 300);
}

#[tokio::test]
async fn external_stop_drains_in_flight_records() {
    let adapter = Arc::new(MemorySink::new());

    let sink_adapter = adapter.clone();
    let pipeline = Pipeline::source(
        "source",
        SourceOptions {
            replicas: 1,
            inter_record_delay: Duration::from_millis(1),
        },
        // Effectively endless: only the stop request ends this run.
        || FakeSource::new(u64::MAX, 4),
    )
    .transform("sum", StageOptions::default(), Sum::new)
    .sink("store", StageOptions::default(), move || {
        SinkStage::new(sink_adapter.clone())
    });

    let handle = pipeline.handle();
    let stopper = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.stop();
    });

    let report = pipeline.run().await.unwrap();
    assert_eq!(handle.state(), PipelineState::Terminated);

    // Everything the source handed over was drained through both stages.
    let by_name: HashMap<_, _> = report
        .stages
        .iter()
        .map(|s| (s.stage.as_str(), s))
        .collect();
    assert_eq!(by_name["sum"].processed, by_name["source"].emitted);
    assert_eq!(by_name["store"].processed, by_name["sum"].emitted);
}

struct FailAfter {
    seen: u64,
    limit: u64,
}

impl Stage for FailAfter {
    type In = i64;
    type Out = i64;

    fn process(
        &mut self,
        record: Record<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<StageOutput<i64>, StageError>> + Send + '_>> {
        self.seen += 1;
        let result = if self.seen > self.limit {
            Err(StageError::new("synthetic failure"))
        } else {
            Ok(StageOutput::Continue(vec![record]))
        };
        Box::pin(async move { result })
    }
}

#[tokio::test]
async fn stage_failure_aborts_the_pipeline() {
    let adapter = Arc::new(MemorySink::new());

    let sink_adapter = adapter.clone();
    let pipeline = Pipeline::source("source", SourceOptions::default(), || {
        FakeSource::new(100, 2)
    })
    .transform("flaky", StageOptions::default(), || FailAfter {
        seen: 0,
        limit: 3,
    })
    .sink("store", StageOptions::default(), move || {
        SinkStage::new(sink_adapter.clone())
    });

    let handle = pipeline.handle();
    match pipeline.run().await {
        Err(PipelineError::Stage { stage, shard, .. }) => {
            assert_eq!(stage, "flaky");
            assert_eq!(shard, 0);
        }
        other => panic!("expected stage failure, got {other:?}"),
    }
    assert_eq!(handle.state(), PipelineState::Aborted);
}

struct CompleteAfter {
    seen: u64,
    limit: u64,
}

impl Stage for CompleteAfter {
    type In = i64;
    type Out = i64;

    fn process(
        &mut self,
        record: Record<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<StageOutput<i64>, StageError>> + Send + '_>> {
        self.seen += 1;
        let output = if self.seen >= self.limit {
            StageOutput::Complete
        } else {
            StageOutput::Continue(vec![record])
        };
        Box::pin(async move { Ok(output) })
    }
}

#[tokio::test]
async fn completion_from_a_transform_stops_the_pipeline() {
    let adapter = Arc::new(MemorySink::new());

    let sink_adapter = adapter.clone();
    let pipeline = Pipeline::source(
        "source",
        SourceOptions {
            replicas: 1,
            inter_record_delay: Duration::from_millis(1),
        },
        || FakeSource::new(u64::MAX, 2),
    )
    .transform("gate", StageOptions::default(), || CompleteAfter {
        seen: 0,
        limit: 10,
    })
    .sink("store", StageOptions::default(), move || {
        SinkStage::new(sink_adapter.clone())
    });

    let handle = pipeline.handle();
    pipeline.run().await.unwrap();
    assert_eq!(handle.state(), PipelineState::Terminated);
}

#[tokio::test]
async fn multiple_source_replicas_all_drain() {
    let adapter = Arc::new(MemorySink::new());

    // Two replicas each emit 1..=50 over the same key space; per-key totals
    // are exactly double the single-replica expectation.
    let sink_adapter = adapter.clone();
    let pipeline = Pipeline::source(
        "source",
        SourceOptions {
            replicas: 2,
            inter_record_delay: Duration::ZERO,
        },
        || FakeSource::new(50, 5),
    )
    .transform(
        "sum",
        StageOptions {
            replicas: 2,
            buffer: 16,
        },
        Sum::new,
    )
    .sink("store", StageOptions::default(), move || {
        SinkStage::new(sink_adapter.clone())
    });

    let handle = pipeline.handle();
    pipeline.run().await.unwrap();
    assert_eq!(handle.state(), PipelineState::Terminated);

    let expected: HashMap<String, i64> = expected_totals(50, 5)
        .into_iter()
        .map(|(k, v)| (k, v * 2))
        .collect();
    assert_eq!(adapter.entries().await, expected);
    assert_eq!(adapter.write_log().await.len(), 100);
}
