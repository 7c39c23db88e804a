use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use freshet_api::{SinkAdapter, SinkError};
use freshet_engine::config::{PipelineConfig, SinkConfig};
use freshet_engine::stages::{FakeSource, SinkStage, Sum};
use freshet_engine::{Pipeline, SourceOptions, StageOptions};
use freshet_sink_clickhouse::ClickHouseSink;
use freshet_sink_memory::MemorySink;
use freshet_sink_sqlite::SqliteSink;

#[derive(Parser)]
#[command(name = "freshet-run", about = "Run a keyed aggregation pipeline")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, default_value = "config.toml", env = "FRESHET_CONFIG")]
    config: String,
}

fn build_adapter(cfg: &SinkConfig) -> Result<Arc<dyn SinkAdapter>, SinkError> {
    match cfg.adapter.as_str() {
        "memory" => Ok(Arc::new(MemorySink::new())),
        "sqlite" => {
            let path = cfg
                .path
                .as_deref()
                .ok_or_else(|| SinkError::config("sink.path is required for the sqlite adapter"))?;
            Ok(Arc::new(
                SqliteSink::open(path)?.with_table(cfg.table.clone()),
            ))
        }
        "clickhouse" => {
            let host = cfg.host.as_deref().ok_or_else(|| {
                SinkError::config("sink.host is required for the clickhouse adapter")
            })?;
            Ok(Arc::new(ClickHouseSink::new(
                host,
                cfg.port,
                &cfg.user,
                &cfg.password,
                &cfg.database,
                &cfg.table,
                Duration::from_millis(cfg.timeout_ms),
            )?))
        }
        other => Err(SinkError::config(format!("unknown sink adapter: '{other}'"))),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!(config = %cli.config, "loading configuration");
    let config = match PipelineConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid config");
        std::process::exit(1);
    }

    let adapter = match build_adapter(&config.sink) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "failed to create sink adapter");
            std::process::exit(1);
        }
    };
    tracing::info!(adapter = %config.sink.adapter, "bootstrapping sink");
    if let Err(e) = adapter.bootstrap().await {
        tracing::error!(error = %e, "sink bootstrap failed");
        std::process::exit(1);
    }

    let total = config.source.total_records;
    let num_keys = config.source.num_keys;
    tracing::info!(
        total_records = total,
        num_keys,
        aggregate_replicas = config.aggregate.replicas,
        "starting pipeline"
    );

    let sink_adapter = adapter.clone();
    let read_back = config.sink.read_back;
    let pipeline = Pipeline::source(
        "source",
        SourceOptions {
            replicas: config.source.replicas,
            inter_record_delay: Duration::from_millis(config.source.inter_record_delay_ms),
        },
        move || FakeSource::new(total, num_keys),
    )
    .transform(
        "sum",
        StageOptions {
            replicas: config.aggregate.replicas,
            buffer: config.aggregate.buffer,
        },
        Sum::new,
    )
    .sink(
        "store",
        StageOptions {
            replicas: config.sink.replicas,
            buffer: config.sink.buffer,
        },
        move || SinkStage::new(sink_adapter.clone()).with_read_back(read_back),
    );

    // Ctrl+C requests a graceful stop: sources stop, in-flight records drain.
    let handle = pipeline.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stop requested, draining...");
            handle.stop();
        }
    });

    match pipeline.run().await {
        Ok(report) => {
            for stage in &report.stages {
                tracing::info!(
                    stage = %stage.stage,
                    replicas = stage.replicas,
                    processed = stage.processed,
                    emitted = stage.emitted,
                    "stage totals"
                );
            }
            // Final per-key aggregates, read back through the adapter.
            for k in 0..num_keys {
                let key = k.to_string();
                match adapter.read(&key).await {
                    Ok(Some(value)) => tracing::info!(key = %key, value, "final aggregate"),
                    Ok(None) => tracing::info!(key = %key, "final aggregate: no records"),
                    Err(e) => tracing::warn!(key = %key, error = %e, "read back failed"),
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "pipeline failed");
            std::process::exit(1);
        }
    }
}
