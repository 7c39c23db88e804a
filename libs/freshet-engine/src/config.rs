use serde::Deserialize;

use crate::error::PipelineError;

/// Root configuration — parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub aggregate: AggregateConfig,
    pub sink: SinkConfig,
}

/// Source stage: how many records to generate and how fast.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Records emitted per source replica before completion is raised.
    pub total_records: u64,
    /// Cardinality of the routing-key space (keys "0".."num_keys-1").
    #[serde(default = "default_num_keys")]
    pub num_keys: u64,
    /// Pacing between records, milliseconds. 0 = as fast as the next
    /// stage's backpressure allows.
    #[serde(default)]
    pub inter_record_delay_ms: u64,
    #[serde(default = "default_replicas")]
    pub replicas: usize,
}

/// Aggregation stage: degree of shard parallelism and queue depth.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregateConfig {
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    /// Inbound queue capacity per shard worker.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            buffer: default_buffer(),
        }
    }
}

/// Sink stage plus the adapter it writes through.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// Adapter backend: "memory", "sqlite" or "clickhouse".
    #[serde(default = "default_adapter")]
    pub adapter: String,
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// Read each key back after writing and log the stored value.
    #[serde(default)]
    pub read_back: bool,

    // --- sqlite ---
    /// Database file path (":memory:" for a private in-memory database).
    pub path: Option<String>,

    // --- clickhouse ---
    pub host: Option<String>,
    #[serde(default = "default_ch_port")]
    pub port: u16,
    #[serde(default = "default_ch_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_ch_database")]
    pub database: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// Per-request timeout for the store's HTTP interface.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_replicas() -> usize {
    1
}
fn default_buffer() -> usize {
    4096
}
fn default_num_keys() -> u64 {
    10
}
fn default_adapter() -> String {
    "memory".into()
}
fn default_ch_port() -> u16 {
    8123
}
fn default_ch_user() -> String {
    "default".into()
}
fn default_ch_database() -> String {
    "default".into()
}
fn default_table() -> String {
    "aggregates".into()
}
fn default_timeout_ms() -> u64 {
    5000
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, PipelineError> {
        toml::from_str(toml_str).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Cross-field checks the deserializer can't express.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.source.num_keys == 0 {
            return Err(PipelineError::Config(
                "source.num_keys must be at least 1".into(),
            ));
        }
        for (section, replicas) in [
            ("source", self.source.replicas),
            ("aggregate", self.aggregate.replicas),
            ("sink", self.sink.replicas),
        ] {
            if replicas == 0 {
                return Err(PipelineError::Config(format!(
                    "{section}.replicas must be at least 1"
                )));
            }
        }
        for (section, buffer) in [
            ("aggregate", self.aggregate.buffer),
            ("sink", self.sink.buffer),
        ] {
            if buffer == 0 {
                return Err(PipelineError::Config(format!(
                    "{section}.buffer must be at least 1"
                )));
            }
        }
        match self.sink.adapter.as_str() {
            "memory" => {}
            "sqlite" => {
                if self.sink.path.is_none() {
                    return Err(PipelineError::Config(
                        "sink.path is required for the sqlite adapter".into(),
                    ));
                }
            }
            "clickhouse" => {
                if self.sink.host.is_none() {
                    return Err(PipelineError::Config(
                        "sink.host is required for the clickhouse adapter".into(),
                    ));
                }
            }
            other => {
                return Err(PipelineError::Config(format!(
                    "unknown sink adapter: '{other}'"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let config = PipelineConfig::parse(
            r#"
            [source]
            total_records = 100

            [sink]
            adapter = "memory"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.source.total_records, 100);
        assert_eq!(config.source.num_keys, 10);
        assert_eq!(config.aggregate.replicas, 1);
        assert_eq!(config.sink.adapter, "memory");
        assert!(!config.sink.read_back);
    }

    #[test]
    fn parses_full_config() {
        let config = PipelineConfig::parse(
            r#"
            [source]
            total_records = 10000
            num_keys = 4
            inter_record_delay_ms = 5
            replicas = 2

            [aggregate]
            replicas = 4
            buffer = 256

            [sink]
            adapter = "sqlite"
            path = "counts.db"
            read_back = true
            buffer = 64
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.source.num_keys, 4);
        assert_eq!(config.aggregate.replicas, 4);
        assert_eq!(config.sink.path.as_deref(), Some("counts.db"));
        assert!(config.sink.read_back);
    }

    #[test]
    fn sqlite_requires_path() {
        let config = PipelineConfig::parse(
            r#"
            [source]
            total_records = 1

            [sink]
            adapter = "sqlite"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn clickhouse_requires_host() {
        let config = PipelineConfig::parse(
            r#"
            [source]
            total_records = 1

            [sink]
            adapter = "clickhouse"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_unknown_adapter() {
        let config = PipelineConfig::parse(
            r#"
            [source]
            total_records = 1

            [sink]
            adapter = "carrier-pigeon"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_zero_replicas() {
        let config = PipelineConfig::parse(
            r#"
            [source]
            total_records = 1
            replicas = 0

            [sink]
            adapter = "memory"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }
}
