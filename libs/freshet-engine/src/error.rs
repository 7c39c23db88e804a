use freshet_api::StageError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("stage '{stage}' shard {shard} failed: {source}")]
    Stage {
        stage: String,
        shard: usize,
        source: StageError,
    },

    #[error("worker panicked: {0}")]
    WorkerPanic(String),
}
