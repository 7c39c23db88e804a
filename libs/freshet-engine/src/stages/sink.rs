use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use freshet_api::{Record, SinkAdapter, Stage, StageError, StageOutput};

/// Terminal stage: persists each aggregate through the sink adapter.
///
/// With `read_back` enabled the stage reads the key after writing and
/// emits one echo record carrying the value actually stored. The read-back
/// is observability only — no processing decision depends on it, and
/// adapters are not assumed to be read-after-write consistent.
///
/// Adapter bootstrap is the embedder's job, once, before the pipeline
/// starts; this stage only does per-record work.
pub struct SinkStage {
    adapter: Arc<dyn SinkAdapter>,
    read_back: bool,
}

impl SinkStage {
    pub fn new(adapter: Arc<dyn SinkAdapter>) -> Self {
        Self {
            adapter,
            read_back: false,
        }
    }

    pub fn with_read_back(mut self, read_back: bool) -> Self {
        self.read_back = read_back;
        self
    }
}

impl Stage for SinkStage {
    type In = i64;
    type Out = i64;

    fn process(
        &mut self,
        record: Record<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<StageOutput<i64>, StageError>> + Send + '_>> {
        Box::pin(async move {
            self.adapter.write(&record.key, record.value).await?;
            if !self.read_back {
                return Ok(StageOutput::Continue(Vec::new()));
            }
            match self.adapter.read(&record.key).await? {
                Some(value) => {
                    tracing::debug!(key = %record.key, value, "read back");
                    Ok(StageOutput::Continue(vec![Record::new(record.key, value)]))
                }
                None => {
                    tracing::warn!(key = %record.key, "read back found nothing");
                    Ok(StageOutput::Continue(Vec::new()))
                }
            }
        })
    }
}
