use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use freshet_api::Stage;

use crate::error::PipelineError;
use crate::worker::{Control, Outbound, WorkerReport, run_source, run_stage};

/// Lifecycle of a running pipeline.
///
/// Running → Draining → Terminated is the only happy path; a stage failure
/// forces Aborted instead, skipping the drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Ticks and records flow.
    Running,
    /// No new input; in-flight records finish traversing all stages.
    Draining,
    /// All sinks flushed, all workers gone.
    Terminated,
    /// A stage failed; workers were interrupted without draining.
    Aborted,
}

/// Settings for a source stage.
#[derive(Debug, Clone, Copy)]
pub struct SourceOptions {
    /// Independent source workers, each with its own stage instance.
    pub replicas: usize,
    /// Pacing between ticks. Suspends only the source's own worker.
    pub inter_record_delay: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            replicas: 1,
            inter_record_delay: Duration::ZERO,
        }
    }
}

/// Settings for a transform or sink stage.
#[derive(Debug, Clone, Copy)]
pub struct StageOptions {
    /// Shard workers. Each owns an exclusive slice of the key space.
    pub replicas: usize,
    /// Capacity of each shard's inbound queue; once full, upstream delivery
    /// to that shard blocks.
    pub buffer: usize,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            replicas: 1,
            buffer: 4096,
        }
    }
}

/// A stage's workers cannot start until the *next* stage's inbound channels
/// exist, so each builder step stores spawners for the stage it just
/// described and runs the ones for the stage before it.
type Spawner<T> = Box<dyn FnOnce(Option<Outbound<T>>) -> JoinHandle<WorkerReport> + Send>;

/// Chains stages into a pipeline. `T` is the payload type currently flowing
/// out of the last stage added.
///
/// Must be used inside a tokio runtime: adding a stage spawns the previous
/// stage's workers.
pub struct PipelineBuilder<T: Send + 'static> {
    ctl: Arc<Control>,
    state_rx: watch::Receiver<PipelineState>,
    failure_rx: mpsc::UnboundedReceiver<PipelineError>,
    handles: Vec<JoinHandle<WorkerReport>>,
    pending: Vec<Spawner<T>>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    /// Append a stage with `opts.replicas` shard workers, wiring the
    /// previous stage's output through the shard router into this stage's
    /// bounded per-shard queues.
    pub fn transform<S, F>(mut self, name: &str, opts: StageOptions, mut factory: F) -> PipelineBuilder<S::Out>
    where
        S: Stage<In = T> + 'static,
        F: FnMut() -> S,
    {
        let replicas = opts.replicas.max(1);
        let buffer = opts.buffer.max(1);

        let mut txs = Vec::with_capacity(replicas);
        let mut rxs = Vec::with_capacity(replicas);
        for _ in 0..replicas {
            let (tx, rx) = mpsc::channel(buffer);
            txs.push(tx);
            rxs.push(rx);
        }

        // The downstream side exists now — start the upstream workers.
        for spawner in self.pending {
            self.handles.push(spawner(Some(Outbound::new(txs.clone()))));
        }
        drop(txs);

        let mut pending: Vec<Spawner<S::Out>> = Vec::with_capacity(replicas);
        for (shard, rx) in rxs.into_iter().enumerate() {
            let stage = factory();
            let name = name.to_string();
            let ctl = self.ctl.clone();
            pending.push(Box::new(move |out| {
                tokio::spawn(run_stage(stage, name, shard, rx, out, ctl))
            }));
        }

        PipelineBuilder {
            ctl: self.ctl,
            state_rx: self.state_rx,
            failure_rx: self.failure_rx,
            handles: self.handles,
            pending,
        }
    }

    /// Append the terminal stage and finish the chain. Its workers get no
    /// outbound side; anything they emit is counted and discarded.
    pub fn sink<S, F>(self, name: &str, opts: StageOptions, factory: F) -> Pipeline
    where
        S: Stage<In = T> + 'static,
        F: FnMut() -> S,
    {
        let mut tail = self.transform(name, opts, factory);
        for spawner in tail.pending {
            tail.handles.push(spawner(None));
        }
        Pipeline {
            ctl: tail.ctl,
            state_rx: tail.state_rx,
            failure_rx: tail.failure_rx,
            handles: tail.handles,
        }
    }
}

/// Per-stage totals across all of the stage's workers, in chain order.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: String,
    pub replicas: usize,
    /// Records (or ticks, for sources) processed.
    pub processed: u64,
    /// Records handed to the next stage (or produced, for terminal stages).
    pub emitted: u64,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

/// External control of a running pipeline: request a graceful stop, watch
/// the lifecycle state.
#[derive(Clone)]
pub struct PipelineHandle {
    ctl: Arc<Control>,
    state_rx: watch::Receiver<PipelineState>,
}

impl PipelineHandle {
    /// Ask the pipeline to stop: sources stop ticking, in-flight records
    /// drain, then the pipeline terminates.
    pub fn stop(&self) {
        self.ctl.request_stop();
    }

    pub fn state(&self) -> PipelineState {
        *self.state_rx.borrow()
    }
}

/// An ordered chain of stages wired by keyed, bounded channels.
pub struct Pipeline {
    ctl: Arc<Control>,
    state_rx: watch::Receiver<PipelineState>,
    failure_rx: mpsc::UnboundedReceiver<PipelineError>,
    handles: Vec<JoinHandle<WorkerReport>>,
}

impl Pipeline {
    /// Start a chain with a tick-driven source stage. The factory is called
    /// once per replica; each worker owns its instance exclusively.
    pub fn source<S, F>(name: &str, opts: SourceOptions, mut factory: F) -> PipelineBuilder<S::Out>
    where
        S: Stage<In = ()> + 'static,
        F: FnMut() -> S,
    {
        let (state_tx, state_rx) = watch::channel(PipelineState::Running);
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let ctl = Arc::new(Control::new(state_tx, failure_tx));

        let replicas = opts.replicas.max(1);
        let mut pending: Vec<Spawner<S::Out>> = Vec::with_capacity(replicas);
        for shard in 0..replicas {
            ctl.source_started();
            let stage = factory();
            let name = name.to_string();
            let delay = opts.inter_record_delay;
            let ctl = ctl.clone();
            pending.push(Box::new(move |out| {
                let out = out.expect("a pipeline must end in a sink stage");
                tokio::spawn(run_source(stage, name, shard, delay, out, ctl))
            }));
        }

        PipelineBuilder {
            ctl,
            state_rx,
            failure_rx,
            handles: Vec::new(),
            pending,
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            ctl: self.ctl.clone(),
            state_rx: self.state_rx.clone(),
        }
    }

    /// Wait for the pipeline to finish.
    ///
    /// Completion (from a stage or an external stop) drains every shard and
    /// returns the per-stage totals; the first stage failure aborts the run
    /// and is returned naming the stage and shard.
    pub async fn run(mut self) -> Result<PipelineReport, PipelineError> {
        let mut workers = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(report) => workers.push(report),
                Err(e) => {
                    self.ctl.advance(PipelineState::Aborted);
                    self.ctl.abort.cancel();
                    return Err(PipelineError::WorkerPanic(e.to_string()));
                }
            }
        }

        if let Ok(failure) = self.failure_rx.try_recv() {
            return Err(failure);
        }

        self.ctl.advance(PipelineState::Terminated);
        Ok(PipelineReport {
            stages: aggregate(workers),
        })
    }
}

/// Fold per-worker totals into per-stage totals. Workers arrive in spawn
/// order, so consecutive runs of the same name are one stage.
fn aggregate(workers: Vec<WorkerReport>) -> Vec<StageReport> {
    let mut stages: Vec<StageReport> = Vec::new();
    for worker in workers {
        match stages.last_mut() {
            Some(stage) if stage.stage == worker.stage => {
                stage.replicas += 1;
                stage.processed += worker.processed;
                stage.emitted += worker.emitted;
            }
            _ => stages.push(StageReport {
                stage: worker.stage,
                replicas: 1,
                processed: worker.processed,
                emitted: worker.emitted,
            }),
        }
    }
    stages
}
