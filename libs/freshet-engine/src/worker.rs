use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use freshet_api::{Record, Stage, StageError, StageOutput};

use crate::error::PipelineError;
use crate::pipeline::PipelineState;
use crate::router::ShardRouter;

/// Shared control plane: the only state crossing worker boundaries.
///
/// `stop` asks sources to stop ticking (everything downstream drains);
/// `abort` interrupts every worker without draining. The state label is a
/// single-writer watch channel, observed by handles.
pub(crate) struct Control {
    pub(crate) stop: CancellationToken,
    pub(crate) abort: CancellationToken,
    state_tx: watch::Sender<PipelineState>,
    failure_tx: mpsc::UnboundedSender<PipelineError>,
    sources_open: AtomicUsize,
}

impl Control {
    pub(crate) fn new(
        state_tx: watch::Sender<PipelineState>,
        failure_tx: mpsc::UnboundedSender<PipelineError>,
    ) -> Self {
        Self {
            stop: CancellationToken::new(),
            abort: CancellationToken::new(),
            state_tx,
            failure_tx,
            sources_open: AtomicUsize::new(0),
        }
    }

    /// External stop request or in-stream completion: stop issuing new
    /// input, let in-flight records finish traversing all stages.
    pub(crate) fn request_stop(&self) {
        self.advance(PipelineState::Draining);
        self.stop.cancel();
    }

    pub(crate) fn source_started(&self) {
        self.sources_open.fetch_add(1, Ordering::SeqCst);
    }

    /// Called by every source worker on exit; the last one starts the drain.
    pub(crate) fn source_done(&self) {
        if self.sources_open.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.advance(PipelineState::Draining);
        }
    }

    /// Fail-fast: report the failure, interrupt every worker.
    pub(crate) fn fail(&self, stage: &str, shard: usize, source: StageError) {
        tracing::error!(stage = %stage, shard, error = %source, "stage failed");
        let _ = self.failure_tx.send(PipelineError::Stage {
            stage: stage.to_string(),
            shard,
            source,
        });
        self.advance(PipelineState::Aborted);
        self.abort.cancel();
    }

    /// Move the state label forward. Illegal transitions (anything out of a
    /// terminal state, or skipping Draining) are ignored.
    pub(crate) fn advance(&self, next: PipelineState) {
        self.state_tx.send_if_modified(|state| {
            use PipelineState::*;
            let allowed = matches!(
                (*state, next),
                (Running, Draining) | (Running, Aborted) | (Draining, Terminated) | (Draining, Aborted)
            );
            if allowed {
                tracing::info!(from = ?state, to = ?next, "pipeline state");
                *state = next;
            }
            allowed
        });
    }
}

/// One worker's view of the next stage: one bounded sender per downstream
/// shard, plus the router that picks among them.
pub(crate) struct Outbound<T> {
    router: ShardRouter,
    txs: Vec<mpsc::Sender<Record<T>>>,
}

impl<T> Outbound<T> {
    pub(crate) fn new(txs: Vec<mpsc::Sender<Record<T>>>) -> Self {
        Self {
            router: ShardRouter::new(txs.len()),
            txs,
        }
    }
}

enum Delivery {
    Sent,
    /// Routing rejected the record; it is logged and dropped, nothing else.
    Dropped,
    /// The downstream shard is gone (abort in progress). Stop the worker.
    Closed,
}

/// Route one record and push it to its shard. A full downstream queue
/// blocks only this call — per-shard backpressure, nothing is dropped.
async fn deliver<T>(out: &Outbound<T>, record: Record<T>, abort: &CancellationToken) -> Delivery {
    let shard = match out.router.route(&record.key) {
        Ok(shard) => shard,
        Err(e) => {
            tracing::warn!(key = %record.key, error = %e, "routing failed, record dropped");
            return Delivery::Dropped;
        }
    };
    tokio::select! {
        biased;
        _ = abort.cancelled() => Delivery::Closed,
        sent = out.txs[shard].send(record) => match sent {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::Closed,
        },
    }
}

#[derive(Debug)]
pub(crate) struct WorkerReport {
    pub(crate) stage: String,
    pub(crate) processed: u64,
    pub(crate) emitted: u64,
}

/// Drive one source replica: tick the stage until it completes or the
/// pipeline stops. Pacing sleeps suspend only this worker.
pub(crate) async fn run_source<S>(
    mut stage: S,
    name: String,
    shard: usize,
    delay: Duration,
    out: Outbound<S::Out>,
    ctl: Arc<Control>,
) -> WorkerReport
where
    S: Stage<In = ()>,
{
    let mut report = WorkerReport {
        stage: name.clone(),
        processed: 0,
        emitted: 0,
    };
    tracing::debug!(stage = %name, shard, "source worker started");

    'ticks: loop {
        if ctl.stop.is_cancelled() || ctl.abort.is_cancelled() {
            break;
        }
        match stage.process(Record::tick()).await {
            Ok(StageOutput::Continue(records)) => {
                report.processed += 1;
                for record in records {
                    match deliver(&out, record, &ctl.abort).await {
                        Delivery::Sent => report.emitted += 1,
                        Delivery::Dropped => {}
                        Delivery::Closed => break 'ticks,
                    }
                }
            }
            Ok(StageOutput::Complete) => {
                tracing::info!(stage = %name, shard, emitted = report.emitted, "source completed");
                break;
            }
            Err(e) => {
                ctl.fail(&name, shard, e);
                break;
            }
        }
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctl.stop.cancelled() => break,
                _ = ctl.abort.cancelled() => break,
            }
        }
    }

    ctl.source_done();
    tracing::debug!(stage = %name, shard, processed = report.processed, "source worker stopped");
    report
}

/// Drive one shard worker of a transform or sink stage.
///
/// Records are processed strictly serially — the at-most-one-in-flight-
/// per-key guarantee for the keys this shard owns. Upstream channel closure
/// means the shard is drained; dropping our own senders cascades the drain
/// downstream. Abort is observed between records, never mid-record.
pub(crate) async fn run_stage<S>(
    mut stage: S,
    name: String,
    shard: usize,
    mut rx: mpsc::Receiver<Record<S::In>>,
    out: Option<Outbound<S::Out>>,
    ctl: Arc<Control>,
) -> WorkerReport
where
    S: Stage,
{
    let mut report = WorkerReport {
        stage: name.clone(),
        processed: 0,
        emitted: 0,
    };
    tracing::debug!(stage = %name, shard, "worker started");

    'records: loop {
        let record = tokio::select! {
            biased;
            _ = ctl.abort.cancelled() => {
                tracing::warn!(stage = %name, shard, "worker aborted");
                break;
            }
            record = rx.recv() => match record {
                Some(record) => record,
                None => break, // upstream closed: this shard is drained
            },
        };
        match stage.process(record).await {
            Ok(StageOutput::Continue(records)) => {
                report.processed += 1;
                match out {
                    Some(ref out) => {
                        for record in records {
                            match deliver(out, record, &ctl.abort).await {
                                Delivery::Sent => report.emitted += 1,
                                Delivery::Dropped => {}
                                Delivery::Closed => break 'records,
                            }
                        }
                    }
                    // Terminal stage: outputs are counted and discarded.
                    None => report.emitted += records.len() as u64,
                }
            }
            Ok(StageOutput::Complete) => {
                report.processed += 1;
                tracing::info!(stage = %name, shard, "stage signaled completion");
                ctl.request_stop();
                break;
            }
            Err(e) => {
                ctl.fail(&name, shard, e);
                break;
            }
        }
    }

    tracing::debug!(
        stage = %name,
        shard,
        processed = report.processed,
        emitted = report.emitted,
        "worker stopped"
    );
    report
}
