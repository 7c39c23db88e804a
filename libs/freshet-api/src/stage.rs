use std::future::Future;
use std::pin::Pin;

use crate::error::StageError;
use crate::record::Record;

/// What one processing call produced.
///
/// Completion is a value, not an unwind: a stage ends the pipeline by
/// returning `Complete`, and the worker loop handles it explicitly.
pub enum StageOutput<T> {
    /// Zero or more records for the next stage. Empty is valid (a pure
    /// sink after side-effecting).
    Continue(Vec<Record<T>>),
    /// End of stream. Not an error: the pipeline stops issuing new input
    /// and drains what is already in flight.
    Complete,
}

/// A pipeline step — the only active entity in the system.
///
/// Three roles, one capability:
/// - Source: `In = ()`, driven by tick records, emits fresh records
/// - Transform: record in → zero or more records out
/// - Sink: record in → external write, usually nothing out
///
/// Each worker owns its stage instance exclusively, so `process` takes
/// `&mut self` and per-key state needs no locking. Side effects belong in
/// source and sink stages only; aggregating stages are pure functions of
/// their own state.
pub trait Stage: Send {
    type In: Send + 'static;
    type Out: Send + 'static;

    /// Process one record (or tick, for sources).
    ///
    /// An `Err` is fatal to the pipeline by default — stages that need
    /// resilience retry internally before returning.
    fn process(
        &mut self,
        record: Record<Self::In>,
    ) -> Pin<Box<dyn Future<Output = Result<StageOutput<Self::Out>, StageError>> + Send + '_>>;
}
