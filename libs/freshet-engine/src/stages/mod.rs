//! Reference stages: a deterministic generator, a per-key summing
//! aggregator, and the adapter-backed terminal stage.

mod sink;
mod source;
mod sum;

pub use sink::SinkStage;
pub use source::FakeSource;
pub use sum::Sum;
