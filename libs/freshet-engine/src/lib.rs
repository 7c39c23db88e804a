pub mod config;
pub mod error;
pub mod router;
pub mod stages;
mod pipeline;
mod worker;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineHandle, PipelineReport, PipelineState, SourceOptions,
    StageOptions, StageReport,
};
pub use router::{RoutingError, ShardRouter};
