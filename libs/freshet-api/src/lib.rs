pub mod error;
pub mod record;
pub mod sink;
pub mod stage;
pub mod util;

pub use error::{SinkError, SinkErrorKind, StageError};
pub use record::Record;
pub use sink::SinkAdapter;
pub use stage::{Stage, StageOutput};
pub use util::now_ms;
