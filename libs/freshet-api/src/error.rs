use std::fmt;

/// Error kind for sink adapter errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    Config,
    Io,
    Timeout,
}

/// Sink adapter error — returned by all `SinkAdapter` methods.
#[derive(Debug)]
pub struct SinkError {
    pub kind: SinkErrorKind,
    pub message: String,
}

impl SinkError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: SinkErrorKind::Config, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: SinkErrorKind::Io, message: msg.into() }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self { kind: SinkErrorKind::Timeout, message: msg.into() }
    }

    /// Add context to the error, preserving the original kind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

/// Error raised inside a stage's `process` call.
///
/// Anything other than `StageOutput::Complete` that stops a stage is one of
/// these; the engine wraps it with the failing stage's name and shard index.
/// Stages that need resilience retry internally before returning.
#[derive(Debug)]
pub struct StageError {
    pub message: String,
}

impl StageError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { message: msg.into() }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StageError {}

impl From<SinkError> for StageError {
    fn from(e: SinkError) -> Self {
        Self { message: format!("sink: {e}") }
    }
}
