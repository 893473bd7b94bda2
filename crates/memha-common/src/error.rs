use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemhaError {
    /// The key is not present on the node (or, for replicated reads, on any
    /// contacted node). Part of the normal API surface, never a failure of
    /// the node itself.
    #[error("cache miss")]
    CacheMiss,

    /// A conditional store found the key already present.
    #[error("item not stored")]
    NotStored,

    /// No node in the pool is currently marked healthy.
    #[error("no healthy nodes")]
    NoHealthyNodes,

    /// `start` was called while the supervisor loop is running.
    #[error("client is already running")]
    AlreadyRunning,

    /// `stop` was called while the supervisor loop is not running.
    #[error("client is not running")]
    NotRunning,

    /// An aggregation task died unexpectedly; the operation outcome is
    /// indeterminate.
    #[error("unknown internal error")]
    Unknown,

    #[error("request timeout after {0}ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    /// The peer answered, but not with anything the protocol allows
    /// (e.g. `SERVER_ERROR`, or incrementing a non-numeric value).
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("node source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemhaError {
    /// Whether this error means the node could not be reached at all.
    ///
    /// Transport errors downgrade a node's health; protocol-semantic
    /// outcomes (`CacheMiss`, `NotStored`) and protocol errors never do.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MemhaError::Timeout(_) | MemhaError::Transport(_) | MemhaError::Io(_)
        )
    }

    /// Whether this error is part of the normal cache vocabulary rather
    /// than a failure.
    pub fn is_semantic(&self) -> bool {
        matches!(self, MemhaError::CacheMiss | MemhaError::NotStored)
    }
}

pub type Result<T> = std::result::Result<T, MemhaError>;
