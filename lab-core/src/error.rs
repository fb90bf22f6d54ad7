use thiserror::Error;

pub type Result<T> = std::result::Result<T, LabError>;

/// Error taxonomy for lab orchestration.
///
/// Variants are split the way callers need to react to them: `Busy` is
/// retryable after a wait, `NotFound` is a caller mistake, `Convergence`
/// is fatal for one member only, and `Platform` carries the cluster's own
/// message verbatim.
#[derive(Error, Debug)]
pub enum LabError {
    #[error("no cluster nodes available to allocate against")]
    NoNodes,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation already in progress: {0} gate is held")]
    Busy(String),

    #[error("VM {vmid} on node {node}: timed out waiting for {waiting_for}")]
    Convergence {
        vmid: u32,
        node: String,
        waiting_for: String,
    },

    #[error("platform error: {0}")]
    Platform(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LabError {
    /// True when the caller should simply retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LabError::Busy(_))
    }
}
