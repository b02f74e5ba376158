//! Error type shared by the store, the channel, the replay service and the
//! training processes.

use std::io;

/// Errors raised by the distributed SAC components.
///
/// Conditions that the protocol recovers from locally (an `Unavailable` pull,
/// store overflow, a store below its minimum size) are never reported through
/// this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error while persisting or loading state.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Burn recorder failure while saving or loading module weights.
    #[error("Recorder error: {0}")]
    Recorder(String),

    /// Serialization failure (wire protocol or store checkpoint).
    #[error("Encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Deserialization failure (wire protocol or store checkpoint).
    #[error("Decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Tensor data could not be converted to host values.
    #[error("Tensor data error: {0}")]
    TensorData(String),

    /// A persisted weight file does not match the configured architecture.
    #[error("Shape mismatch in {module}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        module: String,
        expected: Vec<Vec<usize>>,
        found: Vec<Vec<usize>>,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A parameter push tried to move `train_step` backwards.
    #[error("Stale train step: slot holds {current}, push attempted {attempted}")]
    StaleTrainStep { current: u64, attempted: u64 },

    /// The replay service could not be reached within the retry budget.
    #[error("Connection to replay service at {address} lost after {attempts} attempts")]
    ConnectionLost { address: String, attempts: usize },

    /// The replay service answered with an error.
    #[error("Replay service error: {0}")]
    Remote(String),

    /// Request addressed a table the server does not host.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Environment construction or stepping failed.
    #[error("Environment error: {0}")]
    Environment(String),

    /// A learner or agent thread panicked.
    /// A non-idempotent request was sent but its answer never arrived, so it
    /// may or may not have been applied. Not retried.
    #[error("{request} request to {address} was sent but not confirmed: {reason}")]
    Unconfirmed {
        address: String,
        request: &'static str,
        reason: String,
    },

    #[error("Worker {0} panicked")]
    WorkerPanicked(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::StaleTrainStep { current: 10, attempted: 3 };
        assert_eq!(
            err.to_string(),
            "Stale train step: slot holds 10, push attempted 3"
        );

        let err = Error::ConnectionLost {
            address: "localhost:8000".to_string(),
            attempts: 3,
        };
        assert!(err.to_string().contains("localhost:8000"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
