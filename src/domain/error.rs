use thiserror::Error;

/// Failure kinds surfaced by cache, remote and engine operations.
///
/// `NonExistent` is a control signal as much as an error: a cache reporting it
/// sends the engine down the remote-fetch branch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("record does not exist")]
    NonExistent,
    #[error("malformed input: {message}")]
    MalformedInput { message: String },
    #[error("remote source failed: {message}")]
    Transport { message: String },
    #[error("storage failed: {message}")]
    Storage { message: String },
}

impl FetchError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
