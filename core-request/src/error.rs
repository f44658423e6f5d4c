use bridge_traits::BridgeFailure;
use thiserror::Error;

/// Failure of a bridged request.
///
/// `Clone` so that every awaiter of a shared cached response receives the
/// same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Remote error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Request dropped before a reply arrived")]
    Dropped,
}

impl From<BridgeFailure> for RequestError {
    fn from(failure: BridgeFailure) -> Self {
        match failure {
            BridgeFailure::Unreachable(message) => RequestError::Transport(message),
            BridgeFailure::Status { status, message } => RequestError::Remote { status, message },
            BridgeFailure::Malformed(message) => RequestError::Malformed(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, RequestError>;
