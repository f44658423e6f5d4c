use bridge_traits::BridgeError;
use core_request::RequestError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Cannot {operation} while the flow is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Session storage failed: {0}")]
    Storage(#[from] BridgeError),

    #[error("Navigation failed: {0}")]
    Navigation(BridgeError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request failed: {0}")]
    Request(#[from] RequestError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
