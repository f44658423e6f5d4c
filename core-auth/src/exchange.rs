//! Credential exchange
//!
//! Turns collected credentials into the backend's raw reply. Interpreting
//! the reply (granted, rejected, unusable) is left to the flow controller.

use crate::types::Credentials;
use async_trait::async_trait;
use core_request::{BridgeRequestCache, RequestError};
use serde_json::Value;
use tracing::{debug, instrument};

/// Sends credentials to the authentication backend.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self, credentials: &Credentials) -> Result<Value, RequestError>;
}

/// [`CredentialExchange`] posting `{login, password}` through the request
/// bridge. The reply is never cached.
#[derive(Debug, Clone)]
pub struct BridgeCredentialExchange {
    requests: BridgeRequestCache,
    url: String,
}

impl BridgeCredentialExchange {
    pub fn new(requests: BridgeRequestCache, url: impl Into<String>) -> Self {
        Self {
            requests,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CredentialExchange for BridgeCredentialExchange {
    #[instrument(skip(self, credentials), fields(url = %self.url))]
    async fn exchange(&self, credentials: &Credentials) -> Result<Value, RequestError> {
        debug!("Exchanging credentials");
        let body = serde_json::to_value(credentials)
            .map_err(|e| RequestError::Malformed(e.to_string()))?;
        self.requests.post(&self.url, body).await
    }
}
