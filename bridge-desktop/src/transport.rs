//! Request bridge over HTTP using Reqwest

use bridge_traits::{
    error::{BridgeError, Result},
    transport::{
        BridgeFailure, BridgeOutcome, BridgeRequest, BridgeTransport, RequestMethod, ResponseSink,
    },
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Longest slice of an error body echoed into a failure message
const MAX_ERROR_BODY: usize = 256;

/// Reqwest-backed [`BridgeTransport`]
///
/// Each dispatch spawns a task on the caller's Tokio runtime; the reply is
/// handed to the [`ResponseSink`] once the HTTP exchange completes.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with default timeouts
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a transport with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent("media-client-core/0.1.0")
            .build()
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Wrap a preconfigured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_request(&self, request: &BridgeRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            RequestMethod::Get => self.client.get(&request.url),
            RequestMethod::Post => self.client.post(&request.url),
        };

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        if let Some(payload) = &request.payload {
            builder = builder.json(payload);
        }

        builder
    }

    async fn execute(builder: reqwest::RequestBuilder) -> BridgeOutcome {
        let response = builder
            .send()
            .await
            .map_err(|e| BridgeFailure::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BridgeFailure::Unreachable(e.to_string()))?;

        if !status.is_success() {
            let mut message = body;
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            return Err(BridgeFailure::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| BridgeFailure::Malformed(e.to_string()))
    }
}

impl BridgeTransport for ReqwestTransport {
    fn dispatch(&self, request: BridgeRequest, replies: Arc<dyn ResponseSink>) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| {
            BridgeError::NotAvailable("ReqwestTransport requires a Tokio runtime".to_string())
        })?;

        let id = request.correlation_id;
        let builder = self.build_request(&request);

        debug!(
            correlation_id = %id,
            method = ?request.method,
            url = %request.url,
            "Dispatching bridge request"
        );

        handle.spawn(async move {
            let outcome = Self::execute(builder).await;
            if let Err(failure) = &outcome {
                warn!(correlation_id = %id, error = %failure, "Bridge request failed");
            }
            if !replies.deliver(id, outcome) {
                debug!(correlation_id = %id, "Reply arrived for a request nobody awaits");
            }
        });

        Ok(())
    }
}
