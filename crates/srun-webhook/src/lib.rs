// # Webhook Sinks
//
// Delivers lifecycle events to a remote endpoint.
//
// - [`PostWebhook`]: one JSON `POST` per event
// - [`NopWebhook`]: discards events when no webhook is configured
//
// Delivery failures are reported as `Error::Delivery`. The core event queue
// logs them and moves on; nothing here retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use srun_core::config::WebhookConfig;
use srun_core::traits::WebhookSink;
use srun_core::{Error, Event, Result};

const USER_AGENT: &str = concat!("srun-guard/", env!("CARGO_PKG_VERSION"));

/// Posts every event as JSON to a fixed URL
#[derive(Debug, Clone)]
pub struct PostWebhook {
    client: reqwest::Client,
    url: String,
}

impl PostWebhook {
    /// Create a sink posting to `url`
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)`: The HTTP client could not be built
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("failed to build webhook client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WebhookSink for PostWebhook {
    async fn deliver(&self, event: &Event) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| Error::delivery(format!("webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::delivery(format!("webhook returned HTTP {}", status)));
        }

        trace!(kind = ?event.kind, context = %event.context, "Webhook delivered");
        Ok(())
    }
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NopWebhook;

#[async_trait]
impl WebhookSink for NopWebhook {
    async fn deliver(&self, event: &Event) -> Result<()> {
        trace!(kind = ?event.kind, context = %event.context, "Webhook disabled, event dropped");
        Ok(())
    }
}

/// Sink for the webhook settings: [`PostWebhook`] when enabled, else [`NopWebhook`]
pub fn from_config(config: &WebhookConfig) -> Result<Arc<dyn WebhookSink>> {
    if !config.enable {
        debug!("Webhook disabled");
        return Ok(Arc::new(NopWebhook));
    }

    debug!(url = %config.url, "Webhook enabled");
    Ok(Arc::new(PostWebhook::new(config.url.clone(), config.timeout())?))
}
