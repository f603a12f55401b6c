//! Webhook sink trait

use async_trait::async_trait;

use crate::event::Event;

/// Destination for lifecycle events
///
/// Delivery is best effort. The [`crate::EventQueue`] consumer logs a failed
/// delivery and moves on to the next event.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    /// Deliver one event
    async fn deliver(&self, event: &Event) -> Result<(), crate::Error>;
}
