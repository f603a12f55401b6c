//! Capability contracts consumed by the orchestration layer
//!
//! - [`LoginCapability`]: Status check and login against the captive portal
//! - [`DnsProvider`]: Publish an IP to a dynamic DNS provider
//! - [`WebhookSink`]: Deliver lifecycle events to a remote endpoint

pub mod dns_provider;
pub mod login;
pub mod webhook;

pub use dns_provider::{DnsProvider, DnsProviderFactory, DnsUpdateRequest};
pub use login::{LoginCapability, LoginCapabilityFactory, LoginStatus};
pub use webhook::WebhookSink;
