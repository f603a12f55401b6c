// # srun-core
//
// Core library for keeping captive-portal accounts authenticated.
//
// ## Architecture Overview
//
// This library provides the orchestration layer; the portal protocol, the DNS
// provider wire client and the webhook transport plug in through traits:
// - **LoginCapability**: Status check and login against the portal
// - **DnsProvider**: Publishes the authenticated IP to a DDNS provider
// - **WebhookSink**: Delivers lifecycle events to a remote endpoint
// - **EventQueue**: Ordered, non-blocking event delivery to a sink
// - **LoginWorkflow**: One supervised login attempt for one account
// - **Guardian**: One cancellable monitor task per account
//
// ## Design Principles
//
// 1. **Failure Isolation**: One account never takes down another
// 2. **Explicit Cancellation**: Every long-running loop observes a token
// 3. **Library-First**: The daemon is a thin wrapper around this crate
// 4. **Begin/Finish Pairing**: Every attempt is bracketed by lifecycle events

pub mod backoff;
pub mod config;
pub mod ddns;
pub mod error;
pub mod event;
pub mod guardian;
pub mod login;
pub mod net;
pub mod queue;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use backoff::BackoffPolicy;
pub use config::{Account, Settings};
pub use ddns::{DdnsGate, DnsUpdater};
pub use error::{Error, Result};
pub use event::{Category, Event, EventKind, Property};
pub use guardian::{Guardian, PassReport, login_all};
pub use login::LoginWorkflow;
pub use net::{ClientOptions, IpFamily, build_client};
pub use queue::{EventQueue, QueueState};
pub use registry::ProviderRegistry;
pub use traits::{DnsProvider, LoginCapability, LoginCapabilityFactory, WebhookSink};
