// # DNS Provider Trait
//
// Defines the interface for publishing an IP address to a dynamic DNS
// provider.
//
// ## Implementations
//
// - Cloudflare: `srun-dns-cloudflare` crate

use async_trait::async_trait;

/// One record update
#[derive(Debug, Clone)]
pub struct DnsUpdateRequest {
    /// Record name (e.g. "home.example.com")
    pub domain: String,
    /// Address to publish
    pub ip: String,
    /// Time-to-live; 0 lets the provider choose
    pub ttl: u32,
    /// Provider-specific configuration
    pub config: serde_json::Value,
}

/// Trait for DNS provider implementations
///
/// # Single-shot
///
/// Providers execute one update per call and never retry. Whether an update
/// is needed at all is decided by [`crate::DdnsGate`].
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create or update the record so it points at `request.ip`
    ///
    /// # Parameters
    ///
    /// - `client`: HTTP client bound to the same interface as the login
    /// - `request`: The record update
    async fn update(
        &self,
        client: &reqwest::Client,
        request: &DnsUpdateRequest,
    ) -> Result<(), crate::Error>;

    /// Provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers by name
pub trait DnsProviderFactory: Send + Sync {
    /// Create a provider instance from its configuration
    fn create(&self, config: &serde_json::Value) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
