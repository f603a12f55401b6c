//! Plugin-based DNS provider registry
//!
//! Providers register a factory under a name; the `ddns.provider` setting
//! selects one at startup without a hard-coded match on provider names.
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In srun-dns-cloudflare
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_dns_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory};

/// Registry mapping provider names to factories
///
/// Interior mutability with `RwLock` allows registration through a shared
/// reference.
#[derive(Default)]
pub struct ProviderRegistry {
    dns_providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_dns_provider(
        &self,
        name: impl Into<String>,
        factory: Box<dyn DnsProviderFactory>,
    ) {
        self.dns_providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Create a DNS provider by name
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error::Config)`: Unknown name or invalid provider config
    pub fn create_dns_provider(
        &self,
        name: &str,
        config: &serde_json::Value,
    ) -> Result<Box<dyn DnsProvider>> {
        let providers = self
            .dns_providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown DNS provider type: {}", name)))?;

        factory.create(config)
    }

    /// Check if a DNS provider is registered
    pub fn has_dns_provider(&self, name: &str) -> bool {
        self.dns_providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Names of all registered DNS providers, sorted
    pub fn list_dns_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .dns_providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
