// # DDNS Update Gate
//
// Suppresses redundant dynamic DNS updates.
//
// ## Purpose
//
// In guardian mode every account is re-checked on each cycle. Without a gate
// each check would call the DNS provider even when nothing changed. The gate
// remembers, per scope (the record being updated), the last IP an update was
// attempted for and only lets a different IP through.
//
// ## Concurrency
//
// Check-and-claim happens under one lock, so two monitors observing the same
// new IP for the same record trigger a single provider call. Different
// records never suppress each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info};

use crate::config::DdnsConfig;
use crate::error::Result;
use crate::event::{Category, Event, Property};
use crate::queue::EventQueue;
use crate::traits::{DnsProvider, DnsUpdateRequest};

/// Remembers the last attempted IP per update scope
#[derive(Debug, Default)]
pub struct DdnsGate {
    applied: Mutex<HashMap<String, String>>,
}

impl DdnsGate {
    /// Create an empty gate
    pub fn new() -> Self {
        Self::default()
    }

    fn applied(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim an update of `scope` to `ip`
    ///
    /// # Returns
    ///
    /// `true` if `ip` differs from the last value claimed for `scope`; the
    /// new value is recorded before returning. `false` if unchanged.
    pub fn should_update(&self, scope: &str, ip: &str) -> bool {
        let mut applied = self.applied();
        if applied.get(scope).is_some_and(|last| last == ip) {
            return false;
        }
        applied.insert(scope.to_string(), ip.to_string());
        true
    }

    /// Last IP claimed for `scope`
    pub fn last_applied(&self, scope: &str) -> Option<String> {
        self.applied().get(scope).cloned()
    }

    /// Drop the remembered IP so the next observation triggers an update
    pub fn forget(&self, scope: &str) {
        self.applied().remove(scope);
    }
}

/// Publishes the authenticated IP through a gated DNS provider
pub struct DnsUpdater {
    provider: Arc<dyn DnsProvider>,
    gate: Arc<DdnsGate>,
    domain: String,
    ttl: u32,
    config: serde_json::Value,
}

impl DnsUpdater {
    /// Create an updater with its own gate
    pub fn new(provider: Arc<dyn DnsProvider>, settings: &DdnsConfig) -> Self {
        Self {
            provider,
            gate: Arc::new(DdnsGate::new()),
            domain: settings.domain.clone(),
            ttl: settings.ttl,
            config: settings.config.clone(),
        }
    }

    /// Share a gate with other updaters
    pub fn with_gate(mut self, gate: Arc<DdnsGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Record being published
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The gate deciding whether an update is needed
    pub fn gate(&self) -> &Arc<DdnsGate> {
        &self.gate
    }

    /// Publish `ip` unless the gate has already seen it for this record
    ///
    /// The outcome is reported as an `ActionSuccess`/`ActionFailure`
    /// `DnsUpdate` event under `context`. Failures never propagate into
    /// the login result.
    ///
    /// # Returns
    ///
    /// - `None`: Suppressed by the gate, no provider call made
    /// - `Some(result)`: The provider was called
    pub async fn publish(
        &self,
        client: &reqwest::Client,
        ip: &str,
        context: &str,
        queue: &EventQueue,
    ) -> Option<Result<()>> {
        if !self.gate.should_update(&self.domain, ip) {
            debug!(domain = %self.domain, ip, "IP unchanged, skipping DDNS update");
            return None;
        }

        info!(
            domain = %self.domain,
            ip,
            provider = self.provider.provider_name(),
            "DDNS update triggered"
        );

        let request = DnsUpdateRequest {
            domain: self.domain.clone(),
            ip: ip.to_string(),
            ttl: self.ttl,
            config: self.config.clone(),
        };
        let result = self.provider.update(client, &request).await;

        let properties = vec![Property::new("domain", &self.domain)];
        match &result {
            Ok(()) => {
                info!(domain = %self.domain, ip, "DDNS record updated");
                queue.emit(Event::success(Category::DnsUpdate, context, properties, ip));
            }
            Err(e) => {
                error!(domain = %self.domain, ip, "DDNS update failed: {}", e);
                queue.emit(Event::failure(
                    Category::DnsUpdate,
                    context,
                    properties,
                    e.to_string(),
                ));
            }
        }

        Some(result)
    }
}

impl std::fmt::Debug for DnsUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsUpdater")
            .field("provider", &self.provider.provider_name())
            .field("domain", &self.domain)
            .field("ttl", &self.ttl)
            .finish()
    }
}
