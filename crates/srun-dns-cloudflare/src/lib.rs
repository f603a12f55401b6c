// # Cloudflare DNS Provider
//
// Publishes the authenticated IP to a Cloudflare DNS record.
//
// ## Update Flow
//
// 1. Resolve the zone ID (configured, or looked up from the record name)
// 2. Look up the record by name and type (A for IPv4, AAAA for IPv6)
// 3. Record exists with the same content: nothing to do
// 4. Record exists with other content: PUT the new content
// 5. No record: POST a new one
//
// One call to `update` is one attempt. Suppression of repeated IPs is owned
// by the core's DDNS gate; retries are not attempted here.
//
// ## Configuration
//
// ```json
// {
//   "api_token": "...",
//   "zone_id": "optional",
//   "proxied": false,
//   "dry_run": false
// }
// ```
//
// The API token never appears in logs or `Debug` output.
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`

use std::net::IpAddr;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use srun_core::traits::{DnsProvider, DnsProviderFactory, DnsUpdateRequest};
use srun_core::{Error, ProviderRegistry, Result};

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Provider settings, taken from `ddns.config`
#[derive(Clone, Deserialize)]
pub struct CloudflareConfig {
    /// API token with Zone:DNS:Edit permission
    pub api_token: String,

    /// Zone ID; looked up from the record name when absent
    #[serde(default)]
    pub zone_id: Option<String>,

    /// Proxy the record through Cloudflare
    #[serde(default)]
    pub proxied: bool,

    /// Perform lookups but skip writes
    #[serde(default)]
    pub dry_run: bool,

    /// API endpoint override
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    CLOUDFLARE_API_BASE.to_string()
}

impl CloudflareConfig {
    /// Config with a token and defaults for everything else
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            zone_id: None,
            proxied: false,
            dry_run: false,
            api_base: default_api_base(),
        }
    }
}

impl std::fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("proxied", &self.proxied)
            .field("dry_run", &self.dry_run)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Existing DNS record
#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    #[serde(default)]
    content: String,
}

/// Cloudflare DNS provider
#[derive(Debug)]
pub struct CloudflareProvider {
    config: CloudflareConfig,
}

impl CloudflareProvider {
    /// Create a provider
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)`: The API token is empty
    pub fn new(config: CloudflareConfig) -> Result<Self> {
        if config.api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        Ok(Self { config })
    }

    /// Whether writes are skipped
    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Zone ID for `domain`
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn zone_id(&self, client: &reqwest::Client, domain: &str) -> Result<String> {
        if let Some(zone_id) = &self.config.zone_id {
            debug!("Using pre-configured zone ID");
            return Ok(zone_id.clone());
        }

        let zone_name = zone_name(domain)?;
        debug!(zone = %zone_name, "Looking up zone ID");

        let response = client
            .get(self.url("/zones"))
            .bearer_auth(&self.config.api_token)
            .query(&[("name", zone_name.as_str())])
            .send()
            .await
            .map_err(request_failed)?;
        let body = check_response(response, "Zone lookup").await?;

        first_result(&body)
            .and_then(|zone| zone["id"].as_str().map(String::from))
            .ok_or_else(|| Error::delivery(format!("Zone not found: {}", zone_name)))
    }

    /// Existing record for `name` and `record_type`, if any
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?name=home.example.com&type=A
    /// Authorization: Bearer <token>
    /// ```
    async fn find_record(
        &self,
        client: &reqwest::Client,
        zone_id: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Option<DnsRecord>> {
        let response = client
            .get(self.url(&format!("/zones/{}/dns_records", zone_id)))
            .bearer_auth(&self.config.api_token)
            .query(&[("name", name), ("type", record_type)])
            .send()
            .await
            .map_err(request_failed)?;
        let body = check_response(response, "Record lookup").await?;

        match first_result(&body) {
            Some(record) => serde_json::from_value(record.clone())
                .map(Some)
                .map_err(|e| Error::delivery(format!("Invalid record in response: {}", e))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn update(&self, client: &reqwest::Client, request: &DnsUpdateRequest) -> Result<()> {
        let ip: IpAddr = request
            .ip
            .parse()
            .map_err(|_| Error::config(format!("Invalid IP address for DNS update: {}", request.ip)))?;
        let record_type = match ip {
            IpAddr::V4(_) => "A",
            IpAddr::V6(_) => "AAAA",
        };

        let mode = if self.config.dry_run { "DRY-RUN" } else { "LIVE" };
        info!(
            domain = %request.domain,
            %ip,
            record_type,
            mode,
            "Updating Cloudflare DNS record"
        );

        let zone_id = self.zone_id(client, &request.domain).await?;
        let existing = self
            .find_record(client, &zone_id, &request.domain, record_type)
            .await?;

        if existing.as_ref().is_some_and(|r| r.content == request.ip) {
            info!(domain = %request.domain, %ip, "DNS record already has correct IP");
            return Ok(());
        }

        // TTL 1 means "automatic" to Cloudflare
        let ttl = if request.ttl == 0 { 1 } else { request.ttl };
        let payload = serde_json::json!({
            "type": record_type,
            "name": request.domain,
            "content": request.ip,
            "ttl": ttl,
            "proxied": self.config.proxied,
        });

        let builder = match &existing {
            Some(record) => client.put(self.url(&format!(
                "/zones/{}/dns_records/{}",
                zone_id, record.id
            ))),
            None => client.post(self.url(&format!("/zones/{}/dns_records", zone_id))),
        };

        if self.config.dry_run {
            info!(
                "[DRY-RUN] Would {} DNS record with payload: {}",
                if existing.is_some() { "update" } else { "create" },
                payload
            );
            return Ok(());
        }

        let response = builder
            .bearer_auth(&self.config.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(request_failed)?;
        check_response(response, "Record update").await?;

        info!(domain = %request.domain, %ip, "DNS record updated successfully");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Zone name guessed from a record name
///
/// For "home.example.com" this is "example.com"; short second-level labels
/// such as "co.uk" keep one more label.
fn zone_name(domain: &str) -> Result<String> {
    let parts: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
    if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(Error::config(format!("Invalid domain name: {}", domain)));
    }

    let n = parts.len();
    if n >= 3 && parts[n - 2].len() <= 3 {
        Ok(parts[n - 3..].join("."))
    } else {
        Ok(parts[n - 2..].join("."))
    }
}

fn request_failed(e: reqwest::Error) -> Error {
    Error::delivery(format!("Cloudflare request failed: {}", e))
}

fn first_result(body: &Value) -> Option<&Value> {
    body["result"].as_array().and_then(|results| results.first())
}

/// Map a Cloudflare response to its JSON body or a delivery error
async fn check_response(response: reqwest::Response, action: &str) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        return Err(Error::delivery(match status.as_u16() {
            401 | 403 => format!(
                "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
                status
            ),
            404 => format!("{} failed: not found", action),
            409 => format!("Conflict: Record is being updated by another process. Status: {}", status),
            429 => format!("Rate limit exceeded. Please retry later. Status: {}", status),
            500..=599 => format!("Cloudflare server error: {} - {}", status, error_text),
            _ => format!("{} failed: {} - {}", action, status, error_text),
        }));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| Error::delivery(format!("Failed to parse response: {}", e)))?;

    if body["success"].as_bool() == Some(false) {
        return Err(Error::delivery(format!(
            "{} rejected: {}",
            action, body["errors"]
        )));
    }
    Ok(body)
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &Value) -> Result<Box<dyn DnsProvider>> {
        let config: CloudflareConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::config(format!("Invalid Cloudflare config: {}", e)))?;

        if config.dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Box::new(CloudflareProvider::new(config)?))
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use srun_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// srun_dns_cloudflare::register(&registry);
/// assert!(registry.has_dns_provider("cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_dns_provider("cloudflare", Box::new(CloudflareFactory));
}
