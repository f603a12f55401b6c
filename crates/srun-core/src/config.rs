//! Configuration types for srun-guard
//!
//! Settings are loaded once at startup from a JSON file and are immutable
//! afterwards. Every section has serde defaults so a minimal file only needs
//! the portal host and the accounts.

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::error::{Error, Result};
use crate::net::{ClientOptions, IpFamily};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Captive portal location and login metadata
    pub portal: PortalConfig,

    /// Accounts to keep authenticated
    pub accounts: Vec<Account>,

    /// HTTP client settings shared by every account
    #[serde(default)]
    pub basic: BasicConfig,

    /// Continuous monitoring
    #[serde(default)]
    pub guardian: GuardianConfig,

    /// Retry schedule for login attempts
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Dynamic DNS publication
    #[serde(default)]
    pub ddns: DdnsConfig,

    /// Lifecycle event notifications
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Logging
    #[serde(default)]
    pub log: LogConfig,
}

impl Settings {
    /// Load settings from a JSON file and validate them
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    /// Parse settings from a JSON document and validate them
    pub fn from_json(raw: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.portal.validate()?;

        // An empty account list is valid; the guardian reports it and idles
        for account in &self.accounts {
            account.validate()?;
        }

        if self.basic.timeout_secs == 0 {
            return Err(Error::config("basic.timeout_secs must be > 0"));
        }
        if self.guardian.enable && self.guardian.duration_secs == 0 {
            return Err(Error::config("guardian.duration_secs must be > 0"));
        }

        self.backoff.validate()?;
        self.ddns.validate()?;
        self.webhook.validate()?;

        Ok(())
    }

    /// Client options for an account, honouring its interface binding
    pub fn client_options(&self, account: &Account) -> ClientOptions {
        ClientOptions {
            skip_cert_verify: self.basic.skip_cert_verify,
            timeout: Duration::from_secs(self.basic.timeout_secs),
            interface: account.interface.clone(),
            family: self.basic.ip_family,
        }
    }

    /// Backoff policy, if retries are enabled
    pub fn backoff_policy(&self) -> Option<BackoffPolicy> {
        self.backoff.enable.then(|| BackoffPolicy::from_config(&self.backoff))
    }

    /// Whether the login IP must be left empty for this account
    pub fn double_stack(&self, account: &Account) -> bool {
        account.double_stack.unwrap_or(self.portal.double_stack)
    }
}

/// Captive portal location and protocol metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Portal host, optionally with port (e.g. "10.0.0.55" or "portal.example.edu")
    pub host: String,

    /// Use HTTPS instead of HTTP
    #[serde(default)]
    pub https: bool,

    /// Access controller id
    #[serde(default = "default_ac_id")]
    pub ac_id: String,

    /// Login domain appended to usernames by some deployments
    #[serde(default)]
    pub domain: String,

    /// Do not bind the login request to a single address
    #[serde(default)]
    pub double_stack: bool,

    /// Protocol constant `n`
    #[serde(default = "default_n")]
    pub n: String,

    /// Protocol constant `type`
    #[serde(default = "default_type", rename = "type")]
    pub kind: String,

    /// Reported operating system
    #[serde(default = "default_os")]
    pub os: String,

    /// Reported device name
    #[serde(default = "default_name")]
    pub name: String,

    /// Extra headers sent with every portal request
    #[serde(default)]
    pub custom_header: BTreeMap<String, String>,
}

impl PortalConfig {
    /// Create a portal configuration with protocol defaults
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            https: false,
            ac_id: default_ac_id(),
            domain: String::new(),
            double_stack: false,
            n: default_n(),
            kind: default_type(),
            os: default_os(),
            name: default_name(),
            custom_header: BTreeMap::new(),
        }
    }

    /// Base URL of the portal, without a trailing slash
    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}", scheme, self.host.trim_end_matches('/'))
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("portal.host cannot be empty"));
        }
        if self.host.contains("://") {
            return Err(Error::config(
                "portal.host must not contain a scheme; use portal.https instead",
            ));
        }
        for (name, value) in &self.custom_header {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(Error::config(format!(
                    "portal.custom_header has an invalid header name '{}'",
                    name
                )));
            }
            if HeaderValue::from_str(value).is_err() {
                return Err(Error::config(format!(
                    "portal.custom_header value for '{}' is not a valid header value",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// One account to keep authenticated
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    /// Portal username
    pub username: String,

    /// Portal password
    pub password: String,

    /// User type tag (e.g. "cmcc"), appended to the username as `@tag`
    #[serde(default)]
    pub user_type: String,

    /// Network interface to bind outbound connections to
    #[serde(default)]
    pub interface: Option<String>,

    /// Per-account override of `portal.double_stack`
    #[serde(default)]
    pub double_stack: Option<bool>,
}

impl Account {
    /// Create an account with no interface binding
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            user_type: String::new(),
            interface: None,
            double_stack: None,
        }
    }

    /// Bind the account to a network interface
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Set the user type tag
    pub fn with_user_type(mut self, user_type: impl Into<String>) -> Self {
        self.user_type = user_type.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::config("account username cannot be empty"));
        }
        if self.interface.as_deref().is_some_and(|i| i.trim().is_empty()) {
            return Err(Error::config(format!(
                "account {}: interface cannot be an empty string",
                self.username
            )));
        }
        Ok(())
    }
}

// Passwords never reach the logs
impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("user_type", &self.user_type)
            .field("interface", &self.interface)
            .field("double_stack", &self.double_stack)
            .finish()
    }
}

/// HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicConfig {
    /// Accept invalid TLS certificates (self-signed portals)
    #[serde(default)]
    pub skip_cert_verify: bool,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Address family used when binding to an interface
    #[serde(default)]
    pub ip_family: IpFamily,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            skip_cert_verify: false,
            timeout_secs: default_timeout_secs(),
            ip_family: IpFamily::default(),
        }
    }
}

/// Continuous monitoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianConfig {
    /// Keep every account logged in until shutdown
    #[serde(default)]
    pub enable: bool,

    /// Seconds between checks for each account
    #[serde(default = "default_guardian_secs")]
    pub duration_secs: u64,
}

impl GuardianConfig {
    /// Interval between two checks of the same account
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            enable: false,
            duration_secs: default_guardian_secs(),
        }
    }
}

/// Retry schedule for login attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Retry failed logins
    #[serde(default)]
    pub enable: bool,

    /// Total attempts including the first one; 0 retries until cancelled
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in seconds
    #[serde(default = "default_initial_secs")]
    pub initial_secs: u64,

    /// Upper bound for a single delay, in seconds
    #[serde(default = "default_max_secs")]
    pub max_secs: u64,

    /// Multiplier applied to the delay after each failed attempt
    #[serde(default = "default_exponent_factor")]
    pub exponent_factor: f64,
}

impl BackoffConfig {
    fn validate(&self) -> Result<()> {
        if !self.enable {
            return Ok(());
        }
        if self.exponent_factor < 1.0 || !self.exponent_factor.is_finite() {
            return Err(Error::config("backoff.exponent_factor must be >= 1"));
        }
        if self.max_secs < self.initial_secs {
            return Err(Error::config(
                "backoff.max_secs must be >= backoff.initial_secs",
            ));
        }
        Ok(())
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enable: false,
            max_attempts: default_max_attempts(),
            initial_secs: default_initial_secs(),
            max_secs: default_max_secs(),
            exponent_factor: default_exponent_factor(),
        }
    }
}

/// Dynamic DNS settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// Publish the authenticated IP after login
    #[serde(default)]
    pub enable: bool,

    /// Registered provider name (e.g. "cloudflare")
    #[serde(default)]
    pub provider: String,

    /// Record to update
    #[serde(default)]
    pub domain: String,

    /// Record TTL in seconds; 0 lets the provider decide
    #[serde(default)]
    pub ttl: u32,

    /// Provider-specific configuration
    #[serde(default)]
    pub config: serde_json::Value,
}

impl DdnsConfig {
    fn validate(&self) -> Result<()> {
        if !self.enable {
            return Ok(());
        }
        if self.provider.trim().is_empty() {
            return Err(Error::config("ddns.provider is required when ddns is enabled"));
        }
        if self.domain.trim().is_empty() {
            return Err(Error::config("ddns.domain is required when ddns is enabled"));
        }
        Ok(())
    }
}

/// Webhook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Deliver lifecycle events
    #[serde(default)]
    pub enable: bool,

    /// Endpoint receiving a POST per event
    #[serde(default)]
    pub url: String,

    /// Per-request timeout, also the event queue drain deadline at shutdown
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

impl WebhookConfig {
    /// Timeout for one delivery and for the final queue drain
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if !self.enable {
            return Ok(());
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(Error::config(format!(
                "webhook.url must use HTTP or HTTPS scheme. Got: {}",
                self.url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("webhook.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enable: false,
            url: String::new(),
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_ac_id() -> String {
    "5".to_string()
}

fn default_n() -> String {
    "200".to_string()
}

fn default_type() -> String {
    "1".to_string()
}

fn default_os() -> String {
    "Windows 10".to_string()
}

fn default_name() -> String {
    "Windows".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_guardian_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_secs() -> u64 {
    1
}

fn default_max_secs() -> u64 {
    60
}

fn default_exponent_factor() -> f64 {
    2.0
}

fn default_webhook_timeout_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}
