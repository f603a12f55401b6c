// # Network-Bound Client Factory
//
// Builds the outbound HTTP client used for one login attempt.
//
// ## Interface Binding
//
// When an account names a network interface:
// 1. The interface's first usable address of the preferred family is looked
//    up and used as the local address for every new connection
// 2. On Linux (and Android/Fuchsia) the socket is additionally restricted to
//    the device with `SO_BINDTODEVICE`
// 3. On other platforms step 2 is skipped with a warning
//
// A missing interface, or one without a usable address, is a configuration
// error. The caller never receives a half-bound client.
//
// Building a client is blocking work (TLS roots, interface enumeration);
// async callers run it on the blocking pool.

pub mod iface;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default request timeout for portal requests
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Address family used for interface binding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    /// IPv4 only
    #[default]
    V4,
    /// IPv6 only
    V6,
}

/// Parameters for [`build_client`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Accept invalid TLS certificates
    pub skip_cert_verify: bool,
    /// Timeout for a whole request
    pub timeout: Duration,
    /// Interface to bind outbound connections to
    pub interface: Option<String>,
    /// Family of the local address picked from the interface
    pub family: IpFamily,
}

impl ClientOptions {
    /// Unbound client with the default timeout
    pub fn new() -> Self {
        Self {
            skip_cert_verify: false,
            timeout: DEFAULT_TIMEOUT,
            interface: None,
            family: IpFamily::V4,
        }
    }

    /// Bind to a network interface
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an HTTP client, optionally bound to a network interface
///
/// # Returns
///
/// - `Ok(reqwest::Client)`: Fully configured client
/// - `Err(Error::Config)`: Unknown interface, no usable address, or the
///   client could not be built
pub fn build_client(options: &ClientOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(options.timeout)
        .danger_accept_invalid_certs(options.skip_cert_verify);

    if let Some(name) = options.interface.as_deref().filter(|n| !n.is_empty()) {
        builder = bind_interface(builder, name, options.family)?;
    }

    builder
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))
}

fn bind_interface(
    builder: reqwest::ClientBuilder,
    name: &str,
    family: IpFamily,
) -> Result<reqwest::ClientBuilder> {
    let local = iface::first_address(name, family)?;
    debug!(interface = name, %local, "Binding HTTP client to interface");
    Ok(bind_device(builder.local_address(local), name))
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "fuchsia"))]
fn bind_device(builder: reqwest::ClientBuilder, name: &str) -> reqwest::ClientBuilder {
    builder.interface(name)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "fuchsia")))]
fn bind_device(builder: reqwest::ClientBuilder, name: &str) -> reqwest::ClientBuilder {
    tracing::warn!(
        interface = name,
        "Device binding is not supported on this platform, using local address only"
    );
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_client_builds() {
        assert!(build_client(&ClientOptions::new()).is_ok());
    }

    #[test]
    fn empty_interface_name_means_unbound() {
        let options = ClientOptions::new().with_interface("");
        assert!(build_client(&options).is_ok());
    }

    #[test]
    fn unknown_interface_is_config_error() {
        let options = ClientOptions::new().with_interface("srun-nonexistent0");
        match build_client(&options) {
            Err(Error::Config(msg)) => assert!(msg.contains("srun-nonexistent0")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn family_deserializes_lowercase() {
        let family: IpFamily = serde_json::from_str("\"v6\"").unwrap();
        assert_eq!(family, IpFamily::V6);
    }
}
