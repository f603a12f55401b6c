// # Login Capability Trait
//
// Defines the interface to the captive portal protocol.
//
// ## Implementations
//
// - Plain Srun portal: `srun-portal` crate
//
// ## Usage
//
// ```rust,ignore
// use srun_core::LoginCapability;
//
// async fn ensure_online(portal: &dyn LoginCapability) -> srun_core::Result<()> {
//     let status = portal.status().await?;
//     if !status.online {
//         portal.login(status.ip.as_deref().unwrap_or_default()).await?;
//     }
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::config::Account;

/// Online status reported by the portal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginStatus {
    /// Whether the client is already authenticated
    pub online: bool,
    /// Client IP as seen by the portal, if reported
    pub ip: Option<String>,
}

impl LoginStatus {
    pub fn online(ip: impl Into<String>) -> Self {
        Self {
            online: true,
            ip: Some(ip.into()),
        }
    }

    pub fn offline(ip: Option<String>) -> Self {
        Self { online: false, ip }
    }
}

/// Trait for captive portal protocol implementations
///
/// # Retry Ownership
///
/// Implementations perform a single exchange per call. Retries and backoff
/// are owned by [`crate::LoginWorkflow`]; return an error and let it decide.
///
/// # Errors
///
/// - [`crate::Error::Transient`] for network failures and timeouts
/// - [`crate::Error::Protocol`] when the portal rejects the request
#[async_trait]
pub trait LoginCapability: Send + Sync {
    /// Query whether the client is online and which IP the portal sees
    async fn status(&self) -> Result<LoginStatus, crate::Error>;

    /// Log in
    ///
    /// # Parameters
    ///
    /// - `ip`: Address to authenticate; empty in dual-stack mode so the
    ///   portal does not bind the session to a single address
    async fn login(&self, ip: &str) -> Result<(), crate::Error>;

    /// Detect the client IP when the status query did not report one
    ///
    /// The default implementation knows no other way to find it.
    async fn detect_ip(&self) -> Result<Option<String>, crate::Error> {
        Ok(None)
    }
}

/// Builds a login capability for one account over its bound HTTP client
pub trait LoginCapabilityFactory: Send + Sync {
    /// Create a capability for `account`
    ///
    /// # Parameters
    ///
    /// - `account`: The account to authenticate
    /// - `client`: HTTP client already bound to the account's interface
    fn create(
        &self,
        account: &Account,
        client: reqwest::Client,
    ) -> Result<Box<dyn LoginCapability>, crate::Error>;
}
