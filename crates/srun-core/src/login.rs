//! Supervised login operation
//!
//! [`LoginWorkflow::run`] performs one supervised login for one account:
//!
//! 1. Emit `ProcessBegin` under the context `login_<username>`
//! 2. Run the login workflow, wrapped by the backoff policy when enabled
//! 3. Emit exactly one `ActionSuccess`/`ActionFailure` for the login
//! 4. Emit `ProcessFinish`, whatever the outcome
//!
//! The workflow itself obtains a client bound to the account's interface,
//! checks the online status and logs in when offline. The DDNS updater, if
//! configured, runs after a confirmed online state.
//!
//! ## Client Reuse
//!
//! Building a client loads the TLS roots and resolves the interface address,
//! so it happens on the blocking pool and the result is cached per interface.
//! A cached client is dropped when an attempt fails for any reason other than
//! configuration, so the next attempt picks up a changed interface address.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::config::{Account, Settings};
use crate::ddns::DnsUpdater;
use crate::error::{Error, Result};
use crate::event::{Category, Event};
use crate::net::{ClientOptions, build_client};
use crate::queue::EventQueue;
use crate::traits::LoginCapabilityFactory;

/// Context string correlating every event of one account's login process
pub fn event_context(account: &Account) -> String {
    format!("login_{}", account.username)
}

/// One supervised login for one account, shared by all monitors
pub struct LoginWorkflow {
    portal: Arc<dyn LoginCapabilityFactory>,
    queue: EventQueue,
    client_options: ClientOptions,
    double_stack: bool,
    backoff: Option<BackoffPolicy>,
    ddns: Option<DnsUpdater>,
    clients: Mutex<HashMap<Option<String>, reqwest::Client>>,
}

impl LoginWorkflow {
    /// Create a workflow with no retries and no DDNS
    pub fn new(portal: Arc<dyn LoginCapabilityFactory>, queue: EventQueue) -> Self {
        Self {
            portal,
            queue,
            client_options: ClientOptions::new(),
            double_stack: false,
            backoff: None,
            ddns: None,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Create a workflow from loaded settings
    pub fn from_settings(
        settings: &Settings,
        portal: Arc<dyn LoginCapabilityFactory>,
        queue: EventQueue,
        ddns: Option<DnsUpdater>,
    ) -> Self {
        let mut workflow = Self::new(portal, queue)
            .with_client_options(ClientOptions {
                skip_cert_verify: settings.basic.skip_cert_verify,
                timeout: std::time::Duration::from_secs(settings.basic.timeout_secs),
                interface: None,
                family: settings.basic.ip_family,
            })
            .with_double_stack(settings.portal.double_stack);

        if let Some(policy) = settings.backoff_policy() {
            workflow = workflow.with_backoff(policy);
        }
        if let Some(updater) = ddns {
            workflow = workflow.with_ddns(updater);
        }
        workflow
    }

    /// Base client options; the interface is taken from each account
    pub fn with_client_options(mut self, options: ClientOptions) -> Self {
        self.client_options = options;
        self
    }

    /// Default dual-stack mode for accounts without an override
    pub fn with_double_stack(mut self, double_stack: bool) -> Self {
        self.double_stack = double_stack;
        self
    }

    /// Retry the whole workflow under `policy`
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = Some(policy);
        self
    }

    /// Publish the IP after a successful check or login
    pub fn with_ddns(mut self, updater: DnsUpdater) -> Self {
        self.ddns = Some(updater);
        self
    }

    /// Queue receiving this workflow's events
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Perform one supervised login for `account`
    ///
    /// Always emits a `ProcessBegin`/`ProcessFinish` pair around exactly one
    /// terminal login event.
    ///
    /// # Returns
    ///
    /// The final outcome after any retries.
    pub async fn run(&self, account: &Account, cancel: &CancellationToken) -> Result<()> {
        let context = event_context(account);
        self.queue.emit(Event::process_begin(&context));

        let ctx = context.as_str();
        let result = match &self.backoff {
            Some(policy) => {
                policy
                    .run(move |attempt| self.attempt(account, ctx, attempt), cancel)
                    .await
            }
            None => self.attempt(account, ctx, 1).await,
        };

        match &result {
            Ok(()) => {
                info!(username = %account.username, "Login successful");
                self.queue.emit(Event::success(
                    Category::Login,
                    &context,
                    Vec::new(),
                    &account.username,
                ));
            }
            Err(e) => {
                error!(username = %account.username, "Login failed: {}", e);
                self.queue.emit(Event::failure(
                    Category::Login,
                    &context,
                    Vec::new(),
                    e.to_string(),
                ));
            }
        }

        self.queue.emit(Event::process_finish(&context));
        result
    }

    async fn attempt(&self, account: &Account, context: &str, attempt: u32) -> Result<()> {
        debug!(username = %account.username, attempt, "Attempting to login");

        let client = self.client_for(account.interface.as_deref()).await?;
        let result = self.login_with(account, context, client.clone()).await;
        if matches!(&result, Err(e) if !matches!(e, Error::Config(_))) {
            self.forget_client(account.interface.as_deref());
        }
        result
    }

    async fn login_with(
        &self,
        account: &Account,
        context: &str,
        client: reqwest::Client,
    ) -> Result<()> {
        let portal = self.portal.create(account, client.clone())?;

        let status = portal.status().await?;
        let mut client_ip = status.ip.filter(|ip| !ip.is_empty());

        if status.online {
            info!(
                username = %account.username,
                ip = client_ip.as_deref().unwrap_or("unknown"),
                "Already online"
            );
            self.publish_ip(&client, client_ip.as_deref(), context).await;
            return Ok(());
        }

        info!(username = %account.username, "Offline, proceeding with login");

        let login_ip = if account.double_stack.unwrap_or(self.double_stack) {
            debug!("Dual-stack mode, login IP left empty");
            String::new()
        } else {
            if client_ip.is_none() {
                client_ip = portal.detect_ip().await?;
            }
            client_ip
                .clone()
                .ok_or_else(|| Error::protocol("client IP could not be determined"))?
        };

        portal.login(&login_ip).await?;
        info!(
            username = %account.username,
            ip = client_ip.as_deref().unwrap_or("unknown"),
            "Portal accepted login"
        );

        self.publish_ip(&client, client_ip.as_deref(), context).await;
        Ok(())
    }

    /// Cached client for `interface`, built on the blocking pool on a miss
    async fn client_for(&self, interface: Option<&str>) -> Result<reqwest::Client> {
        let key = interface.filter(|name| !name.is_empty()).map(String::from);
        let cached = self.clients().get(&key).cloned();
        if let Some(client) = cached {
            return Ok(client);
        }

        let options = ClientOptions {
            interface: key.clone(),
            ..self.client_options.clone()
        };
        let client = tokio::task::spawn_blocking(move || build_client(&options))
            .await
            .map_err(|e| Error::Other(format!("client builder task failed: {}", e)))??;

        debug!(interface = key.as_deref().unwrap_or("default"), "HTTP client cached");
        self.clients().insert(key, client.clone());
        Ok(client)
    }

    fn forget_client(&self, interface: Option<&str>) {
        let key = interface.filter(|name| !name.is_empty()).map(String::from);
        self.clients().remove(&key);
    }

    #[cfg(test)]
    fn cached_clients(&self) -> usize {
        self.clients().len()
    }

    fn clients(&self) -> std::sync::MutexGuard<'_, HashMap<Option<String>, reqwest::Client>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn publish_ip(&self, client: &reqwest::Client, ip: Option<&str>, context: &str) {
        let Some(updater) = &self.ddns else {
            return;
        };
        match ip {
            Some(ip) => {
                // Outcome is reported as its own event; it never fails the login
                let _ = updater.publish(client, ip, context, &self.queue).await;
            }
            None => warn!(domain = updater.domain(), "No client IP known, skipping DDNS update"),
        }
    }
}

impl std::fmt::Debug for LoginWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginWorkflow")
            .field("client_options", &self.client_options)
            .field("double_stack", &self.double_stack)
            .field("backoff", &self.backoff)
            .field("ddns", &self.ddns)
            .finish()
    }
}
