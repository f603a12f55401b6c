//! Test doubles and common utilities for contract tests
//!
//! These doubles script portal and provider behaviour per account and record
//! everything the core hands to them.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use srun_core::error::{Error, Result};
use srun_core::event::{Category, Event, EventKind};
use srun_core::traits::{
    DnsProvider, DnsUpdateRequest, LoginCapability, LoginCapabilityFactory, LoginStatus,
    WebhookSink,
};
use srun_core::{Account, EventQueue, LoginWorkflow};

/// How the mock portal behaves for one account
#[derive(Debug, Clone)]
pub enum PortalScript {
    /// Already authenticated with this IP
    Online(&'static str),
    /// Offline; status reports the IP (if any) and login succeeds
    Offline(Option<&'static str>),
    /// Status fails with a transient error this many times, then offline
    Flaky { failures: usize, ip: &'static str },
    /// Status always fails with a transient error
    Unreachable,
    /// Offline, and the portal rejects the login with this message
    Rejects(&'static str),
    /// Status panics
    Panics,
}

#[derive(Default)]
struct PortalLog {
    status_calls: HashMap<String, usize>,
    login_ips: HashMap<String, Vec<String>>,
    detect_calls: usize,
}

/// Portal factory scripted per username
#[derive(Clone, Default)]
pub struct MockPortalFactory {
    scripts: Arc<Mutex<HashMap<String, PortalScript>>>,
    detected_ip: Option<&'static str>,
    log: Arc<Mutex<PortalLog>>,
    created: Arc<AtomicUsize>,
}

impl MockPortalFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the portal for `username`
    pub fn script(self, username: &str, script: PortalScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(username.to_string(), script);
        self
    }

    /// IP returned by `detect_ip`
    pub fn detecting(mut self, ip: &'static str) -> Self {
        self.detected_ip = Some(ip);
        self
    }

    pub fn status_calls(&self, username: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .status_calls
            .get(username)
            .copied()
            .unwrap_or(0)
    }

    pub fn login_ips(&self, username: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .login_ips
            .get(username)
            .cloned()
            .unwrap_or_default()
    }

    pub fn detect_calls(&self) -> usize {
        self.log.lock().unwrap().detect_calls
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl LoginCapabilityFactory for MockPortalFactory {
    fn create(
        &self,
        account: &Account,
        _client: reqwest::Client,
    ) -> Result<Box<dyn LoginCapability>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&account.username)
            .cloned()
            .unwrap_or(PortalScript::Offline(Some("10.0.0.1")));

        Ok(Box::new(MockPortal {
            username: account.username.clone(),
            script,
            detected_ip: self.detected_ip,
            log: Arc::clone(&self.log),
        }))
    }
}

struct MockPortal {
    username: String,
    script: PortalScript,
    detected_ip: Option<&'static str>,
    log: Arc<Mutex<PortalLog>>,
}

impl MockPortal {
    fn record_status(&self) -> usize {
        let mut log = self.log.lock().unwrap();
        let calls = log.status_calls.entry(self.username.clone()).or_insert(0);
        *calls += 1;
        *calls
    }
}

#[async_trait]
impl LoginCapability for MockPortal {
    async fn status(&self) -> Result<LoginStatus> {
        let call = self.record_status();
        match &self.script {
            PortalScript::Online(ip) => Ok(LoginStatus::online(*ip)),
            PortalScript::Offline(ip) => Ok(LoginStatus::offline(ip.map(String::from))),
            PortalScript::Flaky { failures, ip } => {
                if call <= *failures {
                    Err(Error::transient("connection reset by peer"))
                } else {
                    Ok(LoginStatus::offline(Some(ip.to_string())))
                }
            }
            PortalScript::Unreachable => Err(Error::transient("connection timed out")),
            PortalScript::Rejects(_) => Ok(LoginStatus::offline(Some("10.0.0.7".into()))),
            PortalScript::Panics => panic!("portal exploded for {}", self.username),
        }
    }

    async fn login(&self, ip: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .login_ips
            .entry(self.username.clone())
            .or_default()
            .push(ip.to_string());

        match &self.script {
            PortalScript::Rejects(message) => Err(Error::protocol(*message)),
            _ => Ok(()),
        }
    }

    async fn detect_ip(&self) -> Result<Option<String>> {
        self.log.lock().unwrap().detect_calls += 1;
        Ok(self.detected_ip.map(String::from))
    }
}

/// Sink recording every delivered event, optionally slowly
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sink taking `delay` per delivery
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Events recorded for one context, in delivery order
    pub fn events_for(&self, context: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.context == context)
            .collect()
    }

    pub fn count(&self, kind: EventKind, category: Category) -> usize {
        self.events()
            .iter()
            .filter(|e| e.kind == kind && e.category == category)
            .count()
    }
}

#[async_trait]
impl WebhookSink for RecordingSink {
    async fn deliver(&self, event: &Event) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Sink failing every delivery
#[derive(Default)]
pub struct FailingSink {
    attempts: AtomicUsize,
}

impl FailingSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookSink for FailingSink {
    async fn deliver(&self, _event: &Event) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::delivery("webhook returned 503"))
    }
}

/// DNS provider counting update calls
#[derive(Default)]
pub struct CountingDnsProvider {
    updates: Mutex<Vec<DnsUpdateRequest>>,
    fail: bool,
}

impl CountingDnsProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            updates: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn updated_ips(&self) -> Vec<String> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.ip.clone())
            .collect()
    }
}

#[async_trait]
impl DnsProvider for CountingDnsProvider {
    async fn update(&self, _client: &reqwest::Client, request: &DnsUpdateRequest) -> Result<()> {
        self.updates.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(Error::delivery("provider rejected the record"));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "counting"
    }
}

/// Workflow over `portal` delivering into `sink`
pub fn workflow(portal: &MockPortalFactory, sink: Arc<dyn WebhookSink>) -> LoginWorkflow {
    LoginWorkflow::new(Arc::new(portal.clone()), EventQueue::new(sink))
}

/// DDNS settings for a test record
pub fn ddns_config(domain: &str) -> srun_core::config::DdnsConfig {
    srun_core::config::DdnsConfig {
        enable: true,
        provider: "counting".into(),
        domain: domain.into(),
        ttl: 600,
        config: serde_json::json!({}),
    }
}

/// Kinds of the events recorded for one context
pub fn kinds(events: &[Event]) -> Vec<(EventKind, Category)> {
    events.iter().map(|e| (e.kind, e.category)).collect()
}

/// Poll `ready` until it holds, giving up after five seconds
pub async fn wait_until(mut ready: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !ready() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
