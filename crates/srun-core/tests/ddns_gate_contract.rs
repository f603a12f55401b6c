//! Contract Test: DDNS Gate
//!
//! Constraints verified:
//! - Repeated observations of the same IP trigger at most one provider call
//! - A changed IP triggers exactly one new call
//! - Provider failures are reported as their own event and never fail the login
//! - Accounts sharing a record share the gate
//!
//! If this test fails, someone has:
//! - Bypassed the gate on the online path
//! - Propagated a DNS error into the login result

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use srun_core::event::{Category, EventKind};
use srun_core::{Account, DdnsGate, DnsUpdater};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn unchanged_ip_updates_once() {
    let portal = MockPortalFactory::new().script("alice", PortalScript::Online("10.1.0.1"));
    let sink = RecordingSink::new();
    let provider = CountingDnsProvider::new();
    let workflow = workflow(&portal, sink.clone())
        .with_ddns(DnsUpdater::new(provider.clone(), &ddns_config("home.example.com")));
    let account = Account::new("alice", "pw");
    let cancel = CancellationToken::new();

    for _ in 0..4 {
        workflow.run(&account, &cancel).await.unwrap();
    }
    workflow.queue().close(Duration::from_secs(5)).await.unwrap();

    assert_eq!(provider.update_count(), 1);
    assert_eq!(sink.count(EventKind::ActionSuccess, Category::DnsUpdate), 1);

    let dns_event = sink
        .events()
        .into_iter()
        .find(|e| e.category == Category::DnsUpdate)
        .unwrap();
    assert_eq!(dns_event.context, "login_alice");
    assert_eq!(dns_event.property("domain"), Some("home.example.com"));
    assert_eq!(dns_event.message.as_deref(), Some("10.1.0.1"));
}

#[tokio::test]
async fn changed_ip_updates_again() {
    let provider = CountingDnsProvider::new();
    let gate = Arc::new(DdnsGate::new());
    let sink = RecordingSink::new();
    let cancel = CancellationToken::new();
    let account = Account::new("bob", "pw");

    for ip in ["10.1.0.2", "10.1.0.2", "10.1.0.3", "10.1.0.3"] {
        let portal = MockPortalFactory::new().script("bob", PortalScript::Online(ip));
        let updater = DnsUpdater::new(provider.clone(), &ddns_config("bob.example.com"))
            .with_gate(Arc::clone(&gate));
        let workflow = workflow(&portal, sink.clone()).with_ddns(updater);
        workflow.run(&account, &cancel).await.unwrap();
        workflow.queue().close(Duration::from_secs(5)).await.unwrap();
    }

    assert_eq!(provider.updated_ips(), vec!["10.1.0.2", "10.1.0.3"]);
}

#[tokio::test]
async fn provider_failure_does_not_fail_login() {
    let portal = MockPortalFactory::new().script("carol", PortalScript::Offline(Some("10.1.0.4")));
    let sink = RecordingSink::new();
    let provider = CountingDnsProvider::failing();
    let workflow = workflow(&portal, sink.clone())
        .with_ddns(DnsUpdater::new(provider.clone(), &ddns_config("carol.example.com")));

    let result = workflow
        .run(&Account::new("carol", "pw"), &CancellationToken::new())
        .await;
    assert!(result.is_ok());
    workflow.queue().close(Duration::from_secs(5)).await.unwrap();

    assert_eq!(
        kinds(&sink.events_for("login_carol")),
        vec![
            (EventKind::ProcessBegin, Category::Login),
            (EventKind::ActionFailure, Category::DnsUpdate),
            (EventKind::ActionSuccess, Category::Login),
            (EventKind::ProcessFinish, Category::Login),
        ]
    );
}

#[tokio::test]
async fn failed_login_never_updates_dns() {
    let portal = MockPortalFactory::new().script("dave", PortalScript::Rejects("bad password"));
    let sink = RecordingSink::new();
    let provider = CountingDnsProvider::new();
    let workflow = workflow(&portal, sink.clone())
        .with_ddns(DnsUpdater::new(provider.clone(), &ddns_config("dave.example.com")));

    let _ = workflow
        .run(&Account::new("dave", "pw"), &CancellationToken::new())
        .await;
    workflow.queue().close(Duration::from_secs(5)).await.unwrap();

    assert_eq!(provider.update_count(), 0);
}

#[tokio::test]
async fn accounts_sharing_a_record_trigger_one_update() {
    let portal = MockPortalFactory::new()
        .script("a", PortalScript::Online("10.1.0.9"))
        .script("b", PortalScript::Online("10.1.0.9"));
    let sink = RecordingSink::new();
    let provider = CountingDnsProvider::new();
    let workflow = Arc::new(
        workflow(&portal, sink.clone())
            .with_ddns(DnsUpdater::new(provider.clone(), &ddns_config("shared.example.com"))),
    );

    let runs: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|name| {
            let workflow = Arc::clone(&workflow);
            tokio::spawn(async move {
                workflow
                    .run(&Account::new(name, "pw"), &CancellationToken::new())
                    .await
            })
        })
        .collect();
    for run in runs {
        run.await.unwrap().unwrap();
    }
    workflow.queue().close(Duration::from_secs(5)).await.unwrap();

    assert_eq!(provider.update_count(), 1);
}
