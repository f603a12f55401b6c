// # Guardian
//
// Keeps every configured account authenticated.
//
// ## Guardian Mode
//
// [`Guardian::run`] spawns one monitor task per account. Each monitor runs
// the supervised login, then sleeps for the guardian interval, until the
// cancellation token fires. Monitors are independent: a failing or
// panicking account never stops the others.
//
// ## Single Pass
//
// [`login_all`] runs every account once, in configuration order, and
// reports which succeeded.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Account;
use crate::error::Error;
use crate::login::LoginWorkflow;

/// Supervisor running one monitor per account
#[derive(Debug, Clone)]
pub struct Guardian {
    workflow: Arc<LoginWorkflow>,
    interval: Duration,
}

impl Guardian {
    pub fn new(workflow: Arc<LoginWorkflow>, interval: Duration) -> Self {
        Self { workflow, interval }
    }

    /// Time between two login checks of the same account
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Supervise `accounts` until `cancel` fires
    ///
    /// Returns once every monitor has stopped. A login in flight when the
    /// token fires is allowed to finish so its lifecycle events stay paired.
    pub async fn run(&self, accounts: Vec<Arc<Account>>, cancel: CancellationToken) {
        if accounts.is_empty() {
            warn!("No accounts configured, guardian has nothing to supervise");
            return;
        }

        info!(
            accounts = accounts.len(),
            interval_secs = self.interval.as_secs(),
            "Guardian started"
        );

        let mut monitors = JoinSet::new();
        for account in accounts {
            let workflow = Arc::clone(&self.workflow);
            let token = cancel.child_token();
            let interval = self.interval;
            monitors.spawn(async move {
                monitor(workflow, Arc::clone(&account), interval, token).await;
                account
            });
        }

        while let Some(joined) = monitors.join_next().await {
            match joined {
                Ok(account) => debug!(username = %account.username, "Monitor stopped"),
                Err(e) if e.is_panic() => error!("Monitor task panicked: {}", e),
                Err(e) => warn!("Monitor task aborted: {}", e),
            }
        }

        info!("Guardian stopped");
    }
}

async fn monitor(
    workflow: Arc<LoginWorkflow>,
    account: Arc<Account>,
    interval: Duration,
    cancel: CancellationToken,
) {
    debug!(username = %account.username, "Monitor started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // Outcome is already logged and reported as events
        let _ = workflow.run(&account, &cancel).await;

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
}

/// Outcome of a single pass over all accounts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Usernames that ended online
    pub succeeded: Vec<String>,
    /// Usernames that failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl PassReport {
    /// Whether every account succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run the supervised login once for each account, in order
pub async fn login_all(
    workflow: &LoginWorkflow,
    accounts: &[Account],
    cancel: &CancellationToken,
) -> PassReport {
    let mut report = PassReport::default();

    for account in accounts {
        if cancel.is_cancelled() {
            report
                .failed
                .push((account.username.clone(), Error::Cancelled.to_string()));
            continue;
        }

        match workflow.run(account, cancel).await {
            Ok(()) => report.succeeded.push(account.username.clone()),
            Err(e) => report.failed.push((account.username.clone(), e.to_string())),
        }
    }

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "Login pass complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_success() {
        assert!(PassReport::default().all_succeeded());
    }

    #[test]
    fn report_with_failure_is_not_success() {
        let report = PassReport {
            succeeded: vec!["alice".into()],
            failed: vec![("bob".into(), "Portal error: bad password".into())],
        };
        assert!(!report.all_succeeded());
    }
}
