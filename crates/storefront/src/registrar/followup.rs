//! Follow-up queue for post-registration registrar commands.
//!
//! Nameservers, email forwarding and privacy are configured after a domain
//! is registered. Checkout hands these commands to a [`FollowUpQueue`] and
//! moves on. A single worker executes them in submission order, retrying
//! each with exponential backoff. Commands that still fail after
//! `max_attempts` are parked in a reconciliation ledger until
//! [`FollowUpQueue::reconcile`] re-queues them.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use chainmart_core::EmailForwarding;

use super::client::RegistrarClient;
use super::wire::CommandResponse;

/// A registrar command that runs after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum FollowUpCommand {
    SetNameservers {
        domain: String,
        nameservers: Vec<String>,
    },
    SetEmailForwarding {
        domain: String,
        forwarding: EmailForwarding,
    },
    SetPrivacy {
        domain: String,
        enabled: bool,
    },
}

impl FollowUpCommand {
    /// Domain the command applies to.
    #[must_use]
    pub fn domain(&self) -> &str {
        match self {
            Self::SetNameservers { domain, .. }
            | Self::SetEmailForwarding { domain, .. }
            | Self::SetPrivacy { domain, .. } => domain,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetNameservers { .. } => "set_nameservers",
            Self::SetEmailForwarding { .. } => "set_email_forwarding",
            Self::SetPrivacy { .. } => "set_privacy",
        }
    }

    async fn execute(&self, client: &RegistrarClient) -> CommandResponse {
        match self {
            Self::SetNameservers {
                domain,
                nameservers,
            } => client.set_nameservers(domain, nameservers).await,
            Self::SetEmailForwarding { domain, forwarding } => {
                client.set_email_forwarding(domain, forwarding).await
            }
            Self::SetPrivacy { domain, enabled } => client.set_privacy(domain, *enabled).await,
        }
    }
}

/// A command that exhausted its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationEntry {
    pub command: FollowUpCommand,
    pub attempts: u32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

/// Retry settings for the follow-up worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpConfig {
    /// Attempts per command before it is parked, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on every further retry.
    pub initial_backoff: Duration,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(2),
        }
    }
}

/// Handle to the follow-up worker.
///
/// Cheap to clone; every clone feeds the same worker and ledger.
#[derive(Clone)]
pub struct FollowUpQueue {
    sender: mpsc::UnboundedSender<FollowUpCommand>,
    ledger: Arc<Mutex<Vec<ReconciliationEntry>>>,
    outstanding: Arc<watch::Sender<usize>>,
}

impl FollowUpQueue {
    /// Start the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(client: RegistrarClient, config: FollowUpConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (outstanding, _) = watch::channel(0_usize);
        let queue = Self {
            sender,
            ledger: Arc::new(Mutex::new(Vec::new())),
            outstanding: Arc::new(outstanding),
        };

        let worker = Worker {
            client,
            config,
            ledger: Arc::clone(&queue.ledger),
            outstanding: Arc::clone(&queue.outstanding),
        };
        tokio::spawn(worker.run(receiver));
        queue
    }

    /// Queue a command. Returns immediately.
    pub fn dispatch(&self, command: FollowUpCommand) {
        self.outstanding.send_modify(|count| *count += 1);
        debug!(command = command.name(), domain = command.domain(), "Follow-up queued");

        if let Err(mpsc::error::SendError(command)) = self.sender.send(command) {
            warn!(
                command = command.name(),
                domain = command.domain(),
                "Follow-up worker stopped, parking command"
            );
            park(&self.ledger, command, 0, "follow-up worker stopped".to_owned());
            self.outstanding.send_modify(|count| *count = count.saturating_sub(1));
        }
    }

    /// Commands that exhausted their attempts, oldest first.
    #[must_use]
    pub fn pending_reconciliation(&self) -> Vec<ReconciliationEntry> {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-queue every parked command. Returns how many were re-queued.
    pub fn reconcile(&self) -> usize {
        let parked = std::mem::take(
            &mut *self.ledger.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let count = parked.len();
        for entry in parked {
            self.dispatch(entry.command);
        }
        if count > 0 {
            info!(count, "Re-queued parked follow-up commands");
        }
        count
    }

    /// Resolve once every dispatched command has succeeded or been parked.
    pub async fn wait_idle(&self) {
        let mut receiver = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|count| *count == 0).await;
    }
}

struct Worker {
    client: RegistrarClient,
    config: FollowUpConfig,
    ledger: Arc<Mutex<Vec<ReconciliationEntry>>>,
    outstanding: Arc<watch::Sender<usize>>,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<FollowUpCommand>) {
        while let Some(command) = receiver.recv().await {
            self.deliver(command).await;
            self.outstanding
                .send_modify(|count| *count = count.saturating_sub(1));
        }
        debug!("Follow-up worker stopped");
    }

    #[instrument(skip_all, fields(command = command.name(), domain = command.domain()))]
    async fn deliver(&self, command: FollowUpCommand) {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let response = command.execute(&self.client).await;
            if response.success {
                info!(attempt, "Follow-up command applied");
                return;
            }

            last_error = response
                .error
                .unwrap_or_else(|| "unknown registrar error".to_owned());
            debug!(attempt, error = %last_error, "Follow-up attempt failed");

            if attempt < max_attempts {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        warn!(
            attempts = max_attempts,
            error = %last_error,
            "Follow-up command failed, parked for reconciliation"
        );
        park(&self.ledger, command, max_attempts, last_error);
    }
}

fn park(
    ledger: &Mutex<Vec<ReconciliationEntry>>,
    command: FollowUpCommand,
    attempts: u32,
    last_error: String,
) {
    ledger
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(ReconciliationEntry {
            command,
            attempts,
            last_error,
            failed_at: Utc::now(),
        });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::registrar::{DegradedModePolicy, RegistrarError, RegistrarTransport};

    /// Fails the first `failures` calls, then answers OK. Records commands.
    struct FlakyTransport {
        failures: StdMutex<usize>,
        commands: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl RegistrarTransport for FlakyTransport {
        async fn get(&self, params: &[(String, String)]) -> Result<String, RegistrarError> {
            let command = params
                .iter()
                .find(|(key, _)| key == "command")
                .map(|(_, value)| value.clone())
                .unwrap_or_default();
            self.commands.lock().unwrap().push(command);

            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(RegistrarError::Unavailable("timeout".to_owned()));
            }
            Ok(r#"{"CommandResponse":{"ResponseCode":"0"}}"#.to_owned())
        }
    }

    fn queue(failures: usize, max_attempts: u32) -> (FollowUpQueue, Arc<FlakyTransport>) {
        let transport = Arc::new(FlakyTransport {
            failures: StdMutex::new(failures),
            commands: StdMutex::new(Vec::new()),
        });
        let client = RegistrarClient::new(transport.clone(), DegradedModePolicy::lenient());
        let queue = FollowUpQueue::spawn(
            client,
            FollowUpConfig {
                max_attempts,
                initial_backoff: Duration::from_millis(1),
            },
        );
        (queue, transport)
    }

    fn privacy(domain: &str) -> FollowUpCommand {
        FollowUpCommand::SetPrivacy {
            domain: domain.to_owned(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_commands_run_in_submission_order() {
        let (queue, transport) = queue(0, 3);
        queue.dispatch(FollowUpCommand::SetNameservers {
            domain: "example.io".to_owned(),
            nameservers: vec!["ns1.host.net".to_owned(), "ns2.host.net".to_owned()],
        });
        queue.dispatch(privacy("example.io"));
        queue.wait_idle().await;

        assert_eq!(
            *transport.commands.lock().unwrap(),
            ["set_ns", "set_privacy"]
        );
        assert!(queue.pending_reconciliation().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let (queue, transport) = queue(2, 3);
        queue.dispatch(privacy("example.io"));
        queue.wait_idle().await;

        assert_eq!(transport.commands.lock().unwrap().len(), 3);
        assert!(queue.pending_reconciliation().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_command_is_parked_and_reconciled() {
        let (queue, transport) = queue(3, 3);
        queue.dispatch(privacy("example.io"));
        queue.wait_idle().await;

        let parked = queue.pending_reconciliation();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].attempts, 3);
        assert_eq!(parked[0].command, privacy("example.io"));
        assert!(parked[0].last_error.contains("timeout"));

        assert_eq!(queue.reconcile(), 1);
        queue.wait_idle().await;
        assert!(queue.pending_reconciliation().is_empty());
        assert_eq!(transport.commands.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_wait_idle_with_nothing_queued() {
        let (queue, _) = queue(0, 1);
        queue.wait_idle().await;
    }
}
