//! Interactive approval gating for secret access.
//!
//! Every secret-touching request must pass through a human yes/no before
//! the vault is read or written. The UI is not specified here -
//! [`ApprovalBroker`] is a capability injected into the access server. The
//! [`ApprovalGate`] wrapper adds the two contractual behaviors: at most
//! one pending prompt at a time, and an `access` log entry for every
//! resolution with the full key list.

use std::io::Write;
use std::sync::Arc;

use coffret_vault::EventLogger;

/// What the requester wants to do with the keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessAction {
    /// Read secret values.
    Read,
    /// Create or replace a secret value.
    Write,
}

impl AccessAction {
    /// Lowercase name for prompts and log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Outcome of one approval prompt.
#[derive(Debug, Clone)]
pub struct ApprovalDecision {
    /// Whether the user approved.
    pub approved: bool,
    /// Denial reason (`None` on approval).
    pub reason: Option<String>,
}

impl ApprovalDecision {
    /// An explicit approval.
    #[must_use]
    pub const fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    /// A denial with a reason.
    #[must_use]
    pub fn deny(reason: &str) -> Self {
        Self {
            approved: false,
            reason: Some(reason.to_string()),
        }
    }
}

/// The approval capability. Implementations present one synchronous
/// decision to the user; a closed or failed dialog counts as denial.
pub trait ApprovalBroker: Send + Sync {
    /// Ask the user to approve `action` over `keys` in `project`.
    fn request_approval(
        &self,
        project: &str,
        keys: &[String],
        action: AccessAction,
    ) -> ApprovalDecision;
}

// ---------------------------------------------------------------------------
// Terminal broker
// ---------------------------------------------------------------------------

/// y/n prompt on the controlling terminal, for the headless daemon.
pub struct TerminalApproval;

impl ApprovalBroker for TerminalApproval {
    fn request_approval(
        &self,
        project: &str,
        keys: &[String],
        action: AccessAction,
    ) -> ApprovalDecision {
        let mut stderr = std::io::stderr();
        let prompt = format!(
            "\nAllow {} access to '{}' ({})? [y/N] ",
            action.as_str(),
            project,
            keys.join(", ")
        );
        if stderr.write_all(prompt.as_bytes()).is_err() || stderr.flush().is_err() {
            return ApprovalDecision::deny("Approval prompt unavailable");
        }

        let mut answer = String::new();
        match std::io::stdin().read_line(&mut answer) {
            Ok(0) => ApprovalDecision::deny("User denied"),
            Ok(_) if answer.trim().eq_ignore_ascii_case("y") => ApprovalDecision::approve(),
            Ok(_) => ApprovalDecision::deny("User denied"),
            Err(_) => ApprovalDecision::deny("Approval prompt unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Serializes prompts and records every resolution in the event log.
pub struct ApprovalGate {
    broker: Arc<dyn ApprovalBroker>,
    logger: Arc<EventLogger>,
    pending: tokio::sync::Mutex<()>,
}

impl ApprovalGate {
    /// Wrap a broker and the event logger.
    #[must_use]
    pub fn new(broker: Arc<dyn ApprovalBroker>, logger: Arc<EventLogger>) -> Self {
        Self {
            broker,
            logger,
            pending: tokio::sync::Mutex::new(()),
        }
    }

    /// Obtain approval for `action` over `keys`, or the denial message.
    ///
    /// An empty key set skips the prompt entirely and approves. The
    /// blocking prompt runs off the async runtime; only one prompt can be
    /// pending at a time, so concurrent requests queue here.
    ///
    /// # Errors
    ///
    /// Returns the user-facing denial message (already logged).
    pub async fn confirm(
        &self,
        project: &str,
        keys: &[String],
        action: AccessAction,
    ) -> Result<(), String> {
        if keys.is_empty() {
            return Ok(());
        }

        let _pending = self.pending.lock().await;

        let broker = Arc::clone(&self.broker);
        let project_owned = project.to_string();
        let keys_owned = keys.to_vec();
        let decision = tokio::task::spawn_blocking(move || {
            broker.request_approval(&project_owned, &keys_owned, action)
        })
        .await
        .unwrap_or_else(|_| ApprovalDecision::deny("Approval dialog failed"));

        if decision.approved {
            self.logger.log_access(
                &format!("Access granted ({})", action.as_str()),
                project,
                keys,
            );
            Ok(())
        } else {
            let reason = decision.reason.unwrap_or_else(|| "User denied".to_string());
            let message = format!("Access denied: {reason}");
            self.logger.log_access(&message, project, keys);
            Err(message)
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use coffret_crypto_core::SecretBytes;
    use coffret_vault::LogCategory;
    use tempfile::TempDir;

    struct AllowAll;
    impl ApprovalBroker for AllowAll {
        fn request_approval(&self, _: &str, _: &[String], _: AccessAction) -> ApprovalDecision {
            ApprovalDecision::approve()
        }
    }

    struct DenyAll;
    impl ApprovalBroker for DenyAll {
        fn request_approval(&self, _: &str, _: &[String], _: AccessAction) -> ApprovalDecision {
            ApprovalDecision::deny("User denied")
        }
    }

    fn keyed_logger(dir: &TempDir) -> Arc<EventLogger> {
        let logger = Arc::new(EventLogger::new(dir.path()));
        logger.set_encryption_key(SecretBytes::new([0x07; 32]));
        logger
    }

    #[tokio::test]
    async fn approval_is_logged_with_keys() {
        let dir = TempDir::new().expect("tempdir");
        let logger = keyed_logger(&dir);
        let gate = ApprovalGate::new(Arc::new(AllowAll), Arc::clone(&logger));

        gate.confirm("app", &["K".into(), "K2".into()], AccessAction::Read)
            .await
            .expect("approval should succeed");

        let logs = logger.get_filtered_logs(Some(LogCategory::Access), 10);
        assert_eq!(logs.len(), 1);
        assert!(logs[0].message.contains("Access granted (read)"));
        assert!(logs[0].message.contains("K, K2"));
    }

    #[tokio::test]
    async fn denial_returns_reason_and_logs() {
        let dir = TempDir::new().expect("tempdir");
        let logger = keyed_logger(&dir);
        let gate = ApprovalGate::new(Arc::new(DenyAll), Arc::clone(&logger));

        let err = gate
            .confirm("app", &["K".into()], AccessAction::Write)
            .await
            .expect_err("denial expected");
        assert_eq!(err, "Access denied: User denied");

        let logs = logger.get_filtered_logs(Some(LogCategory::Access), 10);
        assert!(logs[0].message.contains("Access denied"));
        assert!(logs[0].message.contains("app"));
        assert!(logs[0].message.contains('K'));
    }

    #[tokio::test]
    async fn empty_key_set_skips_prompt() {
        let dir = TempDir::new().expect("tempdir");
        let logger = keyed_logger(&dir);
        // DenyAll would refuse, but an empty set never reaches it.
        let gate = ApprovalGate::new(Arc::new(DenyAll), Arc::clone(&logger));

        gate.confirm("app", &[], AccessAction::Read)
            .await
            .expect("empty set should auto-approve");
        assert!(logger
            .get_filtered_logs(Some(LogCategory::Access), 10)
            .is_empty());
    }

    #[tokio::test]
    async fn prompts_serialize_one_at_a_time() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counting {
            active: AtomicUsize,
            max_seen: AtomicUsize,
        }
        impl ApprovalBroker for Counting {
            fn request_approval(
                &self,
                _: &str,
                _: &[String],
                _: AccessAction,
            ) -> ApprovalDecision {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(50));
                self.active.fetch_sub(1, Ordering::SeqCst);
                ApprovalDecision::approve()
            }
        }

        let dir = TempDir::new().expect("tempdir");
        let logger = keyed_logger(&dir);
        let broker = Arc::new(Counting {
            active: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        });
        let gate = Arc::new(ApprovalGate::new(
            Arc::clone(&broker) as Arc<dyn ApprovalBroker>,
            logger,
        ));

        let mut tasks = Vec::new();
        for i in 0..4 {
            let gate = Arc::clone(&gate);
            tasks.push(tokio::spawn(async move {
                gate.confirm("app", &[format!("K{i}")], AccessAction::Read)
                    .await
            }));
        }
        for task in tasks {
            task.await.expect("join").expect("approve");
        }

        assert_eq!(broker.max_seen.load(Ordering::SeqCst), 1);
    }
}
