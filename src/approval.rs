//! Approval gate for protected environments.
//!
//! The pipeline asks the gate before running anything against an environment
//! that [`Environment::requires_approval`]. The wait is bounded by the caller.

use crate::environment::Environment;
use serde::Serialize;
use std::future::Future;
use std::io::{self, BufRead};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// What the approver is asked to sign off on.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    pub run_id: String,
    pub environment: Environment,
    pub client: String,
    pub database: String,
    pub host: String,
    pub script: String,
}

/// Outcome of an approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved { approver: String },
    Denied { reason: String },
}

/// Decides whether a protected run may proceed.
pub trait ApprovalGate {
    fn approve(&self, request: &ApprovalRequest) -> impl Future<Output = ApprovalDecision> + Send;
}

/// Approves everything. Used for environments without an approval requirement.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ApprovalGate for AutoApprove {
    async fn approve(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Approved {
            approver: "auto".to_string(),
        }
    }
}

/// Approval recorded before the run started, e.g. by a CI input step.
#[derive(Debug, Clone, Default)]
pub struct PreApproved {
    approver: Option<String>,
}

impl PreApproved {
    pub fn new(approver: Option<String>) -> Self {
        Self {
            approver: approver
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
        }
    }
}

impl ApprovalGate for PreApproved {
    async fn approve(&self, request: &ApprovalRequest) -> ApprovalDecision {
        match &self.approver {
            Some(approver) => {
                info!(
                    "[{}] Run against {} approved by {}",
                    request.run_id, request.environment, approver
                );
                ApprovalDecision::Approved {
                    approver: approver.clone(),
                }
            }
            None => ApprovalDecision::Denied {
                reason: format!(
                    "no approver recorded for {} (pass --approved-by)",
                    request.environment
                ),
            },
        }
    }
}

/// Asks on the terminal. Stdin must not carry the SQL in this mode.
#[derive(Debug, Clone, Default)]
pub struct PromptApproval;

impl ApprovalGate for PromptApproval {
    async fn approve(&self, request: &ApprovalRequest) -> ApprovalDecision {
        eprintln!(
            "About to run against {} ({} / {} on {}):\n{}",
            request.environment, request.client, request.database, request.host, request.script
        );
        eprint!("Type 'yes' to continue: ");

        match read_answer(|| std::io::stdin().lock()).await {
            Ok(answer) => decide(answer),
            Err(_) => ApprovalDecision::Denied {
                reason: "stdin reader stopped without an answer".to_string(),
            },
        }
    }
}

/// Read one line on a dedicated thread.
///
/// The thread is detached: if the caller stops waiting (approval timeout), a
/// read still blocked on the terminal does not keep the process alive.
fn read_answer<F, R>(open: F) -> oneshot::Receiver<io::Result<Option<String>>>
where
    F: FnOnce() -> R + Send + 'static,
    R: BufRead,
{
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let answer = open()
            .read_line(&mut line)
            .map(|n| (n > 0).then_some(line));
        let _ = tx.send(answer);
    });
    rx
}

fn decide(answer: io::Result<Option<String>>) -> ApprovalDecision {
    match answer {
        Ok(Some(answer)) if matches!(answer.trim().to_ascii_lowercase().as_str(), "yes" | "y") => {
            let approver = std::env::var("USER").unwrap_or_else(|_| "terminal".to_string());
            ApprovalDecision::Approved { approver }
        }
        Ok(Some(answer)) => ApprovalDecision::Denied {
            reason: format!("operator answered '{}'", answer.trim()),
        },
        Ok(None) => ApprovalDecision::Denied {
            reason: "no answer on stdin".to_string(),
        },
        Err(e) => {
            warn!("Failed to read approval answer: {}", e);
            ApprovalDecision::Denied {
                reason: format!("could not read answer: {}", e),
            }
        }
    }
}

/// Gate selected at runtime by the CLI.
#[derive(Debug, Clone)]
pub enum Approver {
    PreApproved(PreApproved),
    Prompt(PromptApproval),
}

impl ApprovalGate for Approver {
    async fn approve(&self, request: &ApprovalRequest) -> ApprovalDecision {
        match self {
            Approver::PreApproved(gate) => gate.approve(request).await,
            Approver::Prompt(gate) => gate.approve(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            run_id: "r1".into(),
            environment: Environment::Prod,
            client: "acme".into(),
            database: "billing".into(),
            host: "db.acme".into(),
            script: "BEGIN;\nCOMMIT;\n".into(),
        }
    }

    #[tokio::test]
    async fn test_auto_approve() {
        assert!(matches!(
            AutoApprove.approve(&request()).await,
            ApprovalDecision::Approved { .. }
        ));
    }

    #[tokio::test]
    async fn test_pre_approved() {
        let gate = PreApproved::new(Some("alice".into()));
        assert_eq!(
            gate.approve(&request()).await,
            ApprovalDecision::Approved {
                approver: "alice".into()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_approver_denied() {
        for gate in [PreApproved::new(None), PreApproved::new(Some("  ".into()))] {
            assert!(matches!(
                gate.approve(&request()).await,
                ApprovalDecision::Denied { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_prompt_answers() {
        let answer = read_answer(|| io::Cursor::new("Yes\n")).await.unwrap();
        assert!(matches!(decide(answer), ApprovalDecision::Approved { .. }));

        let answer = read_answer(|| io::Cursor::new("no\n")).await.unwrap();
        assert_eq!(
            decide(answer),
            ApprovalDecision::Denied {
                reason: "operator answered 'no'".into()
            }
        );

        let answer = read_answer(|| io::Cursor::new("")).await.unwrap();
        assert!(matches!(decide(answer), ApprovalDecision::Denied { .. }));
    }

    /// A terminal nobody types into.
    struct SilentTerminal;

    impl io::Read for SilentTerminal {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_secs(3600));
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_blocked_prompt_does_not_outlive_timeout() {
        let started = Instant::now();
        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            read_answer(|| io::BufReader::new(SilentTerminal)),
        )
        .await;
        assert!(waited.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_approver_enum_delegates() {
        let gate = Approver::PreApproved(PreApproved::new(None));
        assert!(matches!(
            gate.approve(&request()).await,
            ApprovalDecision::Denied { .. }
        ));
    }
}
