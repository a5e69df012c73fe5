//! One ad-hoc SQL run, start to finish.
//!
//! Resolve environment and host, validate the statement, get approval where
//! required, then hand the wrapped script to the database client. The script
//! file never outlives [`Pipeline::run`]. Nothing is retried.

use crate::approval::{ApprovalDecision, ApprovalGate, ApprovalRequest, AutoApprove};
use crate::config::{Config, TargetConfig};
use crate::constants::LOG_STATEMENT_TRUNCATE_LENGTH;
use crate::environment::{validate_selector, Environment};
use crate::error::GuardError;
use crate::executor::{Credentials, Invocation, ProcessInvoker, ScriptFile};
use crate::guard::{LeadingVerb, SqlGuard};
use crate::telemetry::{truncate_for_log, RunContext};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Build parameters of a run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Client selector, substituted into the host template
    pub client: String,
    /// Target database name
    pub database: String,
    /// Branch the run was triggered from
    pub branch: String,
    /// Free-text SQL command
    pub sql: String,
}

/// Validated run, ready for approval and execution.
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub run_id: String,
    pub environment: Environment,
    pub client: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub leading_verb: LeadingVerb,
    pub requires_approval: bool,
    pub script: String,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub environment: Environment,
    pub client: String,
    pub host: String,
    pub database: String,
    pub leading_verb: LeadingVerb,
    pub approved_by: String,
    pub exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Sequences a run over an approval gate and a process invoker.
pub struct Pipeline<A, P> {
    guard: SqlGuard,
    targets: TargetConfig,
    username: Option<String>,
    password: Option<String>,
    script_dir: PathBuf,
    approval_timeout: Duration,
    approval: A,
    invoker: P,
}

impl<A, P> Pipeline<A, P>
where
    A: ApprovalGate,
    P: ProcessInvoker,
{
    /// Create a pipeline from configuration and its collaborators.
    pub fn new(config: Config, approval: A, invoker: P) -> Result<Self, GuardError> {
        Ok(Self {
            guard: SqlGuard::new(config.policy)?,
            targets: config.targets,
            username: config.client.username,
            password: config.client.password,
            script_dir: config.client.script_dir,
            approval_timeout: config.client.approval_timeout,
            approval,
            invoker,
        })
    }

    pub fn guard(&self) -> &SqlGuard {
        &self.guard
    }

    pub fn invoker(&self) -> &P {
        &self.invoker
    }

    /// Resolve the target and validate the statement without running anything.
    pub fn plan(&self, request: &RunRequest) -> Result<RunPlan, GuardError> {
        self.plan_with_context(request).map(|(_, plan)| plan)
    }

    fn plan_with_context(&self, request: &RunRequest) -> Result<(RunContext, RunPlan), GuardError> {
        let ctx = RunContext::new().with_client(&request.client);

        let environment = self.targets.branches.resolve(&request.branch)?;
        let ctx = ctx.with_environment(environment.as_str());
        let host = self.targets.hosts.host_for(environment, &request.client)?;
        validate_selector("database", &request.database)?;

        let (sql_request, script) = match self.guard.validate(&request.sql).into_result() {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(
                    "{} Statement rejected: {} ({})",
                    ctx.log_prefix(),
                    e,
                    truncate_for_log(request.sql.trim(), LOG_STATEMENT_TRUNCATE_LENGTH)
                );
                return Err(e);
            }
        };

        info!(
            "{} {} on {}/{} validated",
            ctx.log_prefix(),
            sql_request.leading_verb,
            host,
            request.database
        );

        let plan = RunPlan {
            run_id: ctx.run_id.clone(),
            environment,
            client: request.client.clone(),
            host,
            port: self.targets.port,
            database: request.database.clone(),
            leading_verb: sql_request.leading_verb,
            requires_approval: environment.requires_approval(),
            script: script.into_string(),
        };
        Ok((ctx, plan))
    }

    /// Credentials injected by the secret store; both must be present and non-empty.
    fn credentials(&self) -> Result<Credentials, GuardError> {
        let username = self
            .username
            .clone()
            .ok_or_else(|| GuardError::precondition("Database username not provided (SQLGUARD_DB_USER)"))?;
        let password = self
            .password
            .clone()
            .ok_or_else(|| GuardError::precondition("Database password not provided (SQLGUARD_DB_PASSWORD)"))?;
        Credentials::new(username, password)
    }

    /// Ask for approval, bounded by the approval timeout.
    async fn await_approval(&self, ctx: &RunContext, plan: &RunPlan) -> Result<String, GuardError> {
        let request = ApprovalRequest {
            run_id: plan.run_id.clone(),
            environment: plan.environment,
            client: plan.client.clone(),
            database: plan.database.clone(),
            host: plan.host.clone(),
            script: plan.script.clone(),
        };

        let decision = if plan.requires_approval {
            info!(
                "{} Waiting up to {}s for approval",
                ctx.log_prefix(),
                self.approval_timeout.as_secs()
            );
            tokio::time::timeout(self.approval_timeout, self.approval.approve(&request))
                .await
                .map_err(|_| GuardError::ApprovalTimedOut {
                    timeout_seconds: self.approval_timeout.as_secs(),
                })?
        } else {
            AutoApprove.approve(&request).await
        };

        match decision {
            ApprovalDecision::Approved { approver } => Ok(approver),
            ApprovalDecision::Denied { reason } => {
                warn!("{} Approval denied: {}", ctx.log_prefix(), reason);
                Err(GuardError::approval_denied(reason))
            }
        }
    }

    /// Execute a run.
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, GuardError> {
        let (ctx, plan) = self.plan_with_context(request)?;
        let credentials = self.credentials()?;
        let approved_by = self.await_approval(&ctx, &plan).await?;

        let script = ScriptFile::create(&self.script_dir, &plan.run_id, &plan.script)?;
        let invocation = Invocation {
            script_path: script.path().to_path_buf(),
            host: plan.host.clone(),
            port: plan.port,
            database: plan.database.clone(),
            credentials,
        };

        let outcome = self.invoker.invoke(&invocation).await;
        drop(script);
        let exit_code = outcome?;

        if exit_code != 0 {
            error!(
                "{} Database client exited with code {}",
                ctx.log_prefix(),
                exit_code
            );
            return Err(GuardError::Execution { exit_code });
        }

        let elapsed = ctx.elapsed();
        info!(
            "{} Completed in {}ms",
            ctx.log_prefix(),
            elapsed.as_millis()
        );

        Ok(RunReport {
            run_id: plan.run_id,
            environment: plan.environment,
            client: plan.client,
            host: plan.host,
            database: plan.database,
            leading_verb: plan.leading_verb,
            approved_by,
            exit_code,
            started_at: ctx.started_at,
            finished_at: Utc::now(),
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}
