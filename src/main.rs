//! SQL Guard entry point.
//!
//! - `check`: validate a statement and print the transaction-wrapped script
//! - `run`: validate, approve and execute a statement against the environment
//!   mapped from the current branch
//!
//! Logs go to stderr; stdout carries only the script, plan or report.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sql_guard::approval::{Approver, PreApproved, PromptApproval};
use sql_guard::executor::PsqlInvoker;
use sql_guard::pipeline::{Pipeline, RunRequest};
use sql_guard::{Config, GuardError, GuardResult, SqlGuard};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sql-guard")]
#[command(version, about = "Validate and run ad-hoc SQL against client databases", long_about = None)]
struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
struct SqlSource {
    /// SQL statement (read from stdin when omitted)
    sql: Option<String>,

    /// Read the SQL statement from a file
    #[arg(long, short, conflicts_with = "sql")]
    file: Option<PathBuf>,
}

impl SqlSource {
    fn reads_stdin(&self) -> bool {
        self.sql.is_none() && self.file.is_none()
    }

    fn read(&self) -> Result<String> {
        if let Some(sql) = &self.sql {
            return Ok(sql.clone());
        }
        if let Some(path) = &self.file {
            return std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read SQL from {}", path.display()));
        }
        let mut sql = String::new();
        std::io::stdin()
            .read_to_string(&mut sql)
            .context("Failed to read SQL from stdin")?;
        Ok(sql)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a statement and print the wrapped script
    Check {
        #[command(flatten)]
        source: SqlSource,
    },

    /// Validate and execute a statement against the branch's environment
    Run {
        /// Client selector, substituted into the host template
        #[arg(long, env = "SQLGUARD_CLIENT")]
        client: String,

        /// Target database name
        #[arg(long, env = "SQLGUARD_DATABASE")]
        database: String,

        /// Branch the run was triggered from
        #[arg(long, env = "SQLGUARD_BRANCH")]
        branch: String,

        #[command(flatten)]
        source: SqlSource,

        /// Validate and resolve the target without executing
        #[arg(long)]
        dry_run: bool,

        /// Approver recorded by the CI input step (needed for prod)
        #[arg(long, env = "SQLGUARD_APPROVED_BY", conflicts_with = "prompt")]
        approved_by: Option<String>,

        /// Ask for production approval on the terminal
        #[arg(long)]
        prompt: bool,

        /// Database port (overrides SQLGUARD_DB_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging to stderr (stdout is reserved for output)
    init_logging();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            let guard_error = e.downcast_ref::<GuardError>();
            eprintln!("error: {:#}", e);
            if let Some(hint) = guard_error.and_then(GuardError::suggestion) {
                eprintln!("hint: {}", hint);
            }
            let code = guard_error.map(GuardError::exit_code).unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Check { source } => {
            let sql = source.read()?;
            let guard = SqlGuard::new(Config::policy_from_env()?)?;
            let result = guard.validate(&sql);
            print_check(&result, cli.format)?;
            Ok(if result.is_accepted() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Commands::Run {
            client,
            database,
            branch,
            source,
            dry_run,
            approved_by,
            prompt,
            port,
        } => {
            if prompt && source.reads_stdin() {
                return Err(GuardError::config(
                    "--prompt reads the answer from stdin; pass the SQL as an argument or with --file",
                )
                .into());
            }
            let mut config = Config::from_env()?;
            if let Some(port) = port {
                config.targets.port = port;
            }

            let request = RunRequest {
                client,
                database,
                branch,
                sql: source.read()?,
            };
            let approver = if prompt {
                Approver::Prompt(PromptApproval)
            } else {
                Approver::PreApproved(PreApproved::new(approved_by))
            };
            let invoker =
                PsqlInvoker::new(&config.client.psql_binary, config.client.execution_timeout);
            let pipeline = Pipeline::new(config, approver, invoker)?;

            if dry_run {
                let plan = pipeline.plan(&request)?;
                match cli.format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
                    OutputFormat::Text => {
                        eprintln!(
                            "Plan {}: {} on {}:{}/{} ({}{})",
                            plan.run_id,
                            plan.leading_verb,
                            plan.host,
                            plan.port,
                            plan.database,
                            plan.environment,
                            if plan.requires_approval {
                                ", approval required"
                            } else {
                                ""
                            }
                        );
                        print!("{}", plan.script);
                    }
                }
                return Ok(ExitCode::SUCCESS);
            }

            let report = pipeline.run(&request).await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => println!(
                    "Run {} succeeded: {} on {}/{} ({}), approved by {}, {}ms",
                    report.run_id,
                    report.leading_verb,
                    report.host,
                    report.database,
                    report.environment,
                    report.approved_by,
                    report.duration_ms
                ),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_check(result: &GuardResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result.report())?),
        OutputFormat::Text => match result {
            GuardResult::Accepted { script, .. } => print!("{}", script),
            GuardResult::Rejected(violation) => eprintln!("error: {}", violation),
        },
    }
    Ok(())
}

/// Initialize tracing subscriber with stderr output.
fn init_logging() {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("warn,sql_guard=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
