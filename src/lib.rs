//! # SQL Guard
//!
//! Validates ad-hoc SQL submitted through CI and runs it against client
//! PostgreSQL databases inside a transaction.
//!
//! This crate provides:
//! - **Guard**: a pure validator that allow-lists leading verbs, blocks
//!   forbidden keywords and wraps accepted statements in `BEGIN`/`COMMIT`
//!   with a pre-flight `SELECT COUNT(*)` for `DELETE`/`UPDATE`
//! - **Environment mapping**: branch → `dev`/`stage`/`prod` → host
//! - **Approval**: a bounded approval gate for production runs
//! - **Executor**: `psql` invocation over a self-deleting script file
//!
//! ## Architecture
//!
//! [`guard::SqlGuard`] holds all of the decision logic and has no side
//! effects. [`pipeline::Pipeline`] is glue around injected collaborators
//! ([`approval::ApprovalGate`], [`executor::ProcessInvoker`]) so the guard
//! never depends on a particular CI system.

pub mod approval;
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod executor;
pub mod guard;
pub mod pipeline;
pub mod telemetry;

pub use config::Config;
pub use error::GuardError;
pub use guard::{GuardPolicy, GuardResult, SqlGuard};
pub use pipeline::Pipeline;
