//! Statement validation and safety-check generation.

use super::policy::{GuardPolicy, LeadingVerb};
use super::script::{strip_terminators, terminate, WrappedScript};
use crate::constants::LOG_STATEMENT_TRUNCATE_LENGTH;
use crate::error::GuardError;
use crate::telemetry::truncate_for_log;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Helper to compile a hardcoded regex with a clear message on failure.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern)
        .unwrap_or_else(|e| panic!("Internal error: invalid regex pattern '{}': {}", pattern, e))
}

static LEADING_VERB: Lazy<Regex> = Lazy::new(|| compile(r"(?i)^(SELECT|DELETE|UPDATE)\b"));

static FROM_KEYWORD: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bFROM\b"));

static WHERE_KEYWORD: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bWHERE\b"));

/// `UPDATE <target> SET`, target being everything up to the first `SET`.
static UPDATE_TARGET: Lazy<Regex> = Lazy::new(|| compile(r"(?is)^UPDATE\s+(.+?)\s+SET\b"));

/// A terminator followed by more text.
static STACKED_STATEMENT: Lazy<Regex> = Lazy::new(|| compile(r";\s*\S"));

/// Why a statement was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("empty statement")]
    Empty,

    #[error("statement exceeds maximum length of {max} bytes")]
    TooLong { max: usize },

    #[error("forbidden keyword(s): {}", .0.join(", "))]
    ForbiddenKeywords(Vec<String>),

    #[error("must start with {}", join_verbs(.allowed))]
    DisallowedVerb { allowed: Vec<LeadingVerb> },

    #[error("cannot locate FROM clause")]
    MissingFromClause,

    #[error("cannot locate UPDATE target table")]
    MissingUpdateTarget,

    #[error("multiple statements are not allowed")]
    StackedStatements,
}

/// Render `SELECT, DELETE, or UPDATE`.
fn join_verbs(verbs: &[LeadingVerb]) -> String {
    match verbs {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{} or {}", first, second),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(LeadingVerb::as_str).collect();
            format!("{}, or {}", head.join(", "), last)
        }
    }
}

/// A statement that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlRequest {
    /// Trimmed statement text
    pub statement: String,
    /// First keyword of the statement
    pub leading_verb: LeadingVerb,
}

/// Outcome status of a validation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardStatus {
    Accepted,
    Rejected,
}

/// Result of [`SqlGuard::validate`].
///
/// A rejection is an expected outcome, not a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardResult {
    Accepted {
        request: SqlRequest,
        script: WrappedScript,
    },
    Rejected(PolicyViolation),
}

impl GuardResult {
    pub fn status(&self) -> GuardStatus {
        match self {
            GuardResult::Accepted { .. } => GuardStatus::Accepted,
            GuardResult::Rejected(_) => GuardStatus::Rejected,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, GuardResult::Accepted { .. })
    }

    /// Rejection reason, populated only when rejected.
    pub fn reason(&self) -> Option<String> {
        self.violation().map(ToString::to_string)
    }

    pub fn violation(&self) -> Option<&PolicyViolation> {
        match self {
            GuardResult::Rejected(violation) => Some(violation),
            GuardResult::Accepted { .. } => None,
        }
    }

    /// Script to execute, populated only when accepted.
    pub fn wrapped_script(&self) -> Option<&str> {
        match self {
            GuardResult::Accepted { script, .. } => Some(script.as_str()),
            GuardResult::Rejected(_) => None,
        }
    }

    /// Convert into a `Result`, turning a rejection into a [`GuardError::Policy`].
    pub fn into_result(self) -> Result<(SqlRequest, WrappedScript), GuardError> {
        match self {
            GuardResult::Accepted { request, script } => Ok((request, script)),
            GuardResult::Rejected(violation) => Err(violation.into()),
        }
    }

    /// Serializable view for JSON output.
    pub fn report(&self) -> GuardReport<'_> {
        match self {
            GuardResult::Accepted { request, script } => GuardReport {
                status: GuardStatus::Accepted,
                reason: None,
                leading_verb: Some(request.leading_verb),
                safety_check: script.safety_check(),
                wrapped_script: Some(script.as_str()),
            },
            GuardResult::Rejected(violation) => GuardReport {
                status: GuardStatus::Rejected,
                reason: Some(violation.to_string()),
                leading_verb: None,
                safety_check: None,
                wrapped_script: None,
            },
        }
    }
}

/// JSON shape of a [`GuardResult`].
#[derive(Debug, Serialize)]
pub struct GuardReport<'a> {
    pub status: GuardStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leading_verb: Option<LeadingVerb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_check: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapped_script: Option<&'a str>,
}

/// Statement validator and script generator.
///
/// Immutable after construction and safe to share between threads.
#[derive(Debug, Clone)]
pub struct SqlGuard {
    policy: GuardPolicy,
    forbidden: Option<Regex>,
}

impl Default for SqlGuard {
    fn default() -> Self {
        // The default keyword list is plain words, so the pattern always compiles.
        let policy = GuardPolicy::default();
        let forbidden = build_keyword_pattern(policy.forbidden_keywords())
            .unwrap_or_else(|e| panic!("Internal error: default keyword pattern: {}", e));
        Self { policy, forbidden }
    }
}

impl SqlGuard {
    /// Create a guard for the given policy.
    pub fn new(policy: GuardPolicy) -> Result<Self, GuardError> {
        let forbidden = build_keyword_pattern(policy.forbidden_keywords())?;
        Ok(Self { policy, forbidden })
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Validate a statement and, if it may run, wrap it in a transaction.
    pub fn validate(&self, statement: &str) -> GuardResult {
        let result = self.check(statement);
        match &result {
            GuardResult::Accepted { request, .. } => debug!(
                verb = %request.leading_verb,
                "Accepted statement: {}",
                truncate_for_log(&request.statement, LOG_STATEMENT_TRUNCATE_LENGTH)
            ),
            GuardResult::Rejected(violation) => debug!(
                "Rejected statement ({}): {}",
                violation,
                truncate_for_log(statement.trim(), LOG_STATEMENT_TRUNCATE_LENGTH)
            ),
        }
        result
    }

    fn check(&self, statement: &str) -> GuardResult {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            return GuardResult::Rejected(PolicyViolation::Empty);
        }

        if trimmed.len() > self.policy.max_statement_length() {
            return GuardResult::Rejected(PolicyViolation::TooLong {
                max: self.policy.max_statement_length(),
            });
        }

        let verb = detect_leading_verb(trimmed);

        let hits = self.forbidden_hits(trimmed, verb);
        if !hits.is_empty() {
            return GuardResult::Rejected(PolicyViolation::ForbiddenKeywords(hits));
        }

        let verb = match verb {
            Some(verb) if self.policy.allows(verb) => verb,
            _ => {
                return GuardResult::Rejected(PolicyViolation::DisallowedVerb {
                    allowed: self.policy.allowed_verbs().to_vec(),
                })
            }
        };

        if self.policy.forbid_stacked_statements() && STACKED_STATEMENT.is_match(trimmed) {
            return GuardResult::Rejected(PolicyViolation::StackedStatements);
        }

        let body = strip_terminators(trimmed);
        let safety_check = match safety_check_for(verb, body) {
            Ok(check) => check,
            Err(violation) => return GuardResult::Rejected(violation),
        };

        GuardResult::Accepted {
            request: SqlRequest {
                statement: trimmed.to_string(),
                leading_verb: verb,
            },
            script: WrappedScript::compose(safety_check, body),
        }
    }

    /// Forbidden keywords found in the statement, upper-case, in order of first appearance.
    ///
    /// The `SET` that follows `UPDATE <target>` is its clause keyword and does not count.
    fn forbidden_hits(&self, statement: &str, verb: Option<LeadingVerb>) -> Vec<String> {
        let Some(pattern) = &self.forbidden else {
            return Vec::new();
        };

        let set_clause = match verb {
            Some(LeadingVerb::Update) => UPDATE_TARGET
                .find(statement)
                .map(|m| m.end() - "SET".len()),
            _ => None,
        };

        let mut hits: Vec<String> = Vec::new();
        let mut pos = 0;
        while let Some(caps) = pattern.captures_at(statement, pos) {
            let Some(m) = caps.get(1) else { break };
            // The trailing boundary may open the next keyword.
            pos = m.end();
            if Some(m.start()) == set_clause {
                continue;
            }
            let keyword = m.as_str().to_ascii_uppercase();
            if !hits.contains(&keyword) {
                hits.push(keyword);
            }
        }
        hits
    }
}

/// Build `(?:^|[^A-Za-z0-9])((?i:K1|K2|...))(?:[^A-Za-z0-9]|$)`; `None` when there is nothing to forbid.
///
/// Only ASCII letters and digits continue a word, so `drop_date` contains `DROP`.
fn build_keyword_pattern(keywords: &[String]) -> Result<Option<Regex>, GuardError> {
    if keywords.is_empty() {
        return Ok(None);
    }
    let mut alternation: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
    alternation.sort_by(|a, b| b.len().cmp(&a.len()));
    let pattern = format!(
        r"(?:^|[^A-Za-z0-9])((?i:{}))(?:[^A-Za-z0-9]|$)",
        alternation.join("|")
    );
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| GuardError::config(format!("Invalid forbidden keyword pattern: {}", e)))
}

/// Detect the leading verb of a trimmed statement.
fn detect_leading_verb(statement: &str) -> Option<LeadingVerb> {
    let caps = LEADING_VERB.captures(statement)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Build the pre-flight row count for a mutating statement.
///
/// Takes everything from the first `FROM` to the end of the statement,
/// trailing clauses included. An `UPDATE` without `FROM` counts rows of its
/// target table filtered by its `WHERE` clause. The count is terminated the
/// same way as the statement, so a trailing line comment cannot swallow it.
fn safety_check_for(verb: LeadingVerb, body: &str) -> Result<Option<String>, PolicyViolation> {
    if !verb.is_mutating() {
        return Ok(None);
    }

    if let Some(from) = FROM_KEYWORD.find(body) {
        let check = format!("SELECT COUNT(*) {}", &body[from.start()..]);
        return Ok(Some(terminate(&check)));
    }

    match verb {
        LeadingVerb::Delete => Err(PolicyViolation::MissingFromClause),
        _ => {
            let caps = UPDATE_TARGET
                .captures(body)
                .ok_or(PolicyViolation::MissingUpdateTarget)?;
            let target = caps
                .get(1)
                .map(|m| m.as_str().trim())
                .filter(|t| !t.is_empty())
                .ok_or(PolicyViolation::MissingUpdateTarget)?;
            let set_end = caps.get(0).map(|m| m.end()).unwrap_or_default();

            let mut check = format!("SELECT COUNT(*) FROM {}", target);
            if let Some(where_clause) = WHERE_KEYWORD.find_at(body, set_end) {
                check.push(' ');
                check.push_str(&body[where_clause.start()..]);
            }
            Ok(Some(terminate(&check)))
        }
    }
}
