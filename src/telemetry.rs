//! Run identification and log helpers.
//!
//! Every pipeline run gets a short run id that prefixes its log lines and
//! names its script file, so concurrent CI jobs never collide.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Generate a short run ID (8 characters) for compact logging.
pub fn generate_short_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Truncate a string for logging without splitting a UTF-8 character.
pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Context carried through a single pipeline run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Unique identifier for this run.
    pub run_id: String,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Monotonic start of the run.
    start_time: Instant,
    /// Client selector (if known).
    pub client: Option<String>,
    /// Environment label (if resolved).
    pub environment: Option<String>,
}

impl RunContext {
    /// Create a new run context with a generated run ID.
    pub fn new() -> Self {
        Self::with_run_id(generate_short_run_id())
    }

    /// Create a new run context with a specific run ID.
    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            start_time: Instant::now(),
            client: None,
            environment: None,
        }
    }

    /// Set the client selector.
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Set the environment label.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Get the elapsed time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Create a log prefix for consistent logging format.
    pub fn log_prefix(&self) -> String {
        match (&self.client, &self.environment) {
            (Some(client), Some(env)) => format!("[{}] [{}] [{}]", self.run_id, client, env),
            (Some(client), None) => format!("[{}] [{}]", self.run_id, client),
            (None, Some(env)) => format!("[{}] [{}]", self.run_id, env),
            (None, None) => format!("[{}]", self.run_id),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_run_id() {
        let id = generate_short_run_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_short_run_id(), id);
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("SELECT 1", 100), "SELECT 1");
        assert_eq!(truncate_for_log("SELECT 1", 6), "SELECT...");
        // 'é' is two bytes; never cut it in half.
        assert_eq!(truncate_for_log("é", 1), "...");
    }

    #[test]
    fn test_log_prefix() {
        let ctx = RunContext::with_run_id("abc");
        assert_eq!(ctx.log_prefix(), "[abc]");

        let ctx = ctx.with_client("acme").with_environment("prod");
        assert_eq!(ctx.log_prefix(), "[abc] [acme] [prod]");
    }
}
