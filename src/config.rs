//! Configuration management for SQL Guard.
//!
//! Configuration is loaded from environment variables following the 12-factor app pattern.
//! The CI system injects the secrets (`SQLGUARD_DB_USER`, `SQLGUARD_DB_PASSWORD`)
//! and the operator-level settings; command-line flags override individual values.

use crate::constants::{
    DEFAULT_APPROVAL_TIMEOUT, DEFAULT_APPROVAL_TIMEOUT_SECS, DEFAULT_DB_PORT,
    DEFAULT_EXECUTION_TIMEOUT, DEFAULT_EXECUTION_TIMEOUT_SECS, DEFAULT_MAX_STATEMENT_LENGTH,
    DEFAULT_PSQL_BINARY,
};
use crate::environment::{Environment, EnvironmentMap, HostResolver};
use crate::error::GuardError;
use crate::guard::{parse_keyword_list, parse_verb_list, GuardPolicy, LeadingVerb};
use std::path::PathBuf;
use std::time::Duration;

/// Full configuration for a run.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Statement policy
    pub policy: GuardPolicy,

    /// Branch and host mapping
    pub targets: TargetConfig,

    /// Database client settings
    pub client: ClientConfig,
}

/// Where a run's SQL goes.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Branch → environment mapping
    pub branches: EnvironmentMap,

    /// Environment → host template
    pub hosts: HostResolver,

    /// Database port
    pub port: u16,
}

/// Database client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Username injected by the secret store (validated when a run starts)
    pub username: Option<String>,

    /// Password injected by the secret store (validated when a run starts)
    pub password: Option<String>,

    /// Client binary
    pub psql_binary: PathBuf,

    /// Directory for generated scripts
    pub script_dir: PathBuf,

    /// How long to wait for approval
    pub approval_timeout: Duration,

    /// How long the client may run
    pub execution_timeout: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            branches: EnvironmentMap::default(),
            hosts: HostResolver::new(),
            port: DEFAULT_DB_PORT,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            psql_binary: PathBuf::from(DEFAULT_PSQL_BINARY),
            script_dir: std::env::temp_dir(),
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// ## Policy
    /// - `SQLGUARD_ALLOWED_VERBS`: Allowed leading verbs (default: SELECT,DELETE,UPDATE)
    /// - `SQLGUARD_FORBIDDEN_KEYWORDS`: Replaces the forbidden keyword list
    /// - `SQLGUARD_EXTRA_FORBIDDEN_KEYWORDS`: Added to the forbidden keyword list
    /// - `SQLGUARD_MAX_STATEMENT_LENGTH`: Maximum statement length in bytes (default: 1000000)
    /// - `SQLGUARD_FORBID_STACKED`: Reject multiple statements (default: false)
    ///
    /// ## Targets
    /// - `SQLGUARD_BRANCH_MAP`: `branch=env` pairs (default: develop/dev → dev,
    ///   stage/staging → stage, main/master → prod)
    /// - `SQLGUARD_HOST_DEV`, `SQLGUARD_HOST_STAGE`, `SQLGUARD_HOST_PROD`: host templates,
    ///   `{client}` is replaced by the client selector
    /// - `SQLGUARD_DB_PORT`: Database port (default: 5432)
    ///
    /// ## Client
    /// - `SQLGUARD_DB_USER`, `SQLGUARD_DB_PASSWORD`: Credentials
    /// - `SQLGUARD_PSQL`: Client binary (default: psql)
    /// - `SQLGUARD_SCRIPT_DIR`: Directory for generated scripts (default: system temp dir)
    /// - `SQLGUARD_APPROVAL_TIMEOUT`: Approval window in seconds (default: 1800)
    /// - `SQLGUARD_EXECUTION_TIMEOUT`: Client timeout in seconds (default: 600)
    pub fn from_env() -> Result<Self, GuardError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load only the statement policy (`SQLGUARD_ALLOWED_VERBS` and friends).
    ///
    /// Target and client variables are not read, so a bad port or branch map
    /// cannot fail a plain validation.
    pub fn policy_from_env() -> Result<GuardPolicy, GuardError> {
        Self::policy_from_lookup(&|key: &str| std::env::var(key).ok())
    }

    /// Load the statement policy through an arbitrary variable lookup.
    pub fn policy_from_lookup<F>(lookup: &F) -> Result<GuardPolicy, GuardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let allowed_verbs = match lookup("SQLGUARD_ALLOWED_VERBS") {
            Some(list) => parse_verb_list(&list)?,
            None => LeadingVerb::ALL.to_vec(),
        };

        let policy = match lookup("SQLGUARD_FORBIDDEN_KEYWORDS") {
            Some(list) => GuardPolicy::new(allowed_verbs, parse_keyword_list(&list))?,
            None => GuardPolicy::new(allowed_verbs, GuardPolicy::default().forbidden_keywords())?,
        };

        let policy = match lookup("SQLGUARD_EXTRA_FORBIDDEN_KEYWORDS") {
            Some(list) => policy.with_extra_forbidden(parse_keyword_list(&list))?,
            None => policy,
        };

        let max_statement_length =
            parse_number(lookup, "SQLGUARD_MAX_STATEMENT_LENGTH", DEFAULT_MAX_STATEMENT_LENGTH)?;

        let forbid_stacked = lookup("SQLGUARD_FORBID_STACKED")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let policy = policy
            .with_max_statement_length(max_statement_length)
            .with_forbid_stacked_statements(forbid_stacked);

        Ok(policy)
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GuardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let policy = Self::policy_from_lookup(&lookup)?;

        // Targets
        let branches = match lookup("SQLGUARD_BRANCH_MAP") {
            Some(mapping) => EnvironmentMap::parse(&mapping)?,
            None => EnvironmentMap::default(),
        };

        let mut hosts = HostResolver::new();
        for env in Environment::ALL {
            let key = format!("SQLGUARD_HOST_{}", env.as_str().to_ascii_uppercase());
            if let Some(template) = lookup(&key).filter(|t| !t.trim().is_empty()) {
                hosts = hosts.with_template(env, template.trim());
            }
        }

        let port = parse_number(&lookup, "SQLGUARD_DB_PORT", DEFAULT_DB_PORT)?;

        // Client
        let psql_binary = lookup("SQLGUARD_PSQL")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PSQL_BINARY));

        let script_dir = lookup("SQLGUARD_SCRIPT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        let approval_timeout_secs = parse_number(
            &lookup,
            "SQLGUARD_APPROVAL_TIMEOUT",
            DEFAULT_APPROVAL_TIMEOUT_SECS,
        )?;

        let execution_timeout_secs = parse_number(
            &lookup,
            "SQLGUARD_EXECUTION_TIMEOUT",
            DEFAULT_EXECUTION_TIMEOUT_SECS,
        )?;

        Ok(Config {
            policy,
            targets: TargetConfig {
                branches,
                hosts,
                port,
            },
            client: ClientConfig {
                username: lookup("SQLGUARD_DB_USER"),
                password: lookup("SQLGUARD_DB_PASSWORD"),
                psql_binary,
                script_dir,
                approval_timeout: Duration::from_secs(approval_timeout_secs),
                execution_timeout: Duration::from_secs(execution_timeout_secs),
            },
        })
    }
}

/// Parse a numeric variable, falling back to `default` when unset.
fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, GuardError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| GuardError::config(format!("{} must be a number, got '{}'", key, value))),
        None => Ok(default),
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, GuardError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.policy, GuardPolicy::default());
        assert_eq!(config.targets.port, 5432);
        assert_eq!(config.targets.branches, EnvironmentMap::default());
        assert!(!config.targets.hosts.has_template(Environment::Prod));
        assert_eq!(config.client.approval_timeout, Duration::from_secs(1800));
        assert!(config.client.username.is_none());
    }

    #[test]
    fn test_policy_overrides() {
        let config = load(&[
            ("SQLGUARD_ALLOWED_VERBS", "select"),
            ("SQLGUARD_FORBIDDEN_KEYWORDS", "drop,pg_sleep"),
            ("SQLGUARD_EXTRA_FORBIDDEN_KEYWORDS", "lock"),
            ("SQLGUARD_MAX_STATEMENT_LENGTH", "500"),
            ("SQLGUARD_FORBID_STACKED", "true"),
        ])
        .unwrap();
        assert_eq!(config.policy.allowed_verbs(), &[LeadingVerb::Select]);
        assert_eq!(config.policy.forbidden_keywords(), &["DROP", "PG_SLEEP", "LOCK"]);
        assert_eq!(config.policy.max_statement_length(), 500);
        assert!(config.policy.forbid_stacked_statements());
    }

    #[test]
    fn test_target_overrides() {
        let config = load(&[
            ("SQLGUARD_BRANCH_MAP", "trunk=prod"),
            ("SQLGUARD_HOST_PROD", "{client}.prod.internal"),
            ("SQLGUARD_DB_PORT", "6432"),
        ])
        .unwrap();
        assert_eq!(
            config.targets.branches.resolve("trunk").unwrap(),
            Environment::Prod
        );
        assert_eq!(
            config.targets.hosts.host_for(Environment::Prod, "acme").unwrap(),
            "acme.prod.internal"
        );
        assert_eq!(config.targets.port, 6432);
    }

    #[test]
    fn test_policy_ignores_target_variables() {
        let vars: HashMap<String, String> = [
            ("SQLGUARD_DB_PORT", "not-a-port"),
            ("SQLGUARD_BRANCH_MAP", "main"),
            ("SQLGUARD_ALLOWED_VERBS", "select,delete"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let lookup = |key: &str| vars.get(key).cloned();

        let policy = Config::policy_from_lookup(&lookup).unwrap();
        assert_eq!(
            policy.allowed_verbs(),
            &[LeadingVerb::Select, LeadingVerb::Delete]
        );
        assert!(Config::from_lookup(lookup).is_err());
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("SQLGUARD_DB_PORT", "not-a-port")]).is_err());
        assert!(load(&[("SQLGUARD_ALLOWED_VERBS", "INSERT")]).is_err());
        assert!(load(&[("SQLGUARD_BRANCH_MAP", "main")]).is_err());
        assert!(load(&[("SQLGUARD_FORBIDDEN_KEYWORDS", "DROP TABLE")]).is_err());
    }
}
