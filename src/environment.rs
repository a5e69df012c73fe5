//! Branch-to-environment mapping and target host resolution.
//!
//! The CI system runs the pipeline on a branch; the branch decides which
//! environment (and therefore which database host) the SQL runs against.

use crate::error::GuardError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Deployment environment a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Stage,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 3] = [Environment::Dev, Environment::Stage, Environment::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Stage => "stage",
            Environment::Prod => "prod",
        }
    }

    /// Check if runs against this environment must be approved by a human.
    pub fn requires_approval(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "stage" => Ok(Environment::Stage),
            "prod" => Ok(Environment::Prod),
            other => Err(GuardError::config(format!(
                "Unknown environment '{}': expected dev, stage or prod",
                other
            ))),
        }
    }
}

/// Maps source-control branch names to environments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentMap {
    branches: BTreeMap<String, Environment>,
}

impl Default for EnvironmentMap {
    fn default() -> Self {
        let branches = [
            ("develop", Environment::Dev),
            ("dev", Environment::Dev),
            ("stage", Environment::Stage),
            ("staging", Environment::Stage),
            ("main", Environment::Prod),
            ("master", Environment::Prod),
        ]
        .into_iter()
        .map(|(branch, env)| (branch.to_string(), env))
        .collect();
        Self { branches }
    }
}

impl EnvironmentMap {
    /// Create an empty map.
    pub fn empty() -> Self {
        Self {
            branches: BTreeMap::new(),
        }
    }

    /// Parse `branch=env` pairs separated by commas, e.g. `main=prod,develop=dev`.
    pub fn parse(mapping: &str) -> Result<Self, GuardError> {
        let mut map = Self::empty();
        for pair in mapping.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (branch, env) = pair.split_once('=').ok_or_else(|| {
                GuardError::config(format!(
                    "Invalid branch mapping '{}': expected branch=env",
                    pair
                ))
            })?;
            let branch = branch.trim();
            if branch.is_empty() {
                return Err(GuardError::config(format!(
                    "Invalid branch mapping '{}': branch name is empty",
                    pair
                )));
            }
            map.insert(branch, env.parse()?);
        }
        if map.branches.is_empty() {
            return Err(GuardError::config("Branch mapping is empty"));
        }
        Ok(map)
    }

    /// Add or replace a mapping.
    pub fn insert(&mut self, branch: impl Into<String>, env: Environment) {
        self.branches.insert(branch.into(), env);
    }

    /// Resolve a branch to its environment.
    ///
    /// A leading `refs/heads/` is ignored. An unmapped branch is fatal for the run.
    pub fn resolve(&self, branch: &str) -> Result<Environment, GuardError> {
        let name = branch.trim();
        let name = name.strip_prefix("refs/heads/").unwrap_or(name);
        self.branches.get(name).copied().ok_or_else(|| {
            GuardError::precondition(format!(
                "Unrecognized branch '{}': no environment mapping",
                name
            ))
        })
    }
}

/// Per-environment host templates; `{client}` is replaced by the client selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostResolver {
    templates: HashMap<Environment, String>,
}

impl HostResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host template for an environment.
    pub fn with_template(mut self, env: Environment, template: impl Into<String>) -> Self {
        self.templates.insert(env, template.into());
        self
    }

    /// Check if a template is configured for the environment.
    pub fn has_template(&self, env: Environment) -> bool {
        self.templates.contains_key(&env)
    }

    /// Resolve the database host for a client in an environment.
    pub fn host_for(&self, env: Environment, client: &str) -> Result<String, GuardError> {
        validate_selector("client", client)?;
        let template = self.templates.get(&env).ok_or_else(|| {
            GuardError::precondition(format!("No database host configured for environment '{}'", env))
        })?;
        Ok(template.replace("{client}", client))
    }
}

/// Validate a client selector or database name: `[A-Za-z0-9_-]+`.
///
/// Both end up in a host name or on the client command line.
pub fn validate_selector(kind: &str, value: &str) -> Result<(), GuardError> {
    if value.is_empty() {
        return Err(GuardError::precondition(format!("{} must not be empty", kind)));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(GuardError::precondition(format!(
            "{} '{}' may only contain letters, digits, '_' and '-'",
            kind, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping() {
        let map = EnvironmentMap::default();
        assert_eq!(map.resolve("develop").unwrap(), Environment::Dev);
        assert_eq!(map.resolve("staging").unwrap(), Environment::Stage);
        assert_eq!(map.resolve("main").unwrap(), Environment::Prod);
        assert_eq!(map.resolve("refs/heads/master").unwrap(), Environment::Prod);
    }

    #[test]
    fn test_unknown_branch_is_precondition_failure() {
        let err = EnvironmentMap::default().resolve("feature/x").unwrap_err();
        assert!(matches!(err, GuardError::Precondition(_)));
        assert!(err.to_string().contains("feature/x"));
    }

    #[test]
    fn test_parse_mapping() {
        let map = EnvironmentMap::parse("release=prod, qa = stage").unwrap();
        assert_eq!(map.resolve("release").unwrap(), Environment::Prod);
        assert_eq!(map.resolve("qa").unwrap(), Environment::Stage);
        assert!(map.resolve("main").is_err());

        assert!(EnvironmentMap::parse("main").is_err());
        assert!(EnvironmentMap::parse("main=production").is_err());
        assert!(EnvironmentMap::parse("=prod").is_err());
        assert!(EnvironmentMap::parse(" , ").is_err());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("qa".parse::<Environment>().is_err());
        assert!(Environment::Prod.requires_approval());
        assert!(!Environment::Stage.requires_approval());
    }

    #[test]
    fn test_host_for() {
        let hosts = HostResolver::new()
            .with_template(Environment::Dev, "{client}-dev.db.internal")
            .with_template(Environment::Prod, "db.{client}.example.com");
        assert_eq!(
            hosts.host_for(Environment::Dev, "acme").unwrap(),
            "acme-dev.db.internal"
        );
        assert_eq!(
            hosts.host_for(Environment::Prod, "acme").unwrap(),
            "db.acme.example.com"
        );
        assert!(matches!(
            hosts.host_for(Environment::Stage, "acme"),
            Err(GuardError::Precondition(_))
        ));
        assert!(hosts.host_for(Environment::Dev, "acme.evil").is_err());
        assert!(hosts.host_for(Environment::Dev, "").is_err());
    }
}
