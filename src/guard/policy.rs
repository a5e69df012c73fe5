//! Guard policy: which leading verbs may run and which keywords may not appear.

use crate::constants::{DEFAULT_FORBIDDEN_KEYWORDS, DEFAULT_MAX_STATEMENT_LENGTH};
use crate::error::GuardError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// First keyword of a statement the guard knows how to wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LeadingVerb {
    Select,
    Delete,
    Update,
}

impl LeadingVerb {
    /// Every supported verb, in canonical order.
    pub const ALL: [LeadingVerb; 3] = [LeadingVerb::Select, LeadingVerb::Delete, LeadingVerb::Update];

    /// Upper-case SQL keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadingVerb::Select => "SELECT",
            LeadingVerb::Delete => "DELETE",
            LeadingVerb::Update => "UPDATE",
        }
    }

    /// Check if statements with this verb modify rows and need a safety check.
    pub fn is_mutating(&self) -> bool {
        matches!(self, LeadingVerb::Delete | LeadingVerb::Update)
    }
}

impl fmt::Display for LeadingVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadingVerb {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SELECT" => Ok(LeadingVerb::Select),
            "DELETE" => Ok(LeadingVerb::Delete),
            "UPDATE" => Ok(LeadingVerb::Update),
            other => Err(GuardError::config(format!(
                "Unsupported leading verb '{}': expected SELECT, DELETE or UPDATE",
                other
            ))),
        }
    }
}

/// Statement policy enforced by [`super::SqlGuard`].
///
/// Keywords are stored upper-case, deduplicated, in the order they were given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardPolicy {
    allowed_verbs: Vec<LeadingVerb>,
    forbidden_keywords: Vec<String>,
    max_statement_length: usize,
    forbid_stacked_statements: bool,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            allowed_verbs: LeadingVerb::ALL.to_vec(),
            forbidden_keywords: DEFAULT_FORBIDDEN_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            max_statement_length: DEFAULT_MAX_STATEMENT_LENGTH,
            forbid_stacked_statements: false,
        }
    }
}

impl GuardPolicy {
    /// Create a policy from explicit verb and keyword sets.
    pub fn new<I, K>(allowed_verbs: I, forbidden_keywords: K) -> Result<Self, GuardError>
    where
        I: IntoIterator<Item = LeadingVerb>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        let mut verbs: Vec<LeadingVerb> = Vec::new();
        for verb in allowed_verbs {
            if !verbs.contains(&verb) {
                verbs.push(verb);
            }
        }
        if verbs.is_empty() {
            return Err(GuardError::config("At least one leading verb must be allowed"));
        }

        let mut keywords: Vec<String> = Vec::new();
        for keyword in forbidden_keywords {
            let keyword = normalize_keyword(keyword.as_ref())?;
            if !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }

        Ok(Self {
            allowed_verbs: verbs,
            forbidden_keywords: keywords,
            max_statement_length: DEFAULT_MAX_STATEMENT_LENGTH,
            forbid_stacked_statements: false,
        })
    }

    /// Set the maximum statement length in bytes.
    pub fn with_max_statement_length(mut self, length: usize) -> Self {
        self.max_statement_length = length;
        self
    }

    /// Reject statements that contain more than one statement.
    pub fn with_forbid_stacked_statements(mut self, forbid: bool) -> Self {
        self.forbid_stacked_statements = forbid;
        self
    }

    /// Add keywords to the forbidden set.
    pub fn with_extra_forbidden<K>(mut self, keywords: K) -> Result<Self, GuardError>
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        for keyword in keywords {
            let keyword = normalize_keyword(keyword.as_ref())?;
            if !self.forbidden_keywords.contains(&keyword) {
                self.forbidden_keywords.push(keyword);
            }
        }
        Ok(self)
    }

    pub fn allowed_verbs(&self) -> &[LeadingVerb] {
        &self.allowed_verbs
    }

    pub fn forbidden_keywords(&self) -> &[String] {
        &self.forbidden_keywords
    }

    pub fn max_statement_length(&self) -> usize {
        self.max_statement_length
    }

    pub fn forbid_stacked_statements(&self) -> bool {
        self.forbid_stacked_statements
    }

    /// Check if a leading verb is allowed.
    pub fn allows(&self, verb: LeadingVerb) -> bool {
        self.allowed_verbs.contains(&verb)
    }
}

/// Parse a comma-separated verb list such as `SELECT,DELETE`.
pub fn parse_verb_list(list: &str) -> Result<Vec<LeadingVerb>, GuardError> {
    split_list(list).map(str::parse).collect()
}

/// Parse a comma-separated keyword list; entries are validated by [`GuardPolicy::new`].
pub fn parse_keyword_list(list: &str) -> Vec<String> {
    split_list(list).map(str::to_string).collect()
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn normalize_keyword(keyword: &str) -> Result<String, GuardError> {
    let trimmed = keyword.trim();
    if trimmed.is_empty() {
        return Err(GuardError::config("Forbidden keyword cannot be empty"));
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(GuardError::config(format!(
            "Forbidden keyword '{}' must contain only letters, digits and underscores",
            trimmed
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}
