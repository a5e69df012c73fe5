//! Transaction-wrapped script composition.

use crate::constants::{SAFETY_CHECK_MARKER, USER_SQL_MARKER};
use std::fmt;

/// The script handed to the database client.
///
/// Layout, one component per line:
///
/// ```text
/// BEGIN;
/// -- Safety check
/// SELECT COUNT(*) FROM ...;
/// -- User SQL
/// <statement>;
/// COMMIT;
/// ```
///
/// The safety check lines are only present for mutating statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedScript {
    safety_check: Option<String>,
    text: String,
}

impl WrappedScript {
    /// Compose the script from an optional safety check and the user statement.
    ///
    /// `statement` must already be stripped of trailing semicolons.
    pub fn compose(safety_check: Option<String>, statement: &str) -> Self {
        let mut text = String::from("BEGIN;\n");
        if let Some(check) = &safety_check {
            text.push_str(SAFETY_CHECK_MARKER);
            text.push('\n');
            text.push_str(check);
            text.push('\n');
        }
        text.push_str(USER_SQL_MARKER);
        text.push('\n');
        text.push_str(&terminate(statement));
        text.push('\n');
        text.push_str("COMMIT;\n");

        Self { safety_check, text }
    }

    /// The pre-flight `SELECT COUNT(*)` statement, if one was generated.
    pub fn safety_check(&self) -> Option<&str> {
        self.safety_check.as_deref()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for WrappedScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Strip trailing semicolons and whitespace so a terminator can be appended once.
pub(crate) fn strip_terminators(statement: &str) -> &str {
    statement.trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// Append the statement terminator.
///
/// A trailing line comment would swallow the semicolon, so in that case the
/// terminator goes on its own line.
pub(crate) fn terminate(statement: &str) -> String {
    let last_line = statement.lines().last().unwrap_or_default();
    if last_line.contains("--") {
        format!("{}\n;", statement)
    } else {
        format!("{};", statement)
    }
}
