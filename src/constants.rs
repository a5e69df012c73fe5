//! Centralized constants for SQL Guard.
//!
//! This module contains the default policy lists, timeouts and other values
//! used throughout the codebase, making them easy to find and modify.

use std::time::Duration;

// =============================================================================
// Guard Policy Constants
// =============================================================================

/// Keywords rejected anywhere in a statement by default.
pub const DEFAULT_FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE", "INSERT", "MERGE", "REPLACE",
    "COMMENT", "SET", "SHOW", "VACUUM", "ANALYZE", "COPY", "UNLOGGED", "CLUSTER", "DISCARD",
    "EXPLAIN", "LISTEN", "NOTIFY", "REFRESH", "REINDEX", "RESET", "SECURITY", "UNLISTEN", "WITH",
];

/// Default maximum statement length in bytes.
pub const DEFAULT_MAX_STATEMENT_LENGTH: usize = 1_000_000;

// =============================================================================
// Script Composition Constants
// =============================================================================

/// Comment line preceding the pre-flight row count.
pub const SAFETY_CHECK_MARKER: &str = "-- Safety check";

/// Comment line preceding the user's statement.
pub const USER_SQL_MARKER: &str = "-- User SQL";

/// Prefix of generated script files.
pub const SCRIPT_FILE_PREFIX: &str = "sqlguard-";

// =============================================================================
// Database Client Constants
// =============================================================================

/// Default database client binary.
pub const DEFAULT_PSQL_BINARY: &str = "psql";

/// Default PostgreSQL port.
pub const DEFAULT_DB_PORT: u16 = 5432;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Default approval window in seconds.
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 30 * 60;

/// Default database client timeout in seconds.
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 10 * 60;

/// Default approval window as Duration.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(DEFAULT_APPROVAL_TIMEOUT_SECS);

/// Default database client timeout as Duration.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration =
    Duration::from_secs(DEFAULT_EXECUTION_TIMEOUT_SECS);

// =============================================================================
// Logging Constants
// =============================================================================

/// Default truncation length for statement logging.
pub const LOG_STATEMENT_TRUNCATE_LENGTH: usize = 100;
