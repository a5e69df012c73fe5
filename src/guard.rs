//! SQL guard: statement policy checks and transaction wrapping.
//!
//! [`SqlGuard::validate`] is a pure function. It decides whether a statement
//! may run and, if so, wraps it as:
//!
//! ```
//! use sql_guard::guard::SqlGuard;
//!
//! let guard = SqlGuard::default();
//! let result = guard.validate("SELECT * FROM accounts WHERE id = 5");
//! assert_eq!(
//!     result.wrapped_script(),
//!     Some("BEGIN;\n-- User SQL\nSELECT * FROM accounts WHERE id = 5;\nCOMMIT;\n")
//! );
//! ```

mod policy;
mod script;
mod validation;

pub use policy::{parse_keyword_list, parse_verb_list, GuardPolicy, LeadingVerb};
pub use script::WrappedScript;
pub use validation::{
    GuardReport, GuardResult, GuardStatus, PolicyViolation, SqlGuard, SqlRequest,
};
