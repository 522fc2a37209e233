//! Error types for the carshare contract runtime
//!
//! All fallible operations return `Result<T, Error>`.
//! Hard contract failures (the VM's `assert`/`err`) are errors; an
//! authorization rejection is *not* an error, see [`crate::logic::Decision`].

use thiserror::Error;

/// Carshare runtime error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An `assert` in the approval logic did not hold
    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    /// Application argument index out of range
    #[error("Missing application argument {index} (call has {count})")]
    MissingArgument { index: usize, count: usize },

    /// `btoi` on a byte-sequence longer than 8 bytes
    #[error("Cannot decode integer from {len} bytes (max 8)")]
    IntegerDecode { len: usize },

    /// uint64 overflow or underflow
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// A `Cond` with no matching clause
    #[error("No matching branch: {0}")]
    NoMatchingBranch(String),

    /// Key or value exceeds the VM's storage limits
    #[error("Storage limit exceeded: {0}")]
    StorageLimit(String),

    /// Value had the wrong VM type for the operation
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Local state write or close-out for an account without local state
    #[error("Account {0} has not opted in")]
    NotOptedIn(String),

    /// Second opt-in from the same account
    #[error("Account {0} has already opted in")]
    AlreadyOptedIn(String),

    /// Call targets an application id that is not live in this executor
    #[error("Unknown application id {0}")]
    UnknownApplication(u64),

    /// Creation while an instance is already live in this executor
    #[error("Application {0} already exists")]
    ApplicationExists(u64),

    /// State holds more slots than the declared schema allows
    #[error("Schema violation - {scope}: {violation}")]
    SchemaViolation { scope: String, violation: String },

    /// Program failed to type-check during compilation
    #[error("Compile error: {0}")]
    CompileError(String),

    /// Malformed scenario, call or account input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filesystem failure while writing artifacts
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Result type alias for carshare operations
pub type Result<T> = std::result::Result<T, Error>;
