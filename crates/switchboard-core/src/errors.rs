//! Error types for Switchboard operations.

use thiserror::Error;

/// Main error type for Switchboard operations.
#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// Flag was not found in the current snapshot.
    #[error("Flag not found: {0}")]
    FlagNotFound(String),

    /// Condition expression failed to tokenize.
    #[error("Lex error at byte {position}: {message}")]
    Lex { position: usize, message: String },

    /// Condition expression failed to parse.
    #[error("Parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    /// Operand types are incompatible with the operator.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A variable referenced by the expression is absent from the context.
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// Entity validation failed (e.g., duplicate variant key).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Snapshot-level contract violation; the whole snapshot must be rejected.
    #[error("Snapshot rejected: {0}")]
    SnapshotRejected(String),
}

impl SwitchboardError {
    /// Creates a flag not found error.
    pub fn flag_not_found(key: impl Into<String>) -> Self {
        Self::FlagNotFound(key.into())
    }

    /// Creates a lex error at the given byte offset.
    pub fn lex(position: usize, message: impl Into<String>) -> Self {
        Self::Lex {
            position,
            message: message.into(),
        }
    }

    /// Creates a parse error at the given byte offset.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch(message.into())
    }

    /// Creates an unknown variable error.
    pub fn unknown_variable(name: impl Into<String>) -> Self {
        Self::UnknownVariable(name.into())
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns true if this error arose while evaluating an expression at
    /// runtime, as opposed to ingesting or compiling one.
    ///
    /// Runtime errors are scoped to a single segment: the segment is demoted
    /// to non-matching and evaluation continues.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::TypeMismatch(_) | Self::UnknownVariable(_))
    }

    /// Returns true if this error means a condition source is malformed.
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Lex { .. } | Self::Parse { .. })
    }
}

/// Result type for Switchboard operations.
pub type Result<T> = std::result::Result<T, SwitchboardError>;
