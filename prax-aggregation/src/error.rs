//! Error types for aggregation document construction.

use std::fmt;

use thiserror::Error;

/// Result type for aggregation document construction.
pub type AggregationResult<T> = Result<T, AggregationError>;

/// Number of operands an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No operands at all.
    None,
    /// Exactly `n` operands.
    Exactly(usize),
    /// `n` or more operands.
    AtLeast(usize),
}

impl Arity {
    /// Check whether `count` operands satisfy this arity.
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Self::None => count == 0,
            Self::Exactly(n) => count == n,
            Self::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "no operands"),
            Self::Exactly(1) => write!(f, "exactly 1 operand"),
            Self::Exactly(n) => write!(f, "exactly {} operands", n),
            Self::AtLeast(1) => write!(f, "at least 1 operand"),
            Self::AtLeast(n) => write!(f, "at least {} operands", n),
        }
    }
}

/// Errors that can occur while building aggregation documents.
///
/// Every variant is raised at construction time; nothing is deferred to the
/// server.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// A field name or typed property did not resolve to a dotted path.
    #[error("invalid field path '{path}': {reason}")]
    InvalidFieldPath {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A `$let` variable name is not a valid user variable.
    #[error("invalid variable name '{name}': {reason}")]
    InvalidVariable {
        /// The offending name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Wrong number of operands for an operator.
    #[error("{operator} expects {expected}, got {found}")]
    Arity {
        /// Operator keyword.
        operator: &'static str,
        /// Accepted operand count.
        expected: Arity,
        /// Supplied operand count.
        found: usize,
    },

    /// A required named argument was never supplied.
    #[error("{operator} is missing required argument '{argument}'")]
    MissingArgument {
        /// Operator keyword.
        operator: &'static str,
        /// Argument name.
        argument: &'static str,
    },

    /// An operator keyword that is not in the operator table.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// A document does not have the shape its operator defines.
    #[error("malformed {operator} expression: {reason}")]
    Malformed {
        /// Operator keyword.
        operator: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Invalid pipeline stage or search definition.
    #[error("invalid stage: {0}")]
    InvalidStage(String),

    /// Invalid aggregate command option.
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

impl AggregationError {
    /// Create an invalid field path error.
    pub fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidFieldPath {
            path: path.into(),
            reason,
        }
    }

    /// Create an invalid variable error.
    pub fn invalid_variable(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidVariable {
            name: name.into(),
            reason,
        }
    }

    /// Create an arity error.
    pub fn arity(operator: &'static str, expected: Arity, found: usize) -> Self {
        Self::Arity {
            operator,
            expected,
            found,
        }
    }

    /// Create a missing argument error.
    pub fn missing_argument(operator: &'static str, argument: &'static str) -> Self {
        Self::MissingArgument { operator, argument }
    }

    /// Create a malformed expression error.
    pub fn malformed(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid stage error.
    pub fn stage(message: impl Into<String>) -> Self {
        Self::InvalidStage(message.into())
    }

    /// Create an invalid option error.
    pub fn option(message: impl Into<String>) -> Self {
        Self::InvalidOption(message.into())
    }

    /// Check if this error came from an unresolvable path or variable.
    pub fn is_invalid_operand(&self) -> bool {
        matches!(
            self,
            Self::InvalidFieldPath { .. } | Self::InvalidVariable { .. }
        )
    }

    /// Check if this is an arity violation.
    pub fn is_arity(&self) -> bool {
        matches!(self, Self::Arity { .. })
    }

    /// Check if this error came from parsing an existing document.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::UnknownOperator(_) | Self::Malformed { .. })
    }
}
