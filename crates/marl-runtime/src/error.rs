//! Runtime error types
//!
//! Every evaluation failure carries an [`ErrorKind`] plus a trace of the
//! member/object frames evaluation passed through. All kinds are recoverable
//! at the evaluator boundary; internal invariant violations panic instead of
//! being reported here.

use std::fmt;

use thiserror::Error;

/// Result type for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;

/// One frame of the evaluation trace: the member being forced and the
/// object (or module URI) that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub member: String,
    pub owner: String,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}.{}", self.owner, self.member)
    }
}

/// Classified evaluation failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ErrorKind {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("cannot resolve `{uri}`: {reason}")]
    Resolution { uri: String, reason: String },

    #[error("refusing to load {what} `{uri}`: no allow-list pattern matches")]
    AccessDenied { what: &'static str, uri: String },

    #[error("module `{importer}` is not allowed to import less trusted module `{imported}`")]
    TrustViolation { importer: String, imported: String },

    #[error("checksum mismatch for `{uri}`: expected sha256:{expected}, computed sha256:{actual}")]
    Integrity {
        uri: String,
        expected: String,
        actual: String,
    },

    #[error("cyclic evaluation of `{member}`")]
    CyclicEvaluation { member: String },

    #[error("type violation for `{property}`: expected {expected}, got {actual}")]
    TypeViolation {
        property: String,
        expected: String,
        actual: String,
    },

    #[error("unresolved reference: `{0}`")]
    UnresolvedReference(String),

    #[error("undefined property: `{0}`")]
    UndefinedProperty(String),

    #[error("evaluation timed out")]
    Timeout,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("integer overflow in `{op}`")]
    ArithmeticOverflow { op: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    #[error("operator type error: expected {expected}, got {actual}")]
    OperatorType { expected: String, actual: String },

    #[error("cannot call non-function value of type {0}")]
    NotCallable(String),

    #[error("wrong number of arguments: expected {expected}, got {actual}")]
    WrongArgCount { expected: usize, actual: usize },

    #[error("index out of bounds: {index} (length: {length})")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("expected non-null value")]
    NullPointer,

    #[error("thrown: {0}")]
    UserException(String),

    #[error("recursion limit exceeded")]
    RecursionLimit,

    #[error("invalid package URI: {0}")]
    InvalidPackageUri(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Evaluation error: a classified kind plus the frame trace captured where
/// the failure surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub kind: ErrorKind,
    pub trace: Vec<StackFrame>,
}

impl EvalError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            trace: Vec::new(),
        }
    }

    /// Attach a frame trace if none has been captured yet. The first capture
    /// wins so the trace reflects the innermost failure site.
    pub fn with_trace(mut self, frames: &[StackFrame]) -> Self {
        if self.trace.is_empty() {
            self.trace = frames.to_vec();
        }
        self
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io(msg.into()))
    }

    pub fn resolution(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolution {
            uri: uri.into(),
            reason: reason.into(),
        })
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration(msg.into()))
    }

    pub fn operator_type(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::new(ErrorKind::OperatorType {
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnresolvedReference(name.into()))
    }

    pub fn undefined_prop(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UndefinedProperty(name.into()))
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for frame in self.trace.iter().rev() {
            write!(f, "\n  {}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for EvalError {}

impl From<ErrorKind> for EvalError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}
