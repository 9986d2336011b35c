//! Error types for the setup engine.
//!
//! Two layers: [`EvalError`] is what a single expression evaluation or
//! storage primitive can fail with; [`BrowserError`] is what the public
//! engine API returns. Submit and discard report per-storage failures as a
//! [`crate::SubmitStatus`], never as an error.

use setup_configstr::ConfigError;
use setup_types::{FormId, PackageError, QuestionId, StorageId};
use thiserror::Error;

use crate::form::FormSetHandle;

/// Evaluation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Type or coercion mismatch. Callers treat it as false / no effect.
    #[error("expression evaluated to undefined")]
    Undefined,

    /// A pop below the current checkpoint of one of the stacks.
    #[error("{stack} stack underflow")]
    StackUnderflow { stack: &'static str },

    /// Structural violation of the opcode stream.
    #[error("malformed expression: {0}")]
    Malformed(String),

    /// A storage read/write or provider round-trip failed.
    #[error("storage i/o failed: {0}")]
    StorageIo(String),

    /// A referenced question, rule, storage or form set is absent.
    #[error("not found: {0}")]
    NotFound(String),
}

impl EvalError {
    /// `NotFound` degrades to `Undefined` before it leaves an opcode.
    pub fn fold_not_found(self) -> Self {
        match self {
            Self::NotFound(_) => Self::Undefined,
            other => other,
        }
    }

    /// Structural errors that get logged; everything else degrades silently.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::StackUnderflow { .. } | Self::Malformed(_))
    }
}

impl From<ConfigError> for EvalError {
    fn from(err: ConfigError) -> Self {
        Self::StorageIo(err.to_string())
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;

/// Failure reported by a configuration provider.
///
/// `progress` is the byte offset, inside the submitted text, of the first
/// element the provider could not apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration routing stopped at position {progress}: {reason}")]
pub struct RouteFailure {
    pub progress: usize,
    pub reason: String,
}

impl RouteFailure {
    pub fn new(progress: usize, reason: impl Into<String>) -> Self {
        Self {
            progress,
            reason: reason.into(),
        }
    }
}

impl From<RouteFailure> for EvalError {
    fn from(err: RouteFailure) -> Self {
        Self::StorageIo(err.to_string())
    }
}

/// Failure reported by the external variable store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("variable `{name}` not found")]
    VariableNotFound { name: String },

    #[error("variable `{name}` rejected: {reason}")]
    VariableRejected { name: String, reason: String },

    #[error("platform clock unavailable")]
    ClockUnavailable,
}

impl From<HostError> for EvalError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::VariableNotFound { name } => Self::NotFound(format!("variable `{name}`")),
            other => Self::StorageIo(other.to_string()),
        }
    }
}

/// Errors returned by the public engine API.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error("form set {0} is not open")]
    UnknownFormSet(FormSetHandle),

    #[error("form {form} not found in form set {formset}")]
    UnknownForm {
        formset: FormSetHandle,
        form: FormId,
    },

    #[error("question {question} not found in form set {formset}")]
    UnknownQuestion {
        formset: FormSetHandle,
        question: QuestionId,
    },

    #[error("storage {storage} not found in form set {formset}")]
    UnknownStorage {
        formset: FormSetHandle,
        storage: StorageId,
    },

    #[error("change of question {question} vetoed: {reason}")]
    Vetoed {
        question: QuestionId,
        reason: String,
    },

    #[error("value {value} is outside the range of question {question}")]
    OutOfRange { question: QuestionId, value: String },
}

/// Result alias for engine API calls.
pub type BrowserResult<T> = Result<T, BrowserError>;
