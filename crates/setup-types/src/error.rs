//! Errors raised while loading or validating a form package.

use crate::ids::{FormId, QuestionId, RuleId, StorageId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("malformed package JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate storage id {0}")]
    DuplicateStorage(StorageId),

    #[error("duplicate form id {0}")]
    DuplicateForm(FormId),

    #[error("duplicate question id {0}")]
    DuplicateQuestion(QuestionId),

    #[error("duplicate rule {rule} in form {form}")]
    DuplicateRule { form: FormId, rule: RuleId },

    #[error("question {question} references unknown storage {storage}")]
    UnknownStorage {
        question: QuestionId,
        storage: StorageId,
    },

    #[error("question {0} is bound to a storage but has no addressing")]
    MissingAddressing(QuestionId),

    #[error("question {0} addressing does not match its storage kind")]
    AddressingMismatch(QuestionId),

    #[error("question {question} does not fit inside storage {storage}")]
    OutOfBounds {
        question: QuestionId,
        storage: StorageId,
    },

    #[error("question {0} has a bit width outside 1..=32")]
    BadBitWidth(QuestionId),
}
