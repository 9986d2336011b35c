//! Shared types for the setup browser engine.
//!
//! This crate defines the typed values, opcodes, identifiers and the
//! declarative form-package model used by the configuration-string codec
//! and the evaluation engine. It carries no runtime state.

mod error;
pub mod ids;
pub mod opcode;
pub mod package;
pub mod value;

pub use error::PackageError;
pub use ids::{DefaultId, ExprRef, FormId, QuestionId, RuleId, StorageId, StringId};
pub use opcode::{
    BufferEncoding, MapClause, Opcode, SpanMode, StringFormat, VarStoreInfo, VarTarget,
};
pub use value::{HiiDate, HiiTime, TypedValue, ValueKind};

/// Result type used when loading packages.
pub type Result<T> = std::result::Result<T, PackageError>;
