//! Runtime expressions.

use setup_types::package::ConditionKind;
use setup_types::{Opcode, StringId, TypedValue};
use std::fmt;
use std::rc::Rc;

/// The role an expression plays in its form set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionKind {
    Suppress,
    GrayOut,
    Disable,
    NoSubmit,
    Inconsistent,
    Warning,
    /// Named rule, invoked through `rule_ref`.
    Rule,
    Read,
    Write,
    Value,
    Default,
}

impl From<ConditionKind> for ExpressionKind {
    fn from(kind: ConditionKind) -> Self {
        match kind {
            ConditionKind::SuppressIf => Self::Suppress,
            ConditionKind::GrayOutIf => Self::GrayOut,
            ConditionKind::DisableIf => Self::Disable,
        }
    }
}

impl fmt::Display for ExpressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Suppress => "suppress_if",
            Self::GrayOut => "gray_out_if",
            Self::Disable => "disable_if",
            Self::NoSubmit => "no_submit_if",
            Self::Inconsistent => "inconsistent_if",
            Self::Warning => "warning_if",
            Self::Rule => "rule",
            Self::Read => "read",
            Self::Write => "write",
            Self::Value => "value",
            Self::Default => "default",
        };
        f.write_str(name)
    }
}

/// An opcode list plus the result of its last evaluation.
///
/// The opcodes are shared so an evaluation can walk them while the owning
/// form set is mutated (rule results, `set` opcodes).
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub opcodes: Rc<[Opcode]>,
    /// Text shown when a message-bearing expression fires.
    pub message: StringId,
    /// Cached result, `Undefined` until evaluated or after a failure.
    pub result: TypedValue,
}

impl Expression {
    pub fn new(kind: ExpressionKind, opcodes: Vec<Opcode>) -> Self {
        Self {
            kind,
            opcodes: opcodes.into(),
            message: StringId::NONE,
            result: TypedValue::Undefined,
        }
    }

    pub fn with_message(mut self, message: StringId) -> Self {
        self.message = message;
        self
    }
}
