//! The closed opcode set interpreted by the expression engine.
//!
//! An expression is an ordered list of [`Opcode`]s evaluated left to right
//! against an operand stack. Opcodes are immutable once a package is loaded.
//!
//! Operand order: an opcode that pops several values pops the most recently
//! pushed one first. For binary operators the *second* value popped is the
//! left-hand operand.

use crate::ids::{QuestionId, RuleId, StorageId, StringId};
use crate::value::{TypedValue, ValueKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a `Get`/`Set` opcode reads or writes inside its storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarTarget {
    /// Byte offset inside a buffer storage.
    Offset(u16),
    /// Entry name inside a name/value storage, or variable name for an
    /// external variable storage.
    Name(String),
}

/// Storage binding of a `Get`/`Set` opcode.
///
/// `storage == None` addresses the live clock: only `Date` and `Time`
/// kinds are meaningful then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarStoreInfo {
    #[serde(default)]
    pub storage: Option<StorageId>,
    pub target: VarTarget,
    pub kind: ValueKind,
    pub width: u16,
}

/// Output format for `ToString` applied to integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringFormat {
    #[default]
    UnsignedDecimal,
    SignedDecimal,
    LowerHex,
    UpperHex,
}

/// How `ToString` interprets a buffer operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferEncoding {
    #[default]
    Ascii,
    Ucs2,
}

/// Search mode of the `Span` opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanMode {
    #[default]
    FirstMatching,
    FirstNonMatching,
}

/// One `(condition, value)` pair of a `Map` opcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapClause {
    pub condition: Vec<Opcode>,
    pub value: Vec<Opcode>,
}

/// A single interpreter instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Opcode {
    // ── Constants ────────────────────────────────────────────────────────
    Constant { value: TypedValue },
    True,
    False,
    One,
    Ones,
    Zero,
    Undefined,
    Version,

    // ── Built-ins with embedded operands ─────────────────────────────────
    Dup,
    EqIdVal { question: QuestionId, value: TypedValue },
    EqIdId { left: QuestionId, right: QuestionId },
    EqIdValList { question: QuestionId, values: Vec<TypedValue> },
    QuestionRef1 { question: QuestionId },
    ThisQuestion { question: QuestionId },
    /// Pops a question id; resolves it in `formset` when given, otherwise in
    /// the evaluating form set.
    QuestionRef3 {
        #[serde(default)]
        formset: Option<Uuid>,
    },
    RuleRef { rule: RuleId },
    StringRef1 { string: StringId },
    Security { permission: Uuid },
    Get { var: VarStoreInfo },
    Set { var: VarStoreInfo },
    Map { clauses: Vec<MapClause> },

    // ── Unary ────────────────────────────────────────────────────────────
    Length,
    Not,
    BitwiseNot,
    QuestionRef2,
    StringRef2,
    ToBoolean,
    ToString {
        #[serde(default)]
        format: StringFormat,
        #[serde(default)]
        buffer_encoding: BufferEncoding,
    },
    ToUint,
    ToUpper,
    ToLower,

    // ── Binary ───────────────────────────────────────────────────────────
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitwiseAnd,
    BitwiseOr,
    ShiftLeft,
    ShiftRight,
    And,
    Or,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    Catenate,
    Match,
    Match2,

    // ── Ternary ──────────────────────────────────────────────────────────
    Conditional,
    Find {
        #[serde(default = "default_true")]
        case_sensitive: bool,
    },
    Mid,
    Token,
    Span {
        #[serde(default)]
        mode: SpanMode,
    },
}

fn default_true() -> bool {
    true
}

impl Opcode {
    /// Shorthand for a literal constant.
    pub fn constant(value: TypedValue) -> Self {
        Self::Constant { value }
    }

    /// Number of operands the opcode pops from the stack.
    pub fn arity(&self) -> usize {
        match self {
            Self::Constant { .. }
            | Self::True
            | Self::False
            | Self::One
            | Self::Ones
            | Self::Zero
            | Self::Undefined
            | Self::Version
            | Self::EqIdVal { .. }
            | Self::EqIdId { .. }
            | Self::EqIdValList { .. }
            | Self::QuestionRef1 { .. }
            | Self::ThisQuestion { .. }
            | Self::RuleRef { .. }
            | Self::StringRef1 { .. }
            | Self::Security { .. }
            | Self::Get { .. } => 0,
            Self::Dup
            | Self::QuestionRef3 { .. }
            | Self::Set { .. }
            | Self::Map { .. }
            | Self::Length
            | Self::Not
            | Self::BitwiseNot
            | Self::QuestionRef2
            | Self::StringRef2
            | Self::ToBoolean
            | Self::ToString { .. }
            | Self::ToUint
            | Self::ToUpper
            | Self::ToLower => 1,
            Self::Add
            | Self::Subtract
            | Self::Multiply
            | Self::Divide
            | Self::Modulo
            | Self::BitwiseAnd
            | Self::BitwiseOr
            | Self::ShiftLeft
            | Self::ShiftRight
            | Self::And
            | Self::Or
            | Self::Equal
            | Self::NotEqual
            | Self::GreaterThan
            | Self::GreaterEqual
            | Self::LessThan
            | Self::LessEqual
            | Self::Catenate
            | Self::Match
            | Self::Match2 => 2,
            Self::Conditional
            | Self::Find { .. }
            | Self::Mid
            | Self::Token
            | Self::Span { .. } => 3,
        }
    }

    /// Lower-case mnemonic, used in log output.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "constant",
            Self::True => "true",
            Self::False => "false",
            Self::One => "one",
            Self::Ones => "ones",
            Self::Zero => "zero",
            Self::Undefined => "undefined",
            Self::Version => "version",
            Self::Dup => "dup",
            Self::EqIdVal { .. } => "eq_id_val",
            Self::EqIdId { .. } => "eq_id_id",
            Self::EqIdValList { .. } => "eq_id_val_list",
            Self::QuestionRef1 { .. } => "question_ref1",
            Self::ThisQuestion { .. } => "this_question",
            Self::QuestionRef3 { .. } => "question_ref3",
            Self::RuleRef { .. } => "rule_ref",
            Self::StringRef1 { .. } => "string_ref1",
            Self::Security { .. } => "security",
            Self::Get { .. } => "get",
            Self::Set { .. } => "set",
            Self::Map { .. } => "map",
            Self::Length => "length",
            Self::Not => "not",
            Self::BitwiseNot => "bitwise_not",
            Self::QuestionRef2 => "question_ref2",
            Self::StringRef2 => "string_ref2",
            Self::ToBoolean => "to_boolean",
            Self::ToString { .. } => "to_string",
            Self::ToUint => "to_uint",
            Self::ToUpper => "to_upper",
            Self::ToLower => "to_lower",
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Modulo => "modulo",
            Self::BitwiseAnd => "bitwise_and",
            Self::BitwiseOr => "bitwise_or",
            Self::ShiftLeft => "shift_left",
            Self::ShiftRight => "shift_right",
            Self::And => "and",
            Self::Or => "or",
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::GreaterThan => "greater_than",
            Self::GreaterEqual => "greater_equal",
            Self::LessThan => "less_than",
            Self::LessEqual => "less_equal",
            Self::Catenate => "catenate",
            Self::Match => "match",
            Self::Match2 => "match2",
            Self::Conditional => "conditional",
            Self::Find { .. } => "find",
            Self::Mid => "mid",
            Self::Token => "token",
            Self::Span { .. } => "span",
        }
    }
}
