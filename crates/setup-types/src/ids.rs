//! Numeric identifiers used throughout a form package.
//!
//! Every cross-reference inside a package (question to question, opcode to
//! storage, expression to rule) is one of these small copyable ids. The
//! engine resolves them through arena lookups, never through pointers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty), $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }
    };
}

id_type!(
    /// Question id, unique within one form set.
    QuestionId(u16),
    "Q"
);
id_type!(
    /// Form id, unique within one form set.
    FormId(u16),
    "F"
);
id_type!(
    /// Storage (variable store) id, unique within one form set.
    StorageId(u16),
    "S"
);
id_type!(
    /// Rule id, unique within one form.
    RuleId(u8),
    "R"
);
id_type!(
    /// Default class id (standard, manufacturing, safe, ...).
    DefaultId(u16),
    "D"
);
id_type!(
    /// Handle into a package's string table. `0` never resolves.
    StringId(u16),
    "#"
);

impl StringId {
    /// The reserved "no string" id.
    pub const NONE: Self = Self(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl DefaultId {
    pub const STANDARD: Self = Self(0x0000);
    pub const MANUFACTURING: Self = Self(0x0001);
    pub const SAFE: Self = Self(0x0002);
}

/// Index of an expression inside its owning form's expression arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExprRef(pub usize);

impl fmt::Display for ExprRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr#{}", self.0)
    }
}
