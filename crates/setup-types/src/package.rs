//! Declarative form package: the parsed, immutable description of a form set.
//!
//! A package is what the engine loads into a live form set. It is plain data
//! (serde), typically read from JSON. Nesting of conditional scopes
//! (`suppress_if`, `gray_out_if`, `disable_if`) is expressed with
//! [`ItemDecl::Scope`]; the loader flattens those scopes onto statements.

use crate::error::PackageError;
use crate::ids::{DefaultId, FormId, QuestionId, RuleId, StorageId, StringId};
use crate::opcode::Opcode;
use crate::value::{TypedValue, ValueKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ══════════════════════════════════════════════════════════════════════════════
// Top level
// ══════════════════════════════════════════════════════════════════════════════

/// A complete form set description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSetPackage {
    pub guid: Uuid,
    pub title: StringId,
    #[serde(default)]
    pub strings: Vec<StringEntry>,
    #[serde(default)]
    pub storages: Vec<StorageDecl>,
    #[serde(default)]
    pub default_stores: Vec<DefaultStoreDecl>,
    pub forms: Vec<FormDecl>,
}

/// One entry of the package string table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringEntry {
    pub id: StringId,
    pub text: String,
}

/// SHA-256 digest identifying one revision of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageDigest(pub [u8; 32]);

impl fmt::Display for PackageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// A named default class (standard, manufacturing, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultStoreDecl {
    pub id: DefaultId,
    #[serde(default)]
    pub name: StringId,
}

// ══════════════════════════════════════════════════════════════════════════════
// Storage declarations
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDecl {
    pub id: StorageId,
    pub guid: Uuid,
    pub name: String,
    pub kind: StorageKindDecl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageKindDecl {
    /// Fixed-size byte array reached through the configuration provider.
    Buffer { size: u16 },
    /// Fixed-size byte array persisted as one external variable.
    VariableBuffer {
        size: u16,
        #[serde(default)]
        attributes: u32,
    },
    /// Ordered name -> value map reached through the configuration provider.
    NameValue {
        #[serde(default)]
        names: Vec<String>,
    },
    /// One external variable per question, no edit/commit split.
    Variable {
        #[serde(default)]
        attributes: u32,
    },
}

// ══════════════════════════════════════════════════════════════════════════════
// Forms and statements
// ══════════════════════════════════════════════════════════════════════════════

/// Standard forms ignore question read/write expressions; standard-map forms
/// honor them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    #[default]
    Standard,
    StandardMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDecl {
    pub id: FormId,
    #[serde(default)]
    pub title: StringId,
    #[serde(default)]
    pub kind: FormKind,
    /// Conditions gating the whole form.
    #[serde(default)]
    pub conditions: Vec<ConditionDecl>,
    #[serde(default)]
    pub rules: Vec<RuleDecl>,
    #[serde(default)]
    pub items: Vec<ItemDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDecl {
    pub id: RuleId,
    pub opcodes: Vec<Opcode>,
}

/// Which gating effect a true condition has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    SuppressIf,
    GrayOutIf,
    DisableIf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDecl {
    pub kind: ConditionKind,
    pub opcodes: Vec<Opcode>,
}

/// An expression paired with the message shown when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageExprDecl {
    pub opcodes: Vec<Opcode>,
    #[serde(default)]
    pub message: StringId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum ItemDecl {
    /// A conditional scope wrapping nested items.
    Scope {
        condition: ConditionDecl,
        items: Vec<ItemDecl>,
    },
    Question(QuestionDecl),
    Subtitle { text: StringId },
    Text { text: StringId },
}

// ══════════════════════════════════════════════════════════════════════════════
// Questions
// ══════════════════════════════════════════════════════════════════════════════

/// Location of a question's value inside its storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Addressing {
    /// Byte offset in a buffer storage.
    Offset(u16),
    /// Bit offset/width in a buffer storage (bit-field question).
    Bits { bit_offset: u32, bit_width: u8 },
    /// Entry name in a name/value storage, variable name otherwise.
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    Numeric {
        width: u8,
        #[serde(default)]
        minimum: u64,
        #[serde(default = "u64_max")]
        maximum: u64,
        #[serde(default)]
        step: u64,
    },
    OneOf {
        width: u8,
        options: Vec<OptionDecl>,
    },
    CheckBox {
        #[serde(default)]
        default: bool,
        #[serde(default)]
        default_mfg: bool,
    },
    String {
        #[serde(default)]
        min_size: u8,
        max_size: u8,
    },
    Password {
        #[serde(default)]
        min_size: u8,
        max_size: u8,
    },
    OrderedList {
        max_containers: u8,
        /// Width in bytes of one entry.
        item_width: u8,
        options: Vec<OptionDecl>,
    },
    Date,
    Time,
    Action,
    Ref {
        #[serde(default)]
        form: Option<FormId>,
    },
}

fn u64_max() -> u64 {
    u64::MAX
}

impl QuestionKind {
    /// Size in bytes of the question's storage slot.
    pub fn storage_width(&self) -> usize {
        match self {
            Self::Numeric { width, .. } | Self::OneOf { width, .. } => usize::from(*width),
            Self::CheckBox { .. } => 1,
            Self::String { max_size, .. } | Self::Password { max_size, .. } => {
                usize::from(*max_size) * 2
            }
            Self::OrderedList {
                max_containers,
                item_width,
                ..
            } => usize::from(*max_containers) * usize::from(*item_width),
            Self::Date => 4,
            Self::Time => 3,
            Self::Action | Self::Ref { .. } => 2,
        }
    }

    /// Kind of the [`TypedValue`] this question holds.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::Numeric { width, .. } | Self::OneOf { width, .. } => {
                ValueKind::for_width(usize::from(*width)).unwrap_or(ValueKind::U64)
            }
            Self::CheckBox { .. } => ValueKind::Bool,
            Self::String { .. } | Self::Password { .. } | Self::Action | Self::Ref { .. } => {
                ValueKind::String
            }
            Self::OrderedList { .. } => ValueKind::Buffer,
            Self::Date => ValueKind::Date,
            Self::Time => ValueKind::Time,
        }
    }

    /// Questions whose value is held as raw bytes rather than a scalar.
    pub fn is_buffer_valued(&self) -> bool {
        matches!(
            self,
            Self::String { .. } | Self::Password { .. } | Self::OrderedList { .. }
        )
    }

    pub fn options(&self) -> &[OptionDecl] {
        match self {
            Self::OneOf { options, .. } | Self::OrderedList { options, .. } => options,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDecl {
    #[serde(default)]
    pub text: StringId,
    pub value: TypedValue,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub default_mfg: bool,
    #[serde(default)]
    pub conditions: Vec<ConditionDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestionFlags {
    /// The owning provider wants Changing/Changed/Submitted callbacks.
    #[serde(default)]
    pub callback: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub reset_required: bool,
}

/// A question default for one default class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultDecl {
    #[serde(default)]
    pub default_id: DefaultId,
    #[serde(default)]
    pub value: Option<TypedValue>,
    /// Default computed by an expression; wins over `value` when present.
    #[serde(default)]
    pub opcodes: Option<Vec<Opcode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDecl {
    pub id: QuestionId,
    #[serde(default)]
    pub prompt: StringId,
    #[serde(default)]
    pub help: StringId,
    pub kind: QuestionKind,
    #[serde(default)]
    pub storage: Option<StorageId>,
    #[serde(default)]
    pub addressing: Option<Addressing>,
    #[serde(default)]
    pub flags: QuestionFlags,
    #[serde(default)]
    pub conditions: Vec<ConditionDecl>,
    #[serde(default)]
    pub defaults: Vec<DefaultDecl>,
    #[serde(default)]
    pub inconsistent_if: Vec<MessageExprDecl>,
    #[serde(default)]
    pub no_submit_if: Vec<MessageExprDecl>,
    #[serde(default)]
    pub warning_if: Vec<MessageExprDecl>,
    #[serde(default)]
    pub value: Option<Vec<Opcode>>,
    #[serde(default)]
    pub read: Option<Vec<Opcode>>,
    #[serde(default)]
    pub write: Option<Vec<Opcode>>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Loading and validation
// ══════════════════════════════════════════════════════════════════════════════

impl FormSetPackage {
    /// Parse and validate a JSON package.
    pub fn from_json(text: &str) -> Result<Self, PackageError> {
        let package: Self = serde_json::from_str(text)?;
        package.validate()?;
        Ok(package)
    }

    pub fn to_json(&self) -> Result<String, PackageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Digest of the canonical (compact JSON) form of the package.
    pub fn digest(&self) -> Result<PackageDigest, PackageError> {
        let bytes = serde_json::to_vec(self)?;
        let hash = Sha256::digest(&bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hash);
        Ok(PackageDigest(out))
    }

    /// All question declarations, in package order, with their form id.
    pub fn questions(&self) -> Vec<(FormId, &QuestionDecl)> {
        fn walk<'a>(form: FormId, items: &'a [ItemDecl], out: &mut Vec<(FormId, &'a QuestionDecl)>) {
            for item in items {
                match item {
                    ItemDecl::Scope { items, .. } => walk(form, items, out),
                    ItemDecl::Question(q) => out.push((form, q)),
                    ItemDecl::Subtitle { .. } | ItemDecl::Text { .. } => {}
                }
            }
        }
        let mut out = Vec::new();
        for form in &self.forms {
            walk(form.id, &form.items, &mut out);
        }
        out
    }

    /// Check cross-references and uniqueness constraints.
    pub fn validate(&self) -> Result<(), PackageError> {
        let mut storages = BTreeSet::new();
        for storage in &self.storages {
            if !storages.insert(storage.id) {
                return Err(PackageError::DuplicateStorage(storage.id));
            }
        }

        let mut forms = BTreeSet::new();
        for form in &self.forms {
            if !forms.insert(form.id) {
                return Err(PackageError::DuplicateForm(form.id));
            }
            let mut rules = BTreeSet::new();
            for rule in &form.rules {
                if !rules.insert(rule.id) {
                    return Err(PackageError::DuplicateRule {
                        form: form.id,
                        rule: rule.id,
                    });
                }
            }
        }

        let mut questions = BTreeSet::new();
        for (_, q) in self.questions() {
            if !questions.insert(q.id) {
                return Err(PackageError::DuplicateQuestion(q.id));
            }
            let Some(storage_id) = q.storage else {
                continue;
            };
            let storage = self
                .storages
                .iter()
                .find(|s| s.id == storage_id)
                .ok_or(PackageError::UnknownStorage {
                    question: q.id,
                    storage: storage_id,
                })?;
            let addressing = q
                .addressing
                .as_ref()
                .ok_or(PackageError::MissingAddressing(q.id))?;
            check_addressing(q, storage, addressing)?;
        }
        Ok(())
    }
}

fn check_addressing(
    q: &QuestionDecl,
    storage: &StorageDecl,
    addressing: &Addressing,
) -> Result<(), PackageError> {
    let width = q.kind.storage_width();
    let size = match storage.kind {
        StorageKindDecl::Buffer { size } | StorageKindDecl::VariableBuffer { size, .. } => {
            usize::from(size)
        }
        StorageKindDecl::NameValue { .. } | StorageKindDecl::Variable { .. } => {
            return match addressing {
                Addressing::Name(_) => Ok(()),
                _ => Err(PackageError::AddressingMismatch(q.id)),
            };
        }
    };
    match addressing {
        Addressing::Offset(offset) => {
            if usize::from(*offset) + width > size {
                return Err(PackageError::OutOfBounds {
                    question: q.id,
                    storage: storage.id,
                });
            }
        }
        Addressing::Bits {
            bit_offset,
            bit_width,
        } => {
            if *bit_width == 0 || *bit_width > 32 {
                return Err(PackageError::BadBitWidth(q.id));
            }
            let end_bit = *bit_offset as usize + usize::from(*bit_width);
            if end_bit.div_ceil(8) > size {
                return Err(PackageError::OutOfBounds {
                    question: q.id,
                    storage: storage.id,
                });
            }
        }
        Addressing::Name(_) => return Err(PackageError::AddressingMismatch(q.id)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "guid": "a1b2c3d4-0000-4000-8000-000000000001",
        "title": 1,
        "strings": [{"id": 1, "text": "Main"}],
        "storages": [
            {"id": 1, "guid": "a1b2c3d4-0000-4000-8000-0000000000aa", "name": "Setup",
             "kind": {"type": "buffer", "size": 4}}
        ],
        "forms": [{
            "id": 1,
            "items": [
                {"item": "question", "id": 1, "storage": 1, "addressing": {"offset": 0},
                 "kind": {"type": "numeric", "width": 1, "maximum": 200}}
            ]
        }]
    }"#;

    #[test]
    fn test_minimal_package_parses() {
        let pkg = FormSetPackage::from_json(MINIMAL).unwrap();
        assert_eq!(pkg.forms.len(), 1);
        let questions = pkg.questions();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].1.kind.value_kind(), ValueKind::U8);
    }

    #[test]
    fn test_digest_is_stable() {
        let pkg = FormSetPackage::from_json(MINIMAL).unwrap();
        assert_eq!(pkg.digest().unwrap(), pkg.clone().digest().unwrap());
        let mut changed = pkg.clone();
        changed.title = StringId(2);
        assert_ne!(pkg.digest().unwrap(), changed.digest().unwrap());
    }

    #[test]
    fn test_out_of_bounds_offset_rejected() {
        let text = MINIMAL.replace(r#"{"offset": 0}"#, r#"{"offset": 4}"#);
        let err = FormSetPackage::from_json(&text).unwrap_err();
        assert!(matches!(err, PackageError::OutOfBounds { .. }));
    }

    #[test]
    fn test_unknown_storage_rejected() {
        let text = MINIMAL.replace(r#""storage": 1"#, r#""storage": 9"#);
        let err = FormSetPackage::from_json(&text).unwrap_err();
        assert!(matches!(err, PackageError::UnknownStorage { .. }));
    }

    #[test]
    fn test_storage_widths() {
        let kind = QuestionKind::String {
            min_size: 0,
            max_size: 8,
        };
        assert_eq!(kind.storage_width(), 16);
        assert!(kind.is_buffer_valued());
        assert_eq!(QuestionKind::Time.storage_width(), 3);
    }
}
