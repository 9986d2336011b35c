//! The live form-set model built from a package.
//!
//! A form set owns its forms, storages and one expression arena. Forms own
//! their questions; every cross-reference (question to expression, form to
//! rule, question to storage) is an id or an arena index.

use serde::{Deserialize, Serialize};
use setup_configstr::{ConfigElement, ConfigRequest};
use setup_types::package::{Addressing, DefaultStoreDecl, FormKind, PackageDigest, QuestionFlags, QuestionKind};
use setup_types::{DefaultId, ExprRef, FormId, QuestionId, RuleId, StorageId, StringId, TypedValue, ValueKind};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::expression::Expression;
use crate::host::FormCallback;
use crate::stack::Conditional;
use crate::storage::Storage;
use crate::strings::StringTable;

/// Identifies one installed form package.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FormSetHandle(pub u32);

impl fmt::Display for FormSetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{}", self.0)
    }
}

/// Edit state of a form set.
///
/// ```text
/// Clean -> Editing -> Validating -> Committing -> Clean
///                          |
///                          +-> Rejected -> Editing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormSetState {
    #[default]
    Clean,
    Editing,
    Validating,
    Committing,
    Rejected,
}

// ══════════════════════════════════════════════════════════════════════════════
// Questions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionOption {
    pub text: StringId,
    pub value: TypedValue,
    pub default: bool,
    pub default_mfg: bool,
    pub conditions: Vec<Conditional>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDefault {
    pub default_id: DefaultId,
    pub value: Option<TypedValue>,
    pub expr: Option<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub form: FormId,
    pub prompt: StringId,
    pub help: StringId,
    pub kind: QuestionKind,
    pub storage: Option<StorageId>,
    pub addressing: Option<Addressing>,
    /// The storage element holding the value, for provider-backed storages.
    pub element: Option<ConfigElement>,
    pub flags: QuestionFlags,
    /// Live value, loaded from the edit copy of the storage.
    pub value: TypedValue,
    /// Statement-level gating, including conditions of enclosing scopes.
    pub conditions: Vec<Conditional>,
    pub options: Vec<QuestionOption>,
    pub defaults: Vec<QuestionDefault>,
    pub inconsistent_if: Vec<ExprRef>,
    pub no_submit_if: Vec<ExprRef>,
    pub warning_if: Vec<ExprRef>,
    pub value_expr: Option<ExprRef>,
    pub read_expr: Option<ExprRef>,
    pub write_expr: Option<ExprRef>,
}

impl Question {
    pub fn value_kind(&self) -> ValueKind {
        self.kind.value_kind()
    }

    pub fn width(&self) -> usize {
        self.kind.storage_width()
    }

    /// Passwords are never echoed to providers after a submit.
    pub fn is_password(&self) -> bool {
        matches!(self.kind, QuestionKind::Password { .. })
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.read_only || self.value_expr.is_some()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Forms
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    pub id: FormId,
    pub title: StringId,
    pub kind: FormKind,
    pub conditions: Vec<Conditional>,
    pub rules: BTreeMap<RuleId, ExprRef>,
    pub questions: Vec<Question>,
    /// Elements of each storage this form's questions address.
    pub requests: BTreeMap<StorageId, ConfigRequest>,
    pub open: bool,
}

impl Form {
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn question_mut(&mut self, id: QuestionId) -> Option<&mut Question> {
        self.questions.iter_mut().find(|q| q.id == id)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// FormSet
// ══════════════════════════════════════════════════════════════════════════════

pub struct FormSet {
    pub handle: FormSetHandle,
    pub guid: Uuid,
    pub title: StringId,
    pub digest: PackageDigest,
    pub strings: Box<dyn StringTable>,
    pub storages: BTreeMap<StorageId, Storage>,
    pub default_stores: Vec<DefaultStoreDecl>,
    pub forms: Vec<Form>,
    pub expressions: Vec<Expression>,
    pub state: FormSetState,
    pub(crate) callback: Option<Box<dyn FormCallback>>,
}

impl fmt::Debug for FormSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormSet")
            .field("handle", &self.handle)
            .field("guid", &self.guid)
            .field("digest", &self.digest.to_string())
            .field("storages", &self.storages.len())
            .field("forms", &self.forms.len())
            .field("expressions", &self.expressions.len())
            .field("state", &self.state)
            .finish()
    }
}

impl FormSet {
    pub fn form(&self, id: FormId) -> Option<&Form> {
        self.forms.iter().find(|f| f.id == id)
    }

    pub fn form_mut(&mut self, id: FormId) -> Option<&mut Form> {
        self.forms.iter_mut().find(|f| f.id == id)
    }

    /// Resolve a question id: the given form first, then the whole set.
    pub fn find_question(&self, form: Option<FormId>, id: QuestionId) -> Option<&Question> {
        form.and_then(|f| self.form(f))
            .and_then(|f| f.question(id))
            .or_else(|| self.forms.iter().find_map(|f| f.question(id)))
    }

    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.find_question(None, id)
    }

    pub fn question_mut(&mut self, id: QuestionId) -> Option<&mut Question> {
        self.forms.iter_mut().find_map(|f| f.question_mut(id))
    }

    /// Every question, in package order.
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.forms.iter().flat_map(|f| f.questions.iter())
    }

    pub fn expression(&self, expr: ExprRef) -> Option<&Expression> {
        self.expressions.get(expr.0)
    }

    pub fn storage(&self, id: StorageId) -> Option<&Storage> {
        self.storages.get(&id)
    }

    pub fn storage_mut(&mut self, id: StorageId) -> Option<&mut Storage> {
        self.storages.get_mut(&id)
    }

    pub fn resolve(&self, id: StringId) -> Option<String> {
        self.strings.get(id).map(str::to_string)
    }

    pub fn is_open(&self) -> bool {
        self.forms.iter().any(|f| f.open)
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }
}
