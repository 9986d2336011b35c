//! Builds a live [`FormSet`] from a package.
//!
//! Nested conditional scopes are flattened here: while walking a scope the
//! loader keeps its condition on the statement-level conditional list (and a
//! matching marker on the scope stack), and every question inside inherits
//! the list as it stands.

use setup_configstr::ConfigRequest;
use setup_types::package::{
    ConditionDecl, FormDecl, FormSetPackage, ItemDecl, MessageExprDecl, QuestionDecl,
};
use setup_types::{ExprRef, FormId, Opcode, PackageError, StorageId, TypedValue};
use std::collections::BTreeMap;
use tracing::debug;

use crate::expression::{Expression, ExpressionKind};
use crate::form::{
    Form, FormSet, FormSetHandle, FormSetState, Question, QuestionDefault, QuestionOption,
};
use crate::stack::{ConditionLevel, Conditional, ScopeMarker, StackSet};
use crate::storage::{Storage, StorageBacking};
use crate::strings::PackageStrings;
use crate::value_sync::Location;

/// Build the form set for `package` under `handle`. Values are left
/// undefined; the engine loads them once the form set is registered.
pub fn load_formset(
    package: &FormSetPackage,
    handle: FormSetHandle,
    stacks: &mut StackSet,
) -> Result<FormSet, PackageError> {
    package.validate()?;
    let digest = package.digest()?;

    let storages: BTreeMap<StorageId, Storage> = package
        .storages
        .iter()
        .map(|decl| (decl.id, Storage::from_decl(decl)))
        .collect();

    let mut loader = Loader {
        stacks,
        storages: &storages,
        expressions: Vec::new(),
    };
    let mut forms = Vec::with_capacity(package.forms.len());
    for decl in &package.forms {
        forms.push(loader.form(decl));
    }
    let expressions = loader.expressions;

    debug!(
        formset = %handle,
        guid = %package.guid,
        forms = forms.len(),
        storages = storages.len(),
        expressions = expressions.len(),
        "loaded form set"
    );

    Ok(FormSet {
        handle,
        guid: package.guid,
        title: package.title,
        digest,
        strings: Box::new(PackageStrings::from_entries(&package.strings)),
        storages,
        default_stores: package.default_stores.clone(),
        forms,
        expressions,
        state: FormSetState::Clean,
        callback: None,
    })
}

struct Loader<'a> {
    stacks: &'a mut StackSet,
    storages: &'a BTreeMap<StorageId, Storage>,
    expressions: Vec<Expression>,
}

impl Loader<'_> {
    fn expression(&mut self, kind: ExpressionKind, opcodes: &[Opcode]) -> ExprRef {
        self.expressions.push(Expression::new(kind, opcodes.to_vec()));
        ExprRef(self.expressions.len() - 1)
    }

    fn message_expression(&mut self, kind: ExpressionKind, decl: &MessageExprDecl) -> ExprRef {
        let expr = self.expression(kind, &decl.opcodes);
        if let Some(e) = self.expressions.get_mut(expr.0) {
            e.message = decl.message;
        }
        expr
    }

    fn conditional(&mut self, decl: &ConditionDecl) -> Conditional {
        Conditional {
            kind: decl.kind,
            expr: self.expression(decl.kind.into(), &decl.opcodes),
        }
    }

    /// Push `conditions` on the list for `level`, returning a snapshot of
    /// the whole visible list. The caller pops them again.
    fn stack_conditions(&mut self, level: ConditionLevel, conditions: &[ConditionDecl]) -> Vec<Conditional> {
        for decl in conditions {
            let conditional = self.conditional(decl);
            self.stacks.conditionals.level_mut(level).push(conditional);
        }
        self.stacks.conditionals.level(level).visible().to_vec()
    }

    fn unstack_conditions(&mut self, level: ConditionLevel, count: usize) {
        let list = self.stacks.conditionals.level_mut(level);
        for _ in 0..count {
            if list.pop().is_err() {
                break;
            }
        }
    }

    // ── Forms ────────────────────────────────────────────────────────────

    fn form(&mut self, decl: &FormDecl) -> Form {
        let checkpoint = self.stacks.conditionals.level_mut(ConditionLevel::Form).enter();
        let conditions = self.stack_conditions(ConditionLevel::Form, &decl.conditions);
        self.stacks
            .conditionals
            .level_mut(ConditionLevel::Form)
            .leave(checkpoint);

        let mut rules = BTreeMap::new();
        for rule in &decl.rules {
            rules.insert(rule.id, self.expression(ExpressionKind::Rule, &rule.opcodes));
        }

        let mut form = Form {
            id: decl.id,
            title: decl.title,
            kind: decl.kind,
            conditions,
            rules,
            questions: Vec::new(),
            requests: BTreeMap::new(),
            open: false,
        };

        let checkpoint = self
            .stacks
            .conditionals
            .level_mut(ConditionLevel::Statement)
            .enter();
        self.items(&mut form, &decl.items);
        self.stacks
            .conditionals
            .level_mut(ConditionLevel::Statement)
            .leave(checkpoint);
        form
    }

    fn items(&mut self, form: &mut Form, items: &[ItemDecl]) {
        for item in items {
            match item {
                ItemDecl::Scope { condition, items } => {
                    let conditional = self.conditional(condition);
                    self.stacks
                        .conditionals
                        .level_mut(ConditionLevel::Statement)
                        .push(conditional);
                    self.stacks.scopes.push(ScopeMarker::Conditional {
                        level: ConditionLevel::Statement,
                    });
                    self.items(form, items);
                    self.stacks.scopes.pop().ok();
                    self.unstack_conditions(ConditionLevel::Statement, 1);
                }
                ItemDecl::Question(decl) => {
                    let question = self.question(form.id, decl);
                    if let (Some(storage), Some(element)) = (question.storage, &question.element) {
                        if let Some(backing) = self.storages.get(&storage) {
                            form.requests
                                .entry(storage)
                                .or_insert_with(|| ConfigRequest::new(backing.header()))
                                .push(element.clone());
                        }
                    }
                    form.questions.push(question);
                }
                ItemDecl::Subtitle { .. } | ItemDecl::Text { .. } => {}
            }
        }
    }

    // ── Questions ────────────────────────────────────────────────────────

    fn question(&mut self, form: FormId, decl: &QuestionDecl) -> Question {
        let conditions = self.stack_conditions(ConditionLevel::Statement, &decl.conditions);
        self.unstack_conditions(ConditionLevel::Statement, decl.conditions.len());

        let mut options = Vec::new();
        for option in decl.kind.options() {
            let checkpoint = self.stacks.conditionals.level_mut(ConditionLevel::Option).enter();
            let conditions = self.stack_conditions(ConditionLevel::Option, &option.conditions);
            self.stacks
                .conditionals
                .level_mut(ConditionLevel::Option)
                .leave(checkpoint);
            options.push(QuestionOption {
                text: option.text,
                value: option.value.clone(),
                default: option.default,
                default_mfg: option.default_mfg,
                conditions,
            });
        }

        let defaults = decl
            .defaults
            .iter()
            .map(|d| QuestionDefault {
                default_id: d.default_id,
                value: d.value.clone(),
                expr: d
                    .opcodes
                    .as_deref()
                    .map(|ops| self.expression(ExpressionKind::Default, ops)),
            })
            .collect();

        let inconsistent_if = decl
            .inconsistent_if
            .iter()
            .map(|m| self.message_expression(ExpressionKind::Inconsistent, m))
            .collect();
        let no_submit_if = decl
            .no_submit_if
            .iter()
            .map(|m| self.message_expression(ExpressionKind::NoSubmit, m))
            .collect();
        let warning_if = decl
            .warning_if
            .iter()
            .map(|m| self.message_expression(ExpressionKind::Warning, m))
            .collect();

        let value_expr = decl
            .value
            .as_deref()
            .map(|ops| self.expression(ExpressionKind::Value, ops));
        let read_expr = decl
            .read
            .as_deref()
            .map(|ops| self.expression(ExpressionKind::Read, ops));
        let write_expr = decl
            .write
            .as_deref()
            .map(|ops| self.expression(ExpressionKind::Write, ops));

        let mut question = Question {
            id: decl.id,
            form,
            prompt: decl.prompt,
            help: decl.help,
            kind: decl.kind.clone(),
            storage: decl.storage,
            addressing: decl.addressing.clone(),
            element: None,
            flags: decl.flags,
            value: TypedValue::Undefined,
            conditions,
            options,
            defaults,
            inconsistent_if,
            no_submit_if,
            warning_if,
            value_expr,
            read_expr,
            write_expr,
        };

        let addressable = decl
            .storage
            .and_then(|id| self.storages.get(&id))
            .is_some_and(|s| !matches!(s.backing, StorageBacking::Variable { .. }));
        if addressable {
            question.element = Location::of_question(&question).map(|l| l.element());
        }
        question
    }
}
