//! The engine: open form sets, their stacks and collaborators, and the
//! browser-facing operations on them.

use setup_configstr::ConfigResp;
use setup_types::package::{FormSetPackage, QuestionKind};
use setup_types::{
    DefaultId, ExprRef, FormId, Opcode, QuestionId, StorageId, StringId, TypedValue,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::context::{ContextStack, EngineContext, Selection};
use crate::error::{BrowserError, BrowserResult, EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::form::{Form, FormSet, FormSetHandle, FormSetState, Question};
use crate::gating::Gating;
use crate::host::{CallbackAction, CallbackResponse, FormCallback, Host};
use crate::loader::load_formset;
use crate::stack::StackSet;
use crate::storage::{BufferCopy, Storage, StorageBacking, SyncDirection};
use crate::value_sync::ValueSource;

/// Result of an interactive change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeOutcome {
    /// Whether the new value was kept.
    pub applied: bool,
    /// Messages of the `warning_if` expressions that fired.
    pub warnings: Vec<String>,
    /// Message of the `inconsistent_if` expression that reverted the change.
    pub inconsistent: Option<String>,
}

/// A setup browser engine instance.
pub struct Engine {
    pub(crate) formsets: BTreeMap<FormSetHandle, FormSet>,
    pub(crate) stacks: StackSet,
    pub(crate) host: Host,
    pub(crate) config: EngineConfig,
    pub(crate) context: ContextStack,
}

impl Engine {
    pub fn new(host: Host, config: EngineConfig) -> Self {
        Self {
            formsets: BTreeMap::new(),
            stacks: StackSet::new(config.stack_grow_increment),
            host,
            config,
            context: ContextStack::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    pub fn context(&self) -> &EngineContext {
        self.context.current()
    }

    /// How many provider callbacks are currently on the call stack.
    pub fn callback_depth(&self) -> usize {
        self.context.depth()
    }

    pub fn stacks(&self) -> &StackSet {
        &self.stacks
    }

    pub(crate) fn evaluator(&mut self) -> Evaluator<'_> {
        Evaluator::new(
            &mut self.formsets,
            &mut self.stacks,
            &mut self.host,
            &self.config,
        )
    }

    // ══════════════════════════════════════════════════════════════════════
    // Lookup
    // ══════════════════════════════════════════════════════════════════════

    pub fn formset(&self, handle: FormSetHandle) -> BrowserResult<&FormSet> {
        self.formsets
            .get(&handle)
            .ok_or(BrowserError::UnknownFormSet(handle))
    }

    pub(crate) fn formset_mut(&mut self, handle: FormSetHandle) -> BrowserResult<&mut FormSet> {
        self.formsets
            .get_mut(&handle)
            .ok_or(BrowserError::UnknownFormSet(handle))
    }

    pub fn handles(&self) -> Vec<FormSetHandle> {
        self.formsets.keys().copied().collect()
    }

    pub fn form(&self, handle: FormSetHandle, form: FormId) -> BrowserResult<&Form> {
        self.formset(handle)?
            .form(form)
            .ok_or(BrowserError::UnknownForm {
                formset: handle,
                form,
            })
    }

    pub fn question(&self, handle: FormSetHandle, question: QuestionId) -> BrowserResult<&Question> {
        self.formset(handle)?
            .question(question)
            .ok_or(BrowserError::UnknownQuestion {
                formset: handle,
                question,
            })
    }

    pub fn storage(&self, handle: FormSetHandle, storage: StorageId) -> BrowserResult<&Storage> {
        self.formset(handle)?
            .storage(storage)
            .ok_or(BrowserError::UnknownStorage {
                formset: handle,
                storage,
            })
    }

    // ══════════════════════════════════════════════════════════════════════
    // Form set lifecycle
    // ══════════════════════════════════════════════════════════════════════

    /// Open `package` under `handle`. An already open form set built from
    /// an identical package is reused; returns whether a fresh form set was
    /// built.
    pub fn open_formset(
        &mut self,
        handle: FormSetHandle,
        package: &FormSetPackage,
    ) -> BrowserResult<bool> {
        let digest = package.digest()?;
        if self
            .formsets
            .get(&handle)
            .is_some_and(|fs| fs.digest == digest)
        {
            debug!(formset = %handle, %digest, "package unchanged, reusing form set");
            return Ok(false);
        }

        let callback = self
            .formsets
            .remove(&handle)
            .and_then(|previous| previous.callback);
        let mut formset = load_formset(package, handle, &mut self.stacks)?;
        formset.callback = callback;
        self.formsets.insert(handle, formset);
        self.initialize(handle)?;
        info!(formset = %handle, guid = %package.guid, %digest, "form set opened");
        Ok(true)
    }

    /// Load committed copies from their providers, fall back to defaults
    /// for storages that could not be retrieved, then load question values.
    fn initialize(&mut self, handle: FormSetHandle) -> BrowserResult<()> {
        let storages: Vec<StorageId> = self.formset(handle)?.storages.keys().copied().collect();

        self.context.current_mut().retrieve_pending = true;
        let mut unretrieved = Vec::new();
        for storage in storages {
            if let Err(err) = self.retrieve_committed(handle, storage) {
                warn!(formset = %handle, %storage, "committed values unavailable: {err}");
                unretrieved.push(storage);
            }
        }
        self.context.current_mut().retrieve_pending = false;

        self.evaluator().reload_values(handle, None)?;
        if unretrieved.is_empty() {
            return Ok(());
        }

        let targets: Vec<QuestionId> = self
            .formset(handle)?
            .questions()
            .filter(|q| q.storage.is_some_and(|s| unretrieved.contains(&s)))
            .map(|q| q.id)
            .collect();
        let default_id = self.config.standard_default_id;
        self.apply_defaults(handle, &targets, default_id)?;

        let Self { formsets, host, .. } = self;
        let fs = formsets
            .get_mut(&handle)
            .ok_or(BrowserError::UnknownFormSet(handle))?;
        for id in unretrieved {
            if let Some(storage) = fs.storages.get_mut(&id) {
                storage.synchronize(&*host.routing, None, SyncDirection::Commit)?;
            }
        }
        Ok(())
    }

    fn retrieve_committed(&mut self, handle: FormSetHandle, id: StorageId) -> EvalResult<()> {
        let Self { formsets, host, .. } = self;
        let storage = formsets
            .get_mut(&handle)
            .and_then(|fs| fs.storages.get_mut(&id))
            .ok_or_else(|| EvalError::NotFound(format!("storage {id}")))?;
        let request = storage.full_request();
        let guid = storage.guid;
        let name = storage.name.clone();

        match &mut storage.backing {
            StorageBacking::Buffer(store) => {
                let text = host.routing.extract_config(&request)?;
                let mut image = store.bytes(BufferCopy::Committed).to_vec();
                host.routing.config_to_block(&text, &mut image)?;
                store.load(&image);
            }
            StorageBacking::VariableBuffer { store, .. } => {
                let data = host.variables.get_variable(&guid, &name)?;
                store.load(&data);
            }
            StorageBacking::NameValue(store) => {
                let text = host.routing.extract_config(&request)?;
                for entry in ConfigResp::parse(&text)?.entries {
                    if let setup_configstr::ConfigElement::Name(key) = &entry.element {
                        store.set(key, &entry.value, BufferCopy::Committed);
                        store.set(key, &entry.value, BufferCopy::Edit);
                    }
                }
            }
            StorageBacking::Variable { .. } => {}
        }
        debug!(formset = %handle, storage = %id, "committed copy retrieved");
        Ok(())
    }

    pub fn close_formset(&mut self, handle: FormSetHandle) -> BrowserResult<()> {
        self.formsets
            .remove(&handle)
            .ok_or(BrowserError::UnknownFormSet(handle))?;
        self.forget(handle);
        info!(formset = %handle, "form set closed");
        Ok(())
    }

    /// Destroy every form set whose handle is not in `live`. Returns the
    /// handles dropped.
    pub fn validate_formsets(&mut self, live: &[FormSetHandle]) -> Vec<FormSetHandle> {
        let stale: Vec<FormSetHandle> = self
            .formsets
            .keys()
            .filter(|h| !live.contains(h))
            .copied()
            .collect();
        for handle in &stale {
            self.formsets.remove(handle);
            self.forget(*handle);
            debug!(formset = %handle, "stale form set dropped");
        }
        stale
    }

    fn forget(&mut self, handle: FormSetHandle) {
        let context = self.context.current_mut();
        context.open_forms.retain(|(h, _)| *h != handle);
        if context.selection.formset == Some(handle) {
            context.selection = Selection::default();
        }
    }

    pub fn set_callback(
        &mut self,
        handle: FormSetHandle,
        callback: impl FormCallback + 'static,
    ) -> BrowserResult<()> {
        self.formset_mut(handle)?.callback = Some(Box::new(callback));
        Ok(())
    }

    // ── Forms ────────────────────────────────────────────────────────────

    /// Open a form: its storage elements join the storages' request sets.
    pub fn open_form(&mut self, handle: FormSetHandle, form: FormId) -> BrowserResult<()> {
        let FormSet {
            forms, storages, ..
        } = self.formset_mut(handle)?;
        let target = forms
            .iter_mut()
            .find(|f| f.id == form)
            .ok_or(BrowserError::UnknownForm {
                formset: handle,
                form,
            })?;
        target.open = true;
        for (id, fragment) in &target.requests {
            if let Some(storage) = storages.get_mut(id) {
                storage.attach_form(form, fragment);
            }
        }

        let context = self.context.current_mut();
        if !context.is_form_open(handle, form) {
            context.open_forms.push((handle, form));
        }
        context.selection = Selection {
            formset: Some(handle),
            form: Some(form),
            question: None,
        };
        debug!(formset = %handle, %form, "form opened");
        Ok(())
    }

    pub fn close_form(&mut self, handle: FormSetHandle, form: FormId) -> BrowserResult<()> {
        let FormSet {
            forms, storages, ..
        } = self.formset_mut(handle)?;
        let target = forms
            .iter_mut()
            .find(|f| f.id == form)
            .ok_or(BrowserError::UnknownForm {
                formset: handle,
                form,
            })?;
        target.open = false;
        for id in target.requests.keys() {
            if let Some(storage) = storages.get_mut(id) {
                if storage.detach_form(form) {
                    debug!(formset = %handle, storage = %id, "request set released");
                }
            }
        }

        let context = self.context.current_mut();
        context.open_forms.retain(|entry| *entry != (handle, form));
        if context.selection.form == Some(form) && context.selection.formset == Some(handle) {
            context.selection.form = None;
            context.selection.question = None;
        }
        debug!(formset = %handle, %form, "form closed");
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Evaluation
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate a free opcode list in the context of `form`.
    pub fn evaluate(
        &mut self,
        handle: FormSetHandle,
        form: FormId,
        opcodes: &[Opcode],
    ) -> EvalResult<TypedValue> {
        self.evaluator().evaluate_opcodes(handle, form, opcodes)
    }

    pub fn evaluate_expression(
        &mut self,
        handle: FormSetHandle,
        form: FormId,
        expr: ExprRef,
    ) -> EvalResult<TypedValue> {
        self.evaluator().evaluate(handle, form, expr)
    }

    fn fires(&mut self, handle: FormSetHandle, form: FormId, expr: ExprRef) -> bool {
        matches!(
            self.evaluate_expression(handle, form, expr),
            Ok(TypedValue::Bool(true))
        )
    }

    pub(crate) fn message_text(&self, handle: FormSetHandle, expr: ExprRef) -> String {
        self.formsets
            .get(&handle)
            .and_then(|fs| {
                let message = fs.expression(expr)?.message;
                fs.resolve(message)
            })
            .unwrap_or_default()
    }

    // ── Gating ───────────────────────────────────────────────────────────

    pub fn form_gating(&mut self, handle: FormSetHandle, form: FormId) -> BrowserResult<Gating> {
        let conditions = self.form(handle, form)?.conditions.clone();
        Ok(self.evaluator().gating(handle, form, &conditions))
    }

    /// Gating of a question, including its form's conditions.
    pub fn question_gating(
        &mut self,
        handle: FormSetHandle,
        question: QuestionId,
    ) -> BrowserResult<Gating> {
        let q = self.question(handle, question)?;
        let (form, conditions) = (q.form, q.conditions.clone());
        let outer = self.form_gating(handle, form)?;
        Ok(outer.max(self.evaluator().gating(handle, form, &conditions)))
    }

    /// Gating of the `index`th option of a question.
    pub fn option_gating(
        &mut self,
        handle: FormSetHandle,
        question: QuestionId,
        index: usize,
    ) -> BrowserResult<Gating> {
        let q = self.question(handle, question)?;
        let form = q.form;
        let conditions = q
            .options
            .get(index)
            .ok_or_else(|| BrowserError::OutOfRange {
                question,
                value: format!("option {index}"),
            })?
            .conditions
            .clone();
        let outer = self.question_gating(handle, question)?;
        Ok(outer.max(self.evaluator().gating(handle, form, &conditions)))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Question values
    // ══════════════════════════════════════════════════════════════════════

    /// The cached (edit) value of a question.
    pub fn question_value(
        &self,
        handle: FormSetHandle,
        question: QuestionId,
    ) -> BrowserResult<TypedValue> {
        Ok(self.question(handle, question)?.value.clone())
    }

    pub fn get_question_value(
        &mut self,
        handle: FormSetHandle,
        question: QuestionId,
        source: ValueSource,
    ) -> BrowserResult<TypedValue> {
        self.question(handle, question)?;
        Ok(self.evaluator().read_question(handle, question, source)?)
    }

    pub fn set_question_value(
        &mut self,
        handle: FormSetHandle,
        question: QuestionId,
        value: &TypedValue,
        target: ValueSource,
    ) -> BrowserResult<()> {
        self.question(handle, question)?;
        self.evaluator()
            .write_question(handle, question, value, target)?;
        if target == ValueSource::Edit {
            self.mark_editing(handle);
        }
        Ok(())
    }

    /// The interactive edit path: Changing callback, range check, write,
    /// inconsistency and warning checks, Changed callback.
    pub fn change_question(
        &mut self,
        handle: FormSetHandle,
        question: QuestionId,
        value: TypedValue,
    ) -> BrowserResult<ChangeOutcome> {
        let q = self.question(handle, question)?;
        if q.is_read_only() {
            return Err(BrowserError::Vetoed {
                question,
                reason: "question is read-only".into(),
            });
        }
        let form = q.form;
        let previous = q.value.clone();
        let inconsistent_if = q.inconsistent_if.clone();
        let warning_if = q.warning_if.clone();
        check_range(q, &value)?;

        if let CallbackResponse::Veto(reason) =
            self.notify(handle, CallbackAction::Changing, question, &value)
        {
            warn!(formset = %handle, %question, "change vetoed: {reason}");
            return Err(BrowserError::Vetoed { question, reason });
        }

        self.evaluator()
            .write_question(handle, question, &value, ValueSource::Edit)?;

        for expr in inconsistent_if {
            if self.fires(handle, form, expr) {
                let message = self.message_text(handle, expr);
                self.evaluator()
                    .write_question(handle, question, &previous, ValueSource::Edit)?;
                debug!(formset = %handle, %question, "change reverted: {message}");
                return Ok(ChangeOutcome {
                    applied: false,
                    warnings: Vec::new(),
                    inconsistent: Some(message),
                });
            }
        }

        let mut warnings = Vec::new();
        for expr in warning_if {
            if self.fires(handle, form, expr) {
                warnings.push(self.message_text(handle, expr));
            }
        }

        self.mark_editing(handle);
        self.context.current_mut().selection = Selection {
            formset: Some(handle),
            form: Some(form),
            question: Some(question),
        };
        self.notify(handle, CallbackAction::Changed, question, &value);
        Ok(ChangeOutcome {
            applied: true,
            warnings,
            inconsistent: None,
        })
    }

    pub(crate) fn mark_editing(&mut self, handle: FormSetHandle) {
        if let Some(fs) = self.formsets.get_mut(&handle) {
            if matches!(fs.state, FormSetState::Clean | FormSetState::Rejected) {
                fs.state = FormSetState::Editing;
            }
        }
    }

    pub(crate) fn set_state(&mut self, handle: FormSetHandle, state: FormSetState) {
        if let Some(fs) = self.formsets.get_mut(&handle) {
            debug!(formset = %handle, from = ?fs.state, to = ?state, "state");
            fs.state = state;
        }
    }

    // ── Defaults ─────────────────────────────────────────────────────────

    /// Load the `default_id` defaults into the edit copy of every question
    /// of `form` (every form when `None`). Returns how many were applied.
    pub fn extract_default(
        &mut self,
        handle: FormSetHandle,
        form: Option<FormId>,
        default_id: DefaultId,
    ) -> BrowserResult<usize> {
        let fs = self.formset(handle)?;
        let targets: Vec<QuestionId> = match form {
            Some(id) => fs
                .form(id)
                .ok_or(BrowserError::UnknownForm {
                    formset: handle,
                    form: id,
                })?
                .questions
                .iter()
                .map(|q| q.id)
                .collect(),
            None => fs.questions().map(|q| q.id).collect(),
        };

        self.context.current_mut().pending_default = Some(default_id);
        let applied = self.apply_defaults(handle, &targets, default_id);
        self.context.current_mut().pending_default = None;
        let applied = applied?;

        if applied > 0 {
            self.mark_editing(handle);
        }
        info!(formset = %handle, %default_id, applied, "defaults extracted");
        Ok(applied)
    }

    fn apply_defaults(
        &mut self,
        handle: FormSetHandle,
        targets: &[QuestionId],
        default_id: DefaultId,
    ) -> BrowserResult<usize> {
        let mut applied = 0;
        for id in targets {
            if self.question(handle, *id)?.value_expr.is_some() {
                continue;
            }
            let mut evaluator = self.evaluator();
            let Some(value) = evaluator.default_value(handle, *id, default_id)? else {
                continue;
            };
            match evaluator.write_question(handle, *id, &value, ValueSource::Edit) {
                Ok(()) => applied += 1,
                Err(err) => debug!(formset = %handle, question = %id, "default not stored: {err}"),
            }
        }
        Ok(applied)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Storage
    // ══════════════════════════════════════════════════════════════════════

    /// Copy every element of a storage between its two copies.
    pub fn synchronize(
        &mut self,
        handle: FormSetHandle,
        storage: StorageId,
        direction: SyncDirection,
    ) -> BrowserResult<()> {
        let Self { formsets, host, .. } = self;
        formsets
            .get_mut(&handle)
            .ok_or(BrowserError::UnknownFormSet(handle))?
            .storages
            .get_mut(&storage)
            .ok_or(BrowserError::UnknownStorage {
                formset: handle,
                storage,
            })?
            .synchronize(&*host.routing, None, direction)?;
        if direction == SyncDirection::Restore {
            self.evaluator().reload_values(handle, Some(storage))?;
        }
        Ok(())
    }

    // ── Strings ──────────────────────────────────────────────────────────

    pub fn intern_string(&mut self, handle: FormSetHandle, text: &str) -> BrowserResult<StringId> {
        Ok(self.formset_mut(handle)?.strings.intern(text))
    }

    pub fn resolve_string(&self, handle: FormSetHandle, id: StringId) -> Option<String> {
        self.formsets.get(&handle).and_then(|fs| fs.resolve(id))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Callbacks
    // ══════════════════════════════════════════════════════════════════════

    /// Deliver `action` to the form set's callback. The callback may re-enter
    /// the engine; the browser context is saved around it and restored after.
    pub fn invoke_callback(
        &mut self,
        handle: FormSetHandle,
        action: CallbackAction,
        question: QuestionId,
        value: &TypedValue,
    ) -> CallbackResponse {
        let Some(mut callback) = self
            .formsets
            .get_mut(&handle)
            .and_then(|fs| fs.callback.take())
        else {
            return CallbackResponse::Accept;
        };

        self.context.save();
        let response = callback.callback(self, handle, action, question, value);
        self.context.restore();

        if let Some(fs) = self.formsets.get_mut(&handle) {
            if fs.callback.is_none() {
                fs.callback = Some(callback);
            }
        }
        debug!(formset = %handle, %question, ?action, ?response, "callback delivered");
        response
    }

    /// Deliver `action` only for questions that asked for callbacks.
    pub(crate) fn notify(
        &mut self,
        handle: FormSetHandle,
        action: CallbackAction,
        question: QuestionId,
        value: &TypedValue,
    ) -> CallbackResponse {
        let wants = self
            .formsets
            .get(&handle)
            .and_then(|fs| fs.question(question))
            .is_some_and(|q| q.flags.callback);
        if !wants {
            return CallbackResponse::Accept;
        }
        self.invoke_callback(handle, action, question, value)
    }
}

/// Reject values outside a question's declared range or option set.
fn check_range(question: &Question, value: &TypedValue) -> BrowserResult<()> {
    let out_of_range = || BrowserError::OutOfRange {
        question: question.id,
        value: value.to_string(),
    };
    match &question.kind {
        QuestionKind::Numeric {
            minimum,
            maximum,
            step,
            ..
        } => {
            let raw = value.as_u64().ok_or_else(out_of_range)?;
            if raw < *minimum || raw > *maximum {
                return Err(out_of_range());
            }
            if *step > 0 && (raw - minimum) % step != 0 {
                return Err(out_of_range());
            }
            Ok(())
        }
        QuestionKind::OneOf { .. } => {
            let raw = value.as_u64().ok_or_else(out_of_range)?;
            if question.options.iter().any(|o| o.value.as_u64() == Some(raw)) {
                Ok(())
            } else {
                Err(out_of_range())
            }
        }
        QuestionKind::CheckBox { .. } => match value {
            TypedValue::Bool(_) => Ok(()),
            _ => Err(out_of_range()),
        },
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use setup_types::{RuleId, ValueKind};

    const RULES: &str = r#"{
        "guid": "a1b2c3d4-0000-4000-8000-000000000001",
        "title": 0,
        "strings": [{"id": 1, "text": "x"}],
        "forms": [{
            "id": 1,
            "rules": [
                {"id": 1, "opcodes": [{"op": "one"}, {"op": "string_ref1", "string": 1}, {"op": "add"}]},
                {"id": 2, "opcodes": [{"op": "rule_ref", "rule": 1}]}
            ],
            "items": []
        }]
    }"#;

    fn engine() -> Engine {
        let mut engine = Engine::new(Host::in_memory(), EngineConfig::default());
        let package = FormSetPackage::from_json(RULES).unwrap();
        engine.open_formset(FormSetHandle(1), &package).unwrap();
        engine
    }

    #[test]
    fn test_failing_rule_restores_outer_operands() {
        let mut engine = engine();
        engine.stacks.operands.push(TypedValue::U8(7));
        engine.stacks.operands.push(TypedValue::U8(9));
        let before = engine.stacks.operands.total_depth();

        let result = engine.evaluate(
            FormSetHandle(1),
            FormId(1),
            &[Opcode::RuleRef { rule: RuleId(2) }],
        );
        assert_eq!(result, Err(EvalError::Undefined));
        assert_eq!(engine.stacks.operands.total_depth(), before);
        assert_eq!(engine.stacks.scopes.total_depth(), 0);
        assert_eq!(engine.stacks.expressions.total_depth(), 0);
    }

    #[test]
    fn test_unchanged_package_is_reused() {
        let mut engine = engine();
        let package = FormSetPackage::from_json(RULES).unwrap();
        assert!(!engine.open_formset(FormSetHandle(1), &package).unwrap());
    }

    #[test]
    fn test_range_check() {
        let question = Question {
            id: QuestionId(1),
            form: FormId(1),
            prompt: StringId::NONE,
            help: StringId::NONE,
            kind: QuestionKind::Numeric {
                width: 1,
                minimum: 10,
                maximum: 20,
                step: 5,
            },
            storage: None,
            addressing: None,
            element: None,
            flags: Default::default(),
            value: TypedValue::from_u64(ValueKind::U8, 10),
            conditions: Vec::new(),
            options: Vec::new(),
            defaults: Vec::new(),
            inconsistent_if: Vec::new(),
            no_submit_if: Vec::new(),
            warning_if: Vec::new(),
            value_expr: None,
            read_expr: None,
            write_expr: None,
        };
        assert!(check_range(&question, &TypedValue::U8(15)).is_ok());
        assert!(check_range(&question, &TypedValue::U8(12)).is_err());
        assert!(check_range(&question, &TypedValue::U8(25)).is_err());
    }
}
