//! The opcode interpreter.
//!
//! An [`Evaluator`] borrows everything one evaluation request needs: the
//! open form sets, the stack set, the host collaborators and the engine
//! configuration. It is created per request and dropped afterwards.

use setup_types::{ExprRef, FormId, MapClause, Opcode, QuestionId, StringId, TypedValue};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EvalError, EvalResult};
use crate::form::{FormSet, FormSetHandle};
use crate::host::Host;
use crate::ops;
use crate::stack::{ExprFrame, MapFrame, ScopeMarker, StackSet};
use crate::storage::StorageBacking;
use crate::strings::StringTable;
use crate::value_sync::ValueSource;

/// Borrowed view of the engine used for one evaluation request.
pub struct Evaluator<'a> {
    pub(crate) formsets: &'a mut BTreeMap<FormSetHandle, FormSet>,
    pub(crate) stacks: &'a mut StackSet,
    pub(crate) host: &'a mut Host,
    pub(crate) config: &'a EngineConfig,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        formsets: &'a mut BTreeMap<FormSetHandle, FormSet>,
        stacks: &'a mut StackSet,
        host: &'a mut Host,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            formsets,
            stacks,
            host,
            config,
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Entry points
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate an arena expression of `formset` in the context of `form`,
    /// caching the result on the expression.
    pub fn evaluate(
        &mut self,
        formset: FormSetHandle,
        form: FormId,
        expr: ExprRef,
    ) -> EvalResult<TypedValue> {
        let opcodes = self
            .formsets
            .get(&formset)
            .and_then(|fs| fs.expression(expr))
            .map(|e| Rc::clone(&e.opcodes))
            .ok_or_else(|| EvalError::NotFound(format!("{expr} in form set {formset}")))?;

        let result = self.run_framed(
            ExprFrame {
                formset,
                form,
                expr: Some(expr),
            },
            &opcodes,
        );

        if let Some(cached) = self
            .formsets
            .get_mut(&formset)
            .and_then(|fs| fs.expressions.get_mut(expr.0))
        {
            cached.result = result.clone().unwrap_or_default();
        }
        if let Err(err) = &result {
            if err.is_structural() {
                warn!(%formset, %form, %expr, "expression aborted: {err}");
            }
        }
        result
    }

    /// Evaluate an opcode list that is not part of any arena.
    pub fn evaluate_opcodes(
        &mut self,
        formset: FormSetHandle,
        form: FormId,
        opcodes: &[Opcode],
    ) -> EvalResult<TypedValue> {
        if !self.formsets.contains_key(&formset) {
            return Err(EvalError::NotFound(format!("form set {formset}")));
        }
        self.run_framed(
            ExprFrame {
                formset,
                form,
                expr: None,
            },
            opcodes,
        )
    }

    fn run_framed(&mut self, frame: ExprFrame, opcodes: &[Opcode]) -> EvalResult<TypedValue> {
        let checkpoint = self.stacks.expressions.enter();
        self.stacks.expressions.push(frame);
        let result = self.run(opcodes);
        self.stacks.expressions.leave(checkpoint);
        result
    }

    /// Run `opcodes` above a fresh operand checkpoint. The checkpoint is
    /// restored on every exit path.
    fn run(&mut self, opcodes: &[Opcode]) -> EvalResult<TypedValue> {
        let checkpoint = self.stacks.operands.enter();
        let result = self.run_above_checkpoint(opcodes);
        self.stacks.operands.leave(checkpoint);
        result
    }

    fn run_above_checkpoint(&mut self, opcodes: &[Opcode]) -> EvalResult<TypedValue> {
        for op in opcodes {
            let value = self.step(op).map_err(EvalError::fold_not_found)?;
            if value.is_undefined() {
                debug!(op = op.mnemonic(), "opcode produced undefined");
                return Err(EvalError::Undefined);
            }
            self.stacks.operands.push(value);
        }
        match self.stacks.operands.depth() {
            1 => self.stacks.operands.pop(),
            n => Err(EvalError::Malformed(format!(
                "{n} values left on the operand stack, expected 1"
            ))),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Dispatch
    // ══════════════════════════════════════════════════════════════════════

    fn step(&mut self, op: &Opcode) -> EvalResult<TypedValue> {
        match op {
            // ── Constants ────────────────────────────────────────────────
            Opcode::Constant { value } => Ok(value.clone()),
            Opcode::True => Ok(TypedValue::Bool(true)),
            Opcode::False => Ok(TypedValue::Bool(false)),
            Opcode::One => Ok(TypedValue::U64(1)),
            Opcode::Ones => Ok(TypedValue::U64(u64::MAX)),
            Opcode::Zero => Ok(TypedValue::U64(0)),
            Opcode::Undefined => Ok(TypedValue::Undefined),
            Opcode::Version => Ok(TypedValue::U16(self.config.ifr_version)),

            Opcode::Dup => {
                let value = self.stacks.operands.pop()?;
                self.stacks.operands.push(value.clone());
                Ok(value)
            }

            // ── Cross references ─────────────────────────────────────────
            Opcode::EqIdVal { question, value } => {
                let current = self.question_value(*question)?;
                self.equals(&current, value)
            }
            Opcode::EqIdId { left, right } => {
                let left = self.question_value(*left)?;
                let right = self.question_value(*right)?;
                self.equals(&left, &right)
            }
            Opcode::EqIdValList { question, values } => {
                let current = self.question_value(*question)?;
                for candidate in values {
                    if self.equals(&current, candidate)? == TypedValue::Bool(true) {
                        return Ok(TypedValue::Bool(true));
                    }
                }
                Ok(TypedValue::Bool(false))
            }
            Opcode::QuestionRef1 { question } | Opcode::ThisQuestion { question } => {
                self.question_value(*question)
            }
            Opcode::QuestionRef2 => {
                let id = self.pop_question_id()?;
                self.question_value(id)
            }
            Opcode::QuestionRef3 { formset } => {
                let id = self.pop_question_id()?;
                match formset {
                    Some(guid) => self.foreign_question_value(guid, id),
                    None => self.question_value(id),
                }
            }
            Opcode::RuleRef { rule } => self.rule(*rule),
            Opcode::StringRef1 { string } => self.string_ref(*string),
            Opcode::StringRef2 => {
                let raw = self.stacks.operands.pop()?;
                match raw.as_u64().and_then(|v| u16::try_from(v).ok()) {
                    Some(id) => self.string_ref(StringId(id)),
                    None => Ok(TypedValue::Undefined),
                }
            }
            Opcode::Security { permission } => {
                Ok(TypedValue::Bool(self.host.has_permission(permission)))
            }

            // ── Storage ──────────────────────────────────────────────────
            Opcode::Get { var } => self.get_var(var),
            Opcode::Set { var } => {
                let value = self.stacks.operands.pop()?;
                let stored = self.set_var(var, &value);
                if let Err(err) = &stored {
                    debug!(op = "set", "store failed: {err}");
                }
                Ok(TypedValue::Bool(stored.is_ok()))
            }
            Opcode::Map { clauses } => self.map(clauses),

            // ── Operators ────────────────────────────────────────────────
            Opcode::Length
            | Opcode::Not
            | Opcode::BitwiseNot
            | Opcode::ToBoolean
            | Opcode::ToString { .. }
            | Opcode::ToUint
            | Opcode::ToUpper
            | Opcode::ToLower => {
                let operand = self.stacks.operands.pop()?;
                Ok(ops::unary(op, operand, self.strings_mut()?))
            }
            Opcode::Add
            | Opcode::Subtract
            | Opcode::Multiply
            | Opcode::Divide
            | Opcode::Modulo
            | Opcode::BitwiseAnd
            | Opcode::BitwiseOr
            | Opcode::ShiftLeft
            | Opcode::ShiftRight
            | Opcode::And
            | Opcode::Or
            | Opcode::Equal
            | Opcode::NotEqual
            | Opcode::GreaterThan
            | Opcode::GreaterEqual
            | Opcode::LessThan
            | Opcode::LessEqual
            | Opcode::Catenate
            | Opcode::Match
            | Opcode::Match2 => {
                let right = self.stacks.operands.pop()?;
                let left = self.stacks.operands.pop()?;
                Ok(ops::binary(op, left, right, self.strings_mut()?))
            }
            Opcode::Conditional
            | Opcode::Find { .. }
            | Opcode::Mid
            | Opcode::Token
            | Opcode::Span { .. } => {
                let third = self.stacks.operands.pop()?;
                let second = self.stacks.operands.pop()?;
                let first = self.stacks.operands.pop()?;
                Ok(ops::ternary(op, first, second, third, self.strings_mut()?))
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Context
    // ══════════════════════════════════════════════════════════════════════

    pub(crate) fn frame(&self) -> EvalResult<ExprFrame> {
        self.stacks
            .expressions
            .peek()
            .copied()
            .ok_or(EvalError::StackUnderflow {
                stack: "expression",
            })
    }

    pub(crate) fn formset(&self, handle: FormSetHandle) -> EvalResult<&FormSet> {
        self.formsets
            .get(&handle)
            .ok_or_else(|| EvalError::NotFound(format!("form set {handle}")))
    }

    pub(crate) fn formset_mut(&mut self, handle: FormSetHandle) -> EvalResult<&mut FormSet> {
        self.formsets
            .get_mut(&handle)
            .ok_or_else(|| EvalError::NotFound(format!("form set {handle}")))
    }

    fn strings_mut(&mut self) -> EvalResult<&mut dyn StringTable> {
        let frame = self.frame()?;
        Ok(&mut *self.formset_mut(frame.formset)?.strings)
    }

    fn equals(&mut self, left: &TypedValue, right: &TypedValue) -> EvalResult<TypedValue> {
        let strings = self.strings_mut()?;
        Ok(match ops::compare(strings, left, right) {
            Some(ord) => TypedValue::Bool(ord == Ordering::Equal),
            None => TypedValue::Undefined,
        })
    }

    fn string_ref(&mut self, id: StringId) -> EvalResult<TypedValue> {
        let frame = self.frame()?;
        let known = self.formset(frame.formset)?.strings.get(id).is_some();
        Ok(if known {
            TypedValue::String(id)
        } else {
            TypedValue::Undefined
        })
    }

    fn pop_question_id(&mut self) -> EvalResult<QuestionId> {
        let raw = self.stacks.operands.pop()?;
        raw.as_u64()
            .and_then(|v| u16::try_from(v).ok())
            .map(QuestionId)
            .ok_or(EvalError::Undefined)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Question references
    // ══════════════════════════════════════════════════════════════════════

    /// Live value of a question of the current form set, looked up in the
    /// current form first.
    fn question_value(&mut self, id: QuestionId) -> EvalResult<TypedValue> {
        let frame = self.frame()?;
        self.question_value_in(frame.formset, Some(frame.form), id)
    }

    pub(crate) fn question_value_in(
        &mut self,
        handle: FormSetHandle,
        form: Option<FormId>,
        id: QuestionId,
    ) -> EvalResult<TypedValue> {
        let fs = self.formset(handle)?;
        let question = fs
            .find_question(form, id)
            .ok_or_else(|| EvalError::NotFound(format!("question {id}")))?;
        let external = question
            .storage
            .and_then(|s| fs.storage(s))
            .is_some_and(|s| matches!(s.backing, StorageBacking::Variable { .. }));
        if !external {
            return Ok(question.value.clone());
        }

        // External variables can change behind the engine's back.
        let value = self.read_question(handle, id, ValueSource::Edit)?;
        if let Some(q) = self.formset_mut(handle)?.question_mut(id) {
            q.value = value.clone();
        }
        Ok(value)
    }

    /// Value of a question in the form set identified by `guid`. String
    /// values are re-interned into the current form set's table.
    fn foreign_question_value(&mut self, guid: &Uuid, id: QuestionId) -> EvalResult<TypedValue> {
        let frame = self.frame()?;
        let handle = self
            .formsets
            .values()
            .find(|fs| &fs.guid == guid)
            .map(|fs| fs.handle)
            .ok_or_else(|| EvalError::NotFound(format!("form set {guid}")))?;
        let value = self.question_value_in(handle, None, id)?;
        if handle == frame.formset {
            return Ok(value);
        }
        match value {
            TypedValue::String(foreign) => {
                let text = self
                    .formset(handle)?
                    .resolve(foreign)
                    .ok_or(EvalError::Undefined)?;
                Ok(TypedValue::String(self.strings_mut()?.intern(&text)))
            }
            other => Ok(other),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Rules and maps
    // ══════════════════════════════════════════════════════════════════════

    fn rule(&mut self, rule: setup_types::RuleId) -> EvalResult<TypedValue> {
        let frame = self.frame()?;
        let expr = self
            .formset(frame.formset)?
            .form(frame.form)
            .and_then(|f| f.rules.get(&rule))
            .copied()
            .ok_or_else(|| EvalError::NotFound(format!("rule {rule} in form {}", frame.form)))?;

        let marker = ScopeMarker::Rule {
            formset: frame.formset,
            form: frame.form,
            rule,
        };
        if self.stacks.scopes.contains(&marker) {
            warn!(formset = %frame.formset, form = %frame.form, %rule, "rule references itself");
            return Ok(TypedValue::Undefined);
        }
        let depth = self
            .stacks
            .scopes
            .visible()
            .iter()
            .filter(|m| matches!(m, ScopeMarker::Rule { .. }))
            .count();
        if depth >= self.config.max_rule_depth {
            warn!(%rule, depth, "rule nesting too deep");
            return Ok(TypedValue::Undefined);
        }

        self.stacks.scopes.push(marker);
        let result = self.evaluate(frame.formset, frame.form, expr);
        self.stacks.scopes.pop()?;
        Ok(result.unwrap_or_default())
    }

    fn map(&mut self, clauses: &[MapClause]) -> EvalResult<TypedValue> {
        let subject = self.stacks.operands.pop()?;
        self.stacks.maps.push(MapFrame { subject, clause: 0 });
        let result = self.map_clauses(clauses);
        self.stacks.maps.pop()?;
        result
    }

    /// First clause whose condition equals the subject wins.
    fn map_clauses(&mut self, clauses: &[MapClause]) -> EvalResult<TypedValue> {
        for (index, clause) in clauses.iter().enumerate() {
            if let Some(frame) = self.stacks.maps.peek_mut() {
                frame.clause = index;
            }
            let condition = match self.run(&clause.condition) {
                Ok(value) => value,
                Err(EvalError::Undefined) => continue,
                Err(err) => return Err(err),
            };
            let subject = self
                .stacks
                .maps
                .peek()
                .map(|frame| frame.subject.clone())
                .ok_or(EvalError::StackUnderflow { stack: "map" })?;
            if self.equals(&subject, &condition)? == TypedValue::Bool(true) {
                return self.run(&clause.value);
            }
        }
        Ok(TypedValue::Undefined)
    }
}
