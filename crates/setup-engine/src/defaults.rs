//! Default values for questions.
//!
//! For one question and default class the first source that answers wins:
//!
//! 1. the host's [`DefaultSource`](crate::host::DefaultSource),
//! 2. a question default declared for the class (expression over literal),
//! 3. option or checkbox default flags for the standard and manufacturing
//!    classes,
//! 4. a fallback: first visible option, numeric minimum, or `false`.

use setup_types::package::QuestionKind;
use setup_types::{DefaultId, QuestionId, TypedValue, ValueKind};
use tracing::debug;

use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::form::{FormSetHandle, Question};

impl Evaluator<'_> {
    /// Default of question `id` for class `default_id`, or `None` when the
    /// question has none.
    pub fn default_value(
        &mut self,
        handle: FormSetHandle,
        id: QuestionId,
        default_id: DefaultId,
    ) -> EvalResult<Option<TypedValue>> {
        let fs = self.formset(handle)?;
        let guid = fs.guid;
        let question = fs
            .question(id)
            .ok_or_else(|| EvalError::NotFound(format!("question {id}")))?
            .clone();

        if let Some(source) = self.host.defaults.as_mut() {
            if let Some(value) = source.default_value(&guid, id, default_id) {
                debug!(question = %id, %default_id, "default from host");
                return Ok(Some(value));
            }
        }

        for declared in question.defaults.iter().filter(|d| d.default_id == default_id) {
            if let Some(expr) = declared.expr {
                match self.evaluate(handle, question.form, expr) {
                    Ok(value) => return Ok(Some(value)),
                    Err(err) => debug!(question = %id, "default expression failed: {err}"),
                }
            }
            if let Some(value) = &declared.value {
                return Ok(Some(value.clone()));
            }
        }

        if let Some(value) = self.flagged_default(&question, default_id) {
            return Ok(Some(value));
        }
        Ok(self.fallback_default(handle, &question))
    }

    fn flagged_default(&self, question: &Question, default_id: DefaultId) -> Option<TypedValue> {
        let standard = default_id == self.config.standard_default_id;
        let manufacturing = default_id == self.config.manufacturing_default_id;
        if !standard && !manufacturing {
            return None;
        }
        match &question.kind {
            QuestionKind::CheckBox {
                default,
                default_mfg,
            } => Some(TypedValue::Bool(if standard { *default } else { *default_mfg })),
            QuestionKind::OneOf { .. } => question
                .options
                .iter()
                .find(|o| if standard { o.default } else { o.default_mfg })
                .map(|o| coerce(&o.value, question.value_kind())),
            _ => None,
        }
    }

    fn fallback_default(&mut self, handle: FormSetHandle, question: &Question) -> Option<TypedValue> {
        match &question.kind {
            QuestionKind::Numeric { minimum, .. } => {
                Some(TypedValue::from_u64(question.value_kind(), *minimum))
            }
            QuestionKind::CheckBox { .. } => Some(TypedValue::Bool(false)),
            QuestionKind::OneOf { .. } => {
                for option in &question.options {
                    let gating = self.gating(handle, question.form, &option.conditions);
                    if !gating.is_hidden() {
                        return Some(coerce(&option.value, question.value_kind()));
                    }
                }
                None
            }
            QuestionKind::OrderedList {
                max_containers,
                item_width,
                ..
            } => {
                let width = usize::from(*item_width);
                let mut bytes = Vec::with_capacity(question.width());
                for option in question.options.iter().take(usize::from(*max_containers)) {
                    let mut item = option.value.to_le_bytes();
                    item.resize(width, 0);
                    bytes.extend_from_slice(&item);
                }
                bytes.resize(question.width(), 0);
                Some(TypedValue::Buffer(bytes))
            }
            _ => None,
        }
    }
}

/// Option values are declared with whatever integer kind is convenient;
/// store them with the question's kind.
fn coerce(value: &TypedValue, kind: ValueKind) -> TypedValue {
    match value.as_u64() {
        Some(raw) if kind.is_integer_like() => TypedValue::from_u64(kind, raw),
        _ => value.clone(),
    }
}
