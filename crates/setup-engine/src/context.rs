//! Browser context and the context stack used across callbacks.

use serde::Serialize;
use setup_types::{DefaultId, FormId, QuestionId};

use crate::form::FormSetHandle;

/// Where the browser currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Selection {
    pub formset: Option<FormSetHandle>,
    pub form: Option<FormId>,
    pub question: Option<QuestionId>,
}

/// Mutable browser state that a provider callback may change when it
/// re-enters the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EngineContext {
    pub selection: Selection,
    /// Forms the browser has open, in opening order.
    pub open_forms: Vec<(FormSetHandle, FormId)>,
    /// Default class being extracted, if an extraction is in progress.
    pub pending_default: Option<DefaultId>,
    /// Set while committed values are being retrieved from providers.
    pub retrieve_pending: bool,
}

impl EngineContext {
    pub fn is_form_open(&self, formset: FormSetHandle, form: FormId) -> bool {
        self.open_forms.contains(&(formset, form))
    }
}

/// The current context plus the snapshots saved by enclosing callbacks.
#[derive(Debug, Clone, Default)]
pub struct ContextStack {
    current: EngineContext,
    saved: Vec<EngineContext>,
}

impl ContextStack {
    pub fn current(&self) -> &EngineContext {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut EngineContext {
        &mut self.current
    }

    /// Snapshot the current context before handing control to a callback.
    /// The callback starts from a copy of it.
    pub fn save(&mut self) {
        self.saved.push(self.current.clone());
    }

    /// Drop whatever the callback left behind and reinstate the snapshot.
    /// Returns `false` when there was nothing to restore.
    pub fn restore(&mut self) -> bool {
        match self.saved.pop() {
            Some(context) => {
                self.current = context;
                true
            }
            None => false,
        }
    }

    /// Number of saved snapshots, i.e. how deeply callbacks are nested.
    pub fn depth(&self) -> usize {
        self.saved.len()
    }
}
