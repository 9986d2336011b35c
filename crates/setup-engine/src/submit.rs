//! Submit and discard.
//!
//! Submit runs `Validating -> Committing -> Clean`: every `no_submit_if` of
//! a visible question in scope is checked first; only when none fires are
//! the changed elements of each storage routed to their provider. A storage
//! the provider partially applies commits the applied prefix and reports
//! the rest as a [`SaveFailure`].

use setup_configstr::{ConfigRequest, ConfigResp};
use setup_types::{FormId, QuestionId, StorageId, TypedValue};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::SubmitScope;
use crate::context::Selection;
use crate::engine::Engine;
use crate::error::BrowserResult;
use crate::form::{FormSetHandle, FormSetState};
use crate::host::{CallbackAction, SaveFailedChoice};
use crate::storage::{BufferCopy, StorageBacking, SyncDirection};

/// One storage the provider did not fully save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFailure {
    pub formset: FormSetHandle,
    pub storage: StorageId,
    pub storage_name: String,
    /// Form and question owning the first element that failed, if any.
    pub form: Option<FormId>,
    pub question: Option<QuestionId>,
    pub reason: String,
    /// Elements left unsaved.
    pub elements: ConfigRequest,
}

impl fmt::Display for SaveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "storage `{}` ({}) of form set {}: {}",
            self.storage_name, self.storage, self.formset, self.reason
        )
    }
}

/// Outcome of [`Engine::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStatus {
    Submitted,
    NothingToSubmit,
    /// A `no_submit_if` fired; nothing was routed.
    Rejected {
        formset: FormSetHandle,
        form: FormId,
        question: QuestionId,
        message: String,
    },
    /// Some storages could not be saved. `discarded` tells whether their
    /// edits were rolled back or kept for another attempt.
    SaveFailed {
        failures: Vec<SaveFailure>,
        discarded: bool,
    },
}

type PendingStorage = (FormSetHandle, StorageId, ConfigRequest);

/// A storage the provider stopped part way through.
struct PartialSave {
    reason: String,
    /// Elements saved before the provider stopped; already committed.
    applied: ConfigRequest,
    unsaved: ConfigRequest,
}

impl Engine {
    /// Submit the forms covered by `scope`, starting from `form`.
    pub fn submit(
        &mut self,
        handle: FormSetHandle,
        form: FormId,
        scope: SubmitScope,
    ) -> BrowserResult<SubmitStatus> {
        let forms = self.scope_forms(handle, form, scope)?;
        let handles: BTreeSet<FormSetHandle> = forms.iter().map(|(h, _)| *h).collect();
        for h in &handles {
            self.set_state(*h, FormSetState::Validating);
        }

        if let Some(rejection) = self.check_no_submit(&forms)? {
            for h in &handles {
                self.set_state(*h, FormSetState::Rejected);
            }
            if let SubmitStatus::Rejected {
                formset,
                form,
                question,
                message,
            } = &rejection
            {
                info!(formset = %formset, %question, "submit rejected: {message}");
                self.host.prompt.no_submit(message);
                self.context.current_mut().selection = Selection {
                    formset: Some(*formset),
                    form: Some(*form),
                    question: Some(*question),
                };
            }
            return Ok(rejection);
        }

        let pending = self.changed_storages(&forms)?;
        if pending.is_empty() {
            for h in &handles {
                self.set_state(*h, FormSetState::Clean);
            }
            info!(formset = %handle, ?scope, "nothing to submit");
            return Ok(SubmitStatus::NothingToSubmit);
        }

        for h in &handles {
            self.set_state(*h, FormSetState::Committing);
        }
        let mut failures = Vec::new();
        let mut committed = 0;
        for (h, storage, changed) in pending {
            match self.route_storage(h, storage, &changed) {
                Ok(()) => {
                    committed += 1;
                    self.notify_submitted(h, storage, &forms, None);
                }
                Err(partial) => {
                    if !partial.applied.is_empty() {
                        self.notify_submitted(h, storage, &forms, Some(&partial.applied));
                    }
                    failures.push(self.save_failure(h, storage, partial.reason, partial.unsaved));
                }
            }
        }

        if failures.is_empty() {
            for h in &handles {
                self.set_state(*h, FormSetState::Clean);
            }
            info!(formset = %handle, ?scope, storages = committed, "submitted");
            return Ok(SubmitStatus::Submitted);
        }

        for failure in &failures {
            warn!(formset = %failure.formset, storage = %failure.storage, "save failed: {}", failure.reason);
        }
        match self.host.prompt.save_failed(&failures) {
            SaveFailedChoice::Discard => {
                for failure in &failures {
                    self.restore_failed(failure)?;
                }
                for h in &handles {
                    self.set_state(*h, FormSetState::Clean);
                }
                Ok(SubmitStatus::SaveFailed {
                    failures,
                    discarded: true,
                })
            }
            SaveFailedChoice::Retry => {
                for h in &handles {
                    self.set_state(*h, FormSetState::Editing);
                }
                if let Some(first) = failures.first() {
                    self.context.current_mut().selection = Selection {
                        formset: Some(first.formset),
                        form: first.form,
                        question: first.question,
                    };
                }
                Ok(SubmitStatus::SaveFailed {
                    failures,
                    discarded: false,
                })
            }
        }
    }

    /// Throw away the edits of the forms covered by `scope`. Returns the
    /// questions whose value changed as a result.
    pub fn discard(
        &mut self,
        handle: FormSetHandle,
        form: FormId,
        scope: SubmitScope,
    ) -> BrowserResult<Vec<(FormSetHandle, QuestionId)>> {
        let forms = self.scope_forms(handle, form, scope)?;
        let handles: BTreeSet<FormSetHandle> = forms.iter().map(|(h, _)| *h).collect();
        let before = self.scoped_values(&forms)?;

        for ((h, storage), request) in self.scoped_requests(&forms)? {
            let Self { formsets, host, .. } = self;
            if let Some(target) = formsets
                .get_mut(&h)
                .and_then(|fs| fs.storages.get_mut(&storage))
            {
                target.synchronize(&*host.routing, Some(&request), SyncDirection::Restore)?;
            }
        }
        for h in &handles {
            self.evaluator().reload_values(*h, None)?;
            self.set_state(*h, FormSetState::Clean);
        }

        let after = self.scoped_values(&forms)?;
        let mut changed = Vec::new();
        for ((h, question), value) in after {
            if before.get(&(h, question)) != Some(&value) {
                self.notify(h, CallbackAction::Changed, question, &value);
                changed.push((h, question));
            }
        }
        info!(formset = %handle, ?scope, changed = changed.len(), "discarded");
        Ok(changed)
    }

    // ── Scope ────────────────────────────────────────────────────────────

    fn scope_forms(
        &self,
        handle: FormSetHandle,
        form: FormId,
        scope: SubmitScope,
    ) -> BrowserResult<Vec<(FormSetHandle, FormId)>> {
        self.form(handle, form)?;
        Ok(match scope {
            SubmitScope::Form => vec![(handle, form)],
            SubmitScope::FormSet => self
                .formset(handle)?
                .forms
                .iter()
                .map(|f| (handle, f.id))
                .collect(),
            SubmitScope::System => self
                .formsets
                .values()
                .flat_map(|fs| fs.forms.iter().map(move |f| (fs.handle, f.id)))
                .collect(),
        })
    }

    /// The storage elements the forms in scope reference, per storage.
    fn scoped_requests(
        &self,
        forms: &[(FormSetHandle, FormId)],
    ) -> BrowserResult<BTreeMap<(FormSetHandle, StorageId), ConfigRequest>> {
        let mut requests: BTreeMap<(FormSetHandle, StorageId), ConfigRequest> = BTreeMap::new();
        for (h, f) in forms {
            for (storage, fragment) in &self.form(*h, *f)?.requests {
                requests
                    .entry((*h, *storage))
                    .or_insert_with(|| ConfigRequest::new(fragment.header.clone()))
                    .merge(fragment);
            }
        }
        Ok(requests)
    }

    fn scoped_values(
        &self,
        forms: &[(FormSetHandle, FormId)],
    ) -> BrowserResult<BTreeMap<(FormSetHandle, QuestionId), TypedValue>> {
        let mut values = BTreeMap::new();
        for (h, f) in forms {
            for question in &self.form(*h, *f)?.questions {
                values.insert((*h, question.id), question.value.clone());
            }
        }
        Ok(values)
    }

    // ── Validation ───────────────────────────────────────────────────────

    fn check_no_submit(
        &mut self,
        forms: &[(FormSetHandle, FormId)],
    ) -> BrowserResult<Option<SubmitStatus>> {
        for (h, f) in forms {
            let guarded: Vec<(QuestionId, Vec<setup_types::ExprRef>)> = self
                .form(*h, *f)?
                .questions
                .iter()
                .filter(|q| !q.no_submit_if.is_empty())
                .map(|q| (q.id, q.no_submit_if.clone()))
                .collect();
            for (question, exprs) in guarded {
                if self.question_gating(*h, question)?.is_hidden() {
                    continue;
                }
                for expr in exprs {
                    if matches!(
                        self.evaluate_expression(*h, *f, expr),
                        Ok(TypedValue::Bool(true))
                    ) {
                        return Ok(Some(SubmitStatus::Rejected {
                            formset: *h,
                            form: *f,
                            question,
                            message: self.message_text(*h, expr),
                        }));
                    }
                }
            }
        }
        Ok(None)
    }

    fn changed_storages(
        &self,
        forms: &[(FormSetHandle, FormId)],
    ) -> BrowserResult<Vec<PendingStorage>> {
        let mut pending = Vec::new();
        for ((h, id), candidates) in self.scoped_requests(forms)? {
            let storage = self.storage(h, id)?;
            if matches!(storage.backing, StorageBacking::Variable { .. }) {
                continue;
            }
            let changed = storage.changed_elements(&candidates);
            if !changed.is_empty() {
                debug!(formset = %h, storage = %id, elements = changed.len(), "storage changed");
                pending.push((h, id, changed));
            }
        }
        Ok(pending)
    }

    // ── Commit ───────────────────────────────────────────────────────────

    /// Save the changed elements of one storage. On failure whatever was
    /// saved has already been committed.
    fn route_storage(
        &mut self,
        handle: FormSetHandle,
        id: StorageId,
        changed: &ConfigRequest,
    ) -> Result<(), PartialSave> {
        let Self { formsets, host, .. } = self;
        let all_failed = |reason: String| PartialSave {
            reason,
            applied: ConfigRequest::new(changed.header.clone()),
            unsaved: changed.clone(),
        };
        let storage = formsets
            .get_mut(&handle)
            .and_then(|fs| fs.storages.get_mut(&id))
            .ok_or_else(|| all_failed(format!("storage {id} is gone")))?;

        if let StorageBacking::VariableBuffer { store, attributes } = &storage.backing {
            let data = store.bytes(BufferCopy::Edit).to_vec();
            let attributes = *attributes;
            host.variables
                .set_variable(&storage.guid, &storage.name, attributes, &data)
                .map_err(|err| all_failed(err.to_string()))?;
            return storage
                .synchronize(&*host.routing, Some(changed), SyncDirection::Commit)
                .map_err(|err| all_failed(err.to_string()));
        }

        let text = storage
            .edit_response(&*host.routing, changed)
            .map_err(|err| all_failed(err.to_string()))?;
        match host.routing.route_config(&text) {
            Ok(()) => storage
                .synchronize(&*host.routing, Some(changed), SyncDirection::Commit)
                .map_err(|err| all_failed(err.to_string())),
            Err(failure) => {
                let (applied, unsaved) = split_at_progress(changed, &text, failure.progress);
                if !applied.is_empty() {
                    storage
                        .synchronize(&*host.routing, Some(&applied), SyncDirection::Commit)
                        .map_err(|err| all_failed(err.to_string()))?;
                }
                Err(PartialSave {
                    reason: failure.reason,
                    applied,
                    unsaved,
                })
            }
        }
    }

    fn save_failure(
        &self,
        handle: FormSetHandle,
        storage: StorageId,
        reason: String,
        elements: ConfigRequest,
    ) -> SaveFailure {
        let fs = self.formsets.get(&handle);
        let owner = fs.and_then(|fs| {
            let first = elements.elements().first()?;
            fs.questions().find(|q| {
                q.storage == Some(storage) && q.element.as_ref().is_some_and(|e| e.overlaps(first))
            })
        });
        SaveFailure {
            formset: handle,
            storage,
            storage_name: fs
                .and_then(|fs| fs.storage(storage))
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            form: owner.map(|q| q.form),
            question: owner.map(|q| q.id),
            reason,
            elements,
        }
    }

    fn restore_failed(&mut self, failure: &SaveFailure) -> BrowserResult<()> {
        let Self { formsets, host, .. } = self;
        if let Some(storage) = formsets
            .get_mut(&failure.formset)
            .and_then(|fs| fs.storages.get_mut(&failure.storage))
        {
            storage.synchronize(
                &*host.routing,
                Some(&failure.elements),
                SyncDirection::Restore,
            )?;
        }
        self.evaluator()
            .reload_values(failure.formset, Some(failure.storage))?;
        Ok(())
    }

    /// Tell the callback about every saved question of `storage` in scope,
    /// or only those overlapping `saved` when the provider stopped part way.
    /// Password values are never echoed back.
    fn notify_submitted(
        &mut self,
        handle: FormSetHandle,
        storage: StorageId,
        forms: &[(FormSetHandle, FormId)],
        saved: Option<&ConfigRequest>,
    ) {
        let Some(fs) = self.formsets.get(&handle) else {
            return;
        };
        let targets: Vec<(QuestionId, TypedValue)> = fs
            .forms
            .iter()
            .filter(|f| forms.contains(&(handle, f.id)))
            .flat_map(|f| f.questions.iter())
            .filter(|q| q.storage == Some(storage) && q.flags.callback && !q.is_password())
            .filter(|q| match (saved, &q.element) {
                (None, _) => true,
                (Some(saved), Some(element)) => saved.elements().iter().any(|e| e.overlaps(element)),
                (Some(_), None) => false,
            })
            .map(|q| (q.id, q.value.clone()))
            .collect();
        for (question, value) in targets {
            self.invoke_callback(handle, CallbackAction::Submitted, question, &value);
        }
    }
}

/// Split `changed` at the entry of `text` the provider stopped at.
/// Without a usable position every element counts as unsaved.
fn split_at_progress(
    changed: &ConfigRequest,
    text: &str,
    progress: usize,
) -> (ConfigRequest, ConfigRequest) {
    let mut applied = ConfigRequest::new(changed.header.clone());
    let mut unsaved = ConfigRequest::new(changed.header.clone());
    let parsed = ConfigResp::parse(text)
        .ok()
        .and_then(|resp| resp.entry_at(progress).map(|cut| (resp, cut)));
    match parsed {
        Some((resp, cut)) => {
            for (index, entry) in resp.entries.into_iter().enumerate() {
                if index < cut {
                    applied.push(entry.element);
                } else {
                    unsaved.push(entry.element);
                }
            }
        }
        None => {
            for element in changed.elements() {
                unsaved.push(element.clone());
            }
        }
    }
    (applied, unsaved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use setup_configstr::{ConfigElement, ConfigHeader};
    use uuid::Uuid;

    #[test]
    fn test_split_at_rejected_entry() {
        let header = ConfigHeader::new(Uuid::nil(), "Setup");
        let mut changed = ConfigRequest::new(header.clone());
        changed.push(ConfigElement::block(0, 1));
        changed.push(ConfigElement::block(4, 2));

        let mut resp = ConfigResp::new(header);
        resp.push(ConfigElement::block(0, 1), "01");
        resp.push(ConfigElement::block(4, 2), "0200");
        let text = resp.render();
        let progress = resp.entries[1].position;

        let (applied, unsaved) = split_at_progress(&changed, &text, progress);
        assert_eq!(applied.elements(), &[ConfigElement::block(0, 1)]);
        assert_eq!(unsaved.elements(), &[ConfigElement::block(4, 2)]);
    }

    #[test]
    fn test_split_without_position_fails_everything() {
        let mut changed = ConfigRequest::new(ConfigHeader::new(Uuid::nil(), "Setup"));
        changed.push(ConfigElement::block(0, 1));
        let (applied, unsaved) = split_at_progress(&changed, "not a response", 0);
        assert!(applied.is_empty());
        assert_eq!(unsaved.len(), 1);
    }
}
