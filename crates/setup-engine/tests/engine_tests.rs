//! Integration tests for the setup browser engine.
//!
//! Covers: opening a form set against in-memory providers, question value
//! reads and writes across the four storage kinds, bit fields and the
//! clock, submit (success, NoSubmit rejection, partial provider failure
//! with discard and retry), discard, default extraction, gating, the
//! interactive change path and re-entrant callbacks.

use setup_configstr::ConfigElement;
use setup_engine::{
    BrowserError, BufferCopy, CallbackAction, CallbackResponse, DefaultTable, Engine,
    EngineConfig, FixedChoice, FormCallback, FormSetHandle, FormSetState, Gating, Host,
    MemoryRouting, MemoryVariables, ProviderData, SaveFailedChoice, SubmitScope, SubmitStatus,
    SyncDirection, ValueSource,
};
use setup_types::package::FormSetPackage;
use setup_types::{DefaultId, FormId, HiiDate, QuestionId, StorageId, TypedValue};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use uuid::Uuid;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const PLATFORM: &str = r#"{
    "guid": "5e7a0000-0000-4000-8000-000000000001",
    "title": 1,
    "strings": [
        {"id": 1, "text": "Platform"},
        {"id": 2, "text": "Value too large"},
        {"id": 3, "text": "Conflicting value"},
        {"id": 4, "text": "Unusual value"}
    ],
    "storages": [
        {"id": 1, "guid": "5e7a0000-0000-4000-8000-0000000000aa", "name": "Setup",
         "kind": {"type": "buffer", "size": 8}},
        {"id": 2, "guid": "5e7a0000-0000-4000-8000-0000000000bb", "name": "Lang",
         "kind": {"type": "name_value", "names": ["Lang", "Count"]}},
        {"id": 3, "guid": "5e7a0000-0000-4000-8000-0000000000cc", "name": "Boot",
         "kind": {"type": "variable_buffer", "size": 4}},
        {"id": 4, "guid": "5e7a0000-0000-4000-8000-0000000000dd", "name": "Vars",
         "kind": {"type": "variable"}}
    ],
    "forms": [
        {"id": 1, "title": 1, "items": [
            {"item": "question", "id": 1, "storage": 1, "addressing": {"offset": 0},
             "kind": {"type": "numeric", "width": 1, "maximum": 200},
             "flags": {"callback": true},
             "no_submit_if": [{"message": 2, "opcodes": [
                 {"op": "question_ref1", "question": 1},
                 {"op": "constant", "value": {"U64": 100}},
                 {"op": "greater_than"}]}]},
            {"item": "question", "id": 2, "storage": 1, "addressing": {"offset": 2},
             "kind": {"type": "numeric", "width": 2},
             "defaults": [{"default_id": 0, "value": {"U16": 42}}],
             "inconsistent_if": [{"message": 3, "opcodes": [
                 {"op": "question_ref1", "question": 2},
                 {"op": "constant", "value": {"U16": 1000}},
                 {"op": "greater_than"}]}],
             "warning_if": [{"message": 4, "opcodes": [
                 {"op": "question_ref1", "question": 2},
                 {"op": "constant", "value": {"U16": 500}},
                 {"op": "greater_than"}]}]},
            {"item": "question", "id": 3, "storage": 1,
             "addressing": {"bits": {"bit_offset": 33, "bit_width": 1}},
             "kind": {"type": "check_box", "default": true}},
            {"item": "question", "id": 4, "storage": 1, "addressing": {"offset": 5},
             "kind": {"type": "one_of", "width": 1, "options": [
                 {"value": {"U8": 1},
                  "conditions": [{"kind": "suppress_if", "opcodes": [{"op": "true"}]}]},
                 {"value": {"U8": 2}},
                 {"value": {"U8": 3}, "default": true}]}},
            {"item": "scope",
             "condition": {"kind": "suppress_if", "opcodes": [
                 {"op": "question_ref1", "question": 1},
                 {"op": "constant", "value": {"U8": 50}},
                 {"op": "greater_than"}]},
             "items": [
                 {"item": "question", "id": 5, "kind": {"type": "numeric", "width": 1}}
             ]},
            {"item": "question", "id": 6, "storage": 1, "addressing": {"offset": 6},
             "kind": {"type": "numeric", "width": 1}, "flags": {"read_only": true}}
        ]},
        {"id": 2, "items": [
            {"item": "question", "id": 10, "storage": 2, "addressing": {"name": "Count"},
             "kind": {"type": "numeric", "width": 1}},
            {"item": "question", "id": 11, "storage": 2, "addressing": {"name": "Lang"},
             "kind": {"type": "string", "max_size": 8}}
        ]},
        {"id": 3, "items": [
            {"item": "question", "id": 20, "storage": 3, "addressing": {"offset": 0},
             "kind": {"type": "numeric", "width": 2}}
        ]},
        {"id": 4, "items": [
            {"item": "question", "id": 30, "kind": {"type": "date"}},
            {"item": "question", "id": 31, "storage": 4, "addressing": {"name": "Level"},
             "kind": {"type": "numeric", "width": 1}}
        ]}
    ]
}"#;

const HANDLE: FormSetHandle = FormSetHandle(1);
const MAIN: FormId = FormId(1);

fn guid(last: u8) -> Uuid {
    Uuid::parse_str(&format!("5e7a0000-0000-4000-8000-0000000000{last:02x}")).unwrap()
}

fn setup_guid() -> Uuid {
    guid(0xaa)
}

fn q(id: u16) -> QuestionId {
    QuestionId(id)
}

/// In-memory collaborators with every storage present.
struct Rig {
    routing: MemoryRouting,
    variables: MemoryVariables,
}

impl Rig {
    fn new() -> Self {
        let routing = MemoryRouting::new();
        routing.insert(setup_guid(), "Setup", ProviderData::Block(vec![0; 8]));
        let names: BTreeMap<String, String> = [
            ("Lang".to_string(), "0065006e".to_string()),
            ("Count".to_string(), "03".to_string()),
        ]
        .into_iter()
        .collect();
        routing.insert(guid(0xbb), "Lang", ProviderData::Names(names));

        let variables = MemoryVariables::new();
        variables.insert(guid(0xcc), "Boot", vec![0x34, 0x12, 0, 0]);
        variables.insert(guid(0xdd), "Level", b"07".to_vec());
        Self { routing, variables }
    }

    fn host(&self) -> Host {
        Host::new(self.routing.clone(), self.variables.clone())
    }

    fn engine(&self) -> Engine {
        self.engine_with(self.host())
    }

    fn engine_with(&self, host: Host) -> Engine {
        let mut engine = Engine::new(host, EngineConfig::default());
        let package = FormSetPackage::from_json(PLATFORM).unwrap();
        assert!(engine.open_formset(HANDLE, &package).unwrap());
        engine
    }
}

fn value(engine: &Engine, id: u16) -> TypedValue {
    engine.question_value(HANDLE, q(id)).unwrap()
}

fn set(engine: &mut Engine, id: u16, v: TypedValue) {
    engine
        .set_question_value(HANDLE, q(id), &v, ValueSource::Edit)
        .unwrap();
}

fn setup_bytes(engine: &Engine, copy: BufferCopy) -> Vec<u8> {
    engine
        .storage(HANDLE, StorageId(1))
        .unwrap()
        .buffer()
        .unwrap()
        .bytes(copy)
        .to_vec()
}

fn state(engine: &Engine) -> FormSetState {
    engine.formset(HANDLE).unwrap().state
}

type Event = (CallbackAction, QuestionId, TypedValue, usize);

/// Records every callback; optionally vetoes large values and re-enters
/// the engine on `Changed`.
#[derive(Clone, Default)]
struct Recorder {
    events: Rc<RefCell<Vec<Event>>>,
    veto_above: Option<u64>,
    reenter: bool,
}

impl FormCallback for Recorder {
    fn callback(
        &mut self,
        engine: &mut Engine,
        formset: FormSetHandle,
        action: CallbackAction,
        question: QuestionId,
        value: &TypedValue,
    ) -> CallbackResponse {
        self.events
            .borrow_mut()
            .push((action, question, value.clone(), engine.callback_depth()));
        if action == CallbackAction::Changing {
            if let (Some(limit), Some(raw)) = (self.veto_above, value.as_u64()) {
                if raw > limit {
                    return CallbackResponse::Veto(format!("{raw} exceeds {limit}"));
                }
            }
        }
        if self.reenter && action == CallbackAction::Changed {
            engine.open_form(formset, FormId(2)).unwrap();
            engine
                .set_question_value(formset, q(2), &TypedValue::U16(77), ValueSource::Edit)
                .unwrap();
        }
        CallbackResponse::Accept
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Opening
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn open_loads_values_from_every_storage_kind() {
    let rig = Rig::new();
    let engine = rig.engine();

    assert_eq!(value(&engine, 1), TypedValue::U8(0));
    assert_eq!(value(&engine, 10), TypedValue::U8(3));
    let TypedValue::String(lang) = value(&engine, 11) else {
        panic!("expected a string value");
    };
    assert_eq!(engine.resolve_string(HANDLE, lang).as_deref(), Some("en"));
    assert_eq!(value(&engine, 20), TypedValue::U16(0x1234));
    assert_eq!(value(&engine, 30), TypedValue::Date(HiiDate::new(2000, 1, 1)));
    assert_eq!(value(&engine, 31), TypedValue::U8(7));
    assert_eq!(state(&engine), FormSetState::Clean);
}

#[test]
fn open_unchanged_package_reuses_form_set() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    set(&mut engine, 1, TypedValue::U8(9));

    let package = FormSetPackage::from_json(PLATFORM).unwrap();
    assert!(!engine.open_formset(HANDLE, &package).unwrap());
    assert_eq!(value(&engine, 1), TypedValue::U8(9));
}

#[test]
fn open_falls_back_to_defaults_when_provider_has_no_data() {
    let rig = Rig::new();
    rig.routing.set_unavailable(setup_guid(), "Setup");
    let engine = rig.engine();

    assert_eq!(value(&engine, 2), TypedValue::U16(42));
    assert_eq!(value(&engine, 3), TypedValue::Bool(true));
    assert_eq!(value(&engine, 4), TypedValue::U8(3));
    // Defaults land in both copies: nothing is pending.
    assert_eq!(
        setup_bytes(&engine, BufferCopy::Edit),
        setup_bytes(&engine, BufferCopy::Committed)
    );
    assert_eq!(setup_bytes(&engine, BufferCopy::Committed)[2], 42);
}

#[test]
fn validate_drops_stale_form_sets() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    engine.open_form(HANDLE, MAIN).unwrap();

    assert_eq!(engine.validate_formsets(&[FormSetHandle(9)]), vec![HANDLE]);
    assert!(engine.handles().is_empty());
    assert!(engine.context().open_forms.is_empty());
    assert!(matches!(
        engine.question_value(HANDLE, q(1)),
        Err(BrowserError::UnknownFormSet(_))
    ));
}

#[test]
fn open_and_close_form_track_request_sets() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    engine.open_form(HANDLE, MAIN).unwrap();

    let storage = engine.storage(HANDLE, StorageId(1)).unwrap();
    assert!(storage.config_request.contains(&ConfigElement::block(0, 1)));
    assert!(storage.config_request.contains(&ConfigElement::block(4, 1)));
    assert!(engine.context().is_form_open(HANDLE, MAIN));

    engine.close_form(HANDLE, MAIN).unwrap();
    assert!(engine
        .storage(HANDLE, StorageId(1))
        .unwrap()
        .config_request
        .is_empty());
    assert!(!engine.context().is_form_open(HANDLE, MAIN));
}

// ══════════════════════════════════════════════════════════════════════════════
// Question values
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn set_writes_edit_copy_only() {
    let rig = Rig::new();
    let mut engine = rig.engine();

    set(&mut engine, 1, TypedValue::U8(5));
    assert_eq!(
        engine
            .get_question_value(HANDLE, q(1), ValueSource::Edit)
            .unwrap(),
        TypedValue::U8(5)
    );
    assert_eq!(setup_bytes(&engine, BufferCopy::Committed)[0], 0);
    assert_eq!(
        engine
            .get_question_value(HANDLE, q(1), ValueSource::Committed)
            .unwrap(),
        TypedValue::U8(0)
    );
    assert_eq!(state(&engine), FormSetState::Editing);

    engine
        .synchronize(HANDLE, StorageId(1), SyncDirection::Commit)
        .unwrap();
    assert_eq!(setup_bytes(&engine, BufferCopy::Committed)[0], 5);
}

#[test]
fn provider_source_reads_the_provider() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    rig.routing.insert(
        setup_guid(),
        "Setup",
        ProviderData::Block(vec![0x21, 0, 0, 0, 0, 0, 0, 0]),
    );

    assert_eq!(
        engine
            .get_question_value(HANDLE, q(1), ValueSource::Provider)
            .unwrap(),
        TypedValue::U8(0x21)
    );
    assert_eq!(value(&engine, 1), TypedValue::U8(0));
}

#[test]
fn commit_then_restore_leaves_edit_unchanged() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    set(&mut engine, 2, TypedValue::U16(0x0304));
    let before = setup_bytes(&engine, BufferCopy::Edit);

    engine
        .synchronize(HANDLE, StorageId(1), SyncDirection::Commit)
        .unwrap();
    engine
        .synchronize(HANDLE, StorageId(1), SyncDirection::Restore)
        .unwrap();
    assert_eq!(setup_bytes(&engine, BufferCopy::Edit), before);
}

#[test]
fn bit_field_question_touches_only_its_bit() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    set(&mut engine, 4, TypedValue::U8(2));

    set(&mut engine, 3, TypedValue::Bool(true));
    let edit = setup_bytes(&engine, BufferCopy::Edit);
    assert_eq!(edit[4], 0b10);
    assert_eq!(edit[5], 2);
    assert_eq!(
        engine
            .get_question_value(HANDLE, q(3), ValueSource::Edit)
            .unwrap(),
        TypedValue::Bool(true)
    );
}

#[test]
fn variable_storage_writes_through() {
    let rig = Rig::new();
    let mut engine = rig.engine();

    set(&mut engine, 31, TypedValue::U8(9));
    assert_eq!(rig.variables.variable(guid(0xdd), "Level"), Some(b"09".to_vec()));
    assert_eq!(
        engine
            .get_question_value(HANDLE, q(31), ValueSource::Edit)
            .unwrap(),
        TypedValue::U8(9)
    );
}

#[test]
fn clock_question_sets_platform_time() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    let date = HiiDate::new(2024, 5, 6);

    engine
        .set_question_value(HANDLE, q(30), &TypedValue::Date(date), ValueSource::Committed)
        .unwrap();
    assert_eq!(rig.variables.clock().0, HiiDate::new(2000, 1, 1));

    set(&mut engine, 30, TypedValue::Date(date));
    assert_eq!(rig.variables.clock().0, date);
}

#[test]
fn unknown_question_is_reported() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    let err = engine
        .get_question_value(HANDLE, q(99), ValueSource::Edit)
        .unwrap_err();
    assert!(matches!(err, BrowserError::UnknownQuestion { .. }));
}

// ══════════════════════════════════════════════════════════════════════════════
// Submit
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn submit_routes_changed_elements() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    set(&mut engine, 1, TypedValue::U8(7));

    let status = engine.submit(HANDLE, MAIN, SubmitScope::Form).unwrap();
    assert_eq!(status, SubmitStatus::Submitted);
    assert_eq!(rig.routing.routed(), 1);
    assert_eq!(
        rig.routing.data(setup_guid(), "Setup"),
        Some(ProviderData::Block(vec![7, 0, 0, 0, 0, 0, 0, 0]))
    );
    assert_eq!(setup_bytes(&engine, BufferCopy::Committed)[0], 7);
    assert_eq!(state(&engine), FormSetState::Clean);
}

#[test]
fn submit_without_changes_routes_nothing() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    let status = engine.submit(HANDLE, MAIN, SubmitScope::FormSet).unwrap();
    assert_eq!(status, SubmitStatus::NothingToSubmit);
    assert_eq!(rig.routing.routed(), 0);
}

#[test]
fn no_submit_rejects_before_any_storage_is_touched() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    set(&mut engine, 1, TypedValue::U8(150));

    let status = engine.submit(HANDLE, MAIN, SubmitScope::Form).unwrap();
    assert_eq!(
        status,
        SubmitStatus::Rejected {
            formset: HANDLE,
            form: MAIN,
            question: q(1),
            message: "Value too large".into(),
        }
    );
    assert_eq!(rig.routing.routed(), 0);
    assert_eq!(setup_bytes(&engine, BufferCopy::Committed)[0], 0);
    assert_eq!(state(&engine), FormSetState::Rejected);
    assert_eq!(engine.context().selection.question, Some(q(1)));
}

#[test]
fn partial_failure_commits_prefix_and_discards_rest() {
    let rig = Rig::new();
    rig.routing
        .reject(setup_guid(), "Setup", ConfigElement::block(2, 2));
    let mut engine = rig.engine();
    set(&mut engine, 1, TypedValue::U8(7));
    set(&mut engine, 2, TypedValue::U16(0x1234));

    let status = engine.submit(HANDLE, MAIN, SubmitScope::Form).unwrap();
    let SubmitStatus::SaveFailed {
        failures,
        discarded,
    } = status
    else {
        panic!("expected a save failure, got {status:?}");
    };
    assert!(discarded);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].storage, StorageId(1));
    assert_eq!(failures[0].storage_name, "Setup");
    assert_eq!(failures[0].question, Some(q(2)));
    assert!(failures[0].elements.contains(&ConfigElement::block(2, 2)));

    // The element applied before the rejection is committed and kept.
    assert_eq!(setup_bytes(&engine, BufferCopy::Committed)[0], 7);
    assert_eq!(value(&engine, 1), TypedValue::U8(7));
    // The rejected one is rolled back.
    assert_eq!(value(&engine, 2), TypedValue::U16(0));
    assert_eq!(&setup_bytes(&engine, BufferCopy::Edit)[2..4], &[0, 0]);
    assert_eq!(state(&engine), FormSetState::Clean);
}

#[test]
fn partial_failure_reports_submitted_for_applied_questions() {
    let rig = Rig::new();
    rig.routing
        .reject(setup_guid(), "Setup", ConfigElement::block(2, 2));
    let mut engine = rig.engine();
    let recorder = Recorder::default();
    let events = recorder.events.clone();
    engine.set_callback(HANDLE, recorder).unwrap();
    set(&mut engine, 1, TypedValue::U8(7));
    set(&mut engine, 2, TypedValue::U16(0x1234));

    let status = engine.submit(HANDLE, MAIN, SubmitScope::Form).unwrap();
    assert!(matches!(status, SubmitStatus::SaveFailed { .. }));

    let submitted: Vec<(QuestionId, TypedValue)> = events
        .borrow()
        .iter()
        .filter(|e| e.0 == CallbackAction::Submitted)
        .map(|e| (e.1, e.2.clone()))
        .collect();
    assert_eq!(submitted, vec![(q(1), TypedValue::U8(7))]);
}

#[test]
fn partial_failure_retry_keeps_edits() {
    let rig = Rig::new();
    rig.routing
        .reject(setup_guid(), "Setup", ConfigElement::block(2, 2));
    let host = rig
        .host()
        .with_prompt(FixedChoice(SaveFailedChoice::Retry));
    let mut engine = rig.engine_with(host);
    set(&mut engine, 2, TypedValue::U16(0x1234));

    let status = engine.submit(HANDLE, MAIN, SubmitScope::Form).unwrap();
    assert!(matches!(
        status,
        SubmitStatus::SaveFailed {
            discarded: false,
            ..
        }
    ));
    assert_eq!(value(&engine, 2), TypedValue::U16(0x1234));
    assert_eq!(state(&engine), FormSetState::Editing);
    assert_eq!(engine.context().selection.question, Some(q(2)));
}

#[test]
fn submit_name_value_storage() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    let outcome = engine
        .change_question(HANDLE, q(10), TypedValue::U8(4))
        .unwrap();
    assert!(outcome.applied);

    let status = engine.submit(HANDLE, FormId(2), SubmitScope::Form).unwrap();
    assert_eq!(status, SubmitStatus::Submitted);
    let Some(ProviderData::Names(names)) = rig.routing.data(guid(0xbb), "Lang") else {
        panic!("name/value storage missing");
    };
    assert_eq!(names.get("Count").map(String::as_str), Some("04"));
    assert_eq!(names.get("Lang").map(String::as_str), Some("0065006e"));
}

#[test]
fn submit_variable_buffer_saves_whole_variable() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    set(&mut engine, 20, TypedValue::U16(0x5678));

    let status = engine.submit(HANDLE, FormId(3), SubmitScope::Form).unwrap();
    assert_eq!(status, SubmitStatus::Submitted);
    assert_eq!(
        rig.variables.variable(guid(0xcc), "Boot"),
        Some(vec![0x78, 0x56, 0, 0])
    );
    assert_eq!(rig.routing.routed(), 0);
}

#[test]
fn submit_locked_variable_reports_failure() {
    let rig = Rig::new();
    rig.variables.lock(guid(0xcc), "Boot");
    let mut engine = rig.engine();
    set(&mut engine, 20, TypedValue::U16(0x5678));

    let status = engine.submit(HANDLE, FormId(3), SubmitScope::Form).unwrap();
    let SubmitStatus::SaveFailed { failures, .. } = status else {
        panic!("expected a save failure");
    };
    assert_eq!(failures[0].question, Some(q(20)));
    assert_eq!(value(&engine, 20), TypedValue::U16(0x1234));
}

// ══════════════════════════════════════════════════════════════════════════════
// Discard
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn discard_restores_committed_values() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    set(&mut engine, 1, TypedValue::U8(9));

    let changed = engine.discard(HANDLE, MAIN, SubmitScope::Form).unwrap();
    assert_eq!(changed, vec![(HANDLE, q(1))]);
    assert_eq!(value(&engine, 1), TypedValue::U8(0));
    assert_eq!(setup_bytes(&engine, BufferCopy::Edit)[0], 0);
    assert_eq!(state(&engine), FormSetState::Clean);
    assert_eq!(rig.routing.routed(), 0);
}

#[test]
fn discard_of_form_scope_keeps_other_forms() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    set(&mut engine, 1, TypedValue::U8(9));
    set(&mut engine, 10, TypedValue::U8(8));

    engine.discard(HANDLE, FormId(2), SubmitScope::Form).unwrap();
    assert_eq!(value(&engine, 10), TypedValue::U8(3));
    assert_eq!(value(&engine, 1), TypedValue::U8(9));
}

// ══════════════════════════════════════════════════════════════════════════════
// Defaults
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn standard_defaults_follow_precedence() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    set(&mut engine, 1, TypedValue::U8(9));

    let applied = engine
        .extract_default(HANDLE, Some(MAIN), DefaultId::STANDARD)
        .unwrap();
    assert_eq!(applied, 6);
    assert_eq!(value(&engine, 1), TypedValue::U8(0));
    assert_eq!(value(&engine, 2), TypedValue::U16(42));
    assert_eq!(value(&engine, 3), TypedValue::Bool(true));
    assert_eq!(value(&engine, 4), TypedValue::U8(3));
    assert_eq!(engine.context().pending_default, None);
    assert_eq!(state(&engine), FormSetState::Editing);
}

#[test]
fn manufacturing_defaults_skip_hidden_options() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    engine
        .extract_default(HANDLE, Some(MAIN), DefaultId::MANUFACTURING)
        .unwrap();
    assert_eq!(value(&engine, 3), TypedValue::Bool(false));
    assert_eq!(value(&engine, 4), TypedValue::U8(2));
}

#[test]
fn host_defaults_override_package_defaults() {
    let rig = Rig::new();
    let mut table = BTreeMap::new();
    table.insert((q(2), DefaultId::STANDARD), TypedValue::U16(7));
    let host = rig.host().with_defaults(DefaultTable(table));
    let mut engine = rig.engine_with(host);

    engine
        .extract_default(HANDLE, Some(MAIN), DefaultId::STANDARD)
        .unwrap();
    assert_eq!(value(&engine, 2), TypedValue::U16(7));
}

// ══════════════════════════════════════════════════════════════════════════════
// Gating
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn scope_condition_suppresses_question() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    assert_eq!(engine.question_gating(HANDLE, q(5)).unwrap(), Gating::Visible);

    set(&mut engine, 1, TypedValue::U8(60));
    assert_eq!(engine.question_gating(HANDLE, q(5)).unwrap(), Gating::Suppress);
    assert_eq!(engine.form_gating(HANDLE, MAIN).unwrap(), Gating::Visible);
}

#[test]
fn option_gating() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    assert_eq!(engine.option_gating(HANDLE, q(4), 0).unwrap(), Gating::Suppress);
    assert_eq!(engine.option_gating(HANDLE, q(4), 1).unwrap(), Gating::Visible);
    assert!(matches!(
        engine.option_gating(HANDLE, q(4), 7),
        Err(BrowserError::OutOfRange { .. })
    ));
}

#[test]
fn suppressed_question_does_not_block_submit() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    let package = FormSetPackage::from_json(
        &PLATFORM.replace(r#""flags": {"callback": true},"#, r#""flags": {"callback": true}, "conditions": [{"kind": "suppress_if", "opcodes": [{"op": "true"}]}],"#),
    )
    .unwrap();
    engine.open_formset(HANDLE, &package).unwrap();
    set(&mut engine, 1, TypedValue::U8(150));

    let status = engine.submit(HANDLE, MAIN, SubmitScope::Form).unwrap();
    assert_eq!(status, SubmitStatus::Submitted);
}

// ══════════════════════════════════════════════════════════════════════════════
// Interactive changes
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn change_rejects_out_of_range_values() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    assert!(matches!(
        engine.change_question(HANDLE, q(1), TypedValue::U8(250)),
        Err(BrowserError::OutOfRange { .. })
    ));
    assert!(matches!(
        engine.change_question(HANDLE, q(4), TypedValue::U8(9)),
        Err(BrowserError::OutOfRange { .. })
    ));
    assert!(matches!(
        engine.change_question(HANDLE, q(6), TypedValue::U8(1)),
        Err(BrowserError::Vetoed { .. })
    ));
    assert_eq!(state(&engine), FormSetState::Clean);
}

#[test]
fn inconsistent_change_is_reverted() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    let outcome = engine
        .change_question(HANDLE, q(2), TypedValue::U16(2000))
        .unwrap();
    assert!(!outcome.applied);
    assert_eq!(outcome.inconsistent.as_deref(), Some("Conflicting value"));
    assert_eq!(value(&engine, 2), TypedValue::U16(0));
    assert_eq!(&setup_bytes(&engine, BufferCopy::Edit)[2..4], &[0, 0]);
}

#[test]
fn warning_change_is_kept() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    let outcome = engine
        .change_question(HANDLE, q(2), TypedValue::U16(600))
        .unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.warnings, vec!["Unusual value".to_string()]);
    assert_eq!(value(&engine, 2), TypedValue::U16(600));
    assert_eq!(state(&engine), FormSetState::Editing);
}

// ══════════════════════════════════════════════════════════════════════════════
// Callbacks
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn callback_sees_changing_changed_and_submitted() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    let recorder = Recorder::default();
    let events = recorder.events.clone();
    engine.set_callback(HANDLE, recorder).unwrap();

    engine
        .change_question(HANDLE, q(1), TypedValue::U8(5))
        .unwrap();
    engine.submit(HANDLE, MAIN, SubmitScope::Form).unwrap();

    let actions: Vec<(CallbackAction, QuestionId)> =
        events.borrow().iter().map(|e| (e.0, e.1)).collect();
    assert_eq!(
        actions,
        vec![
            (CallbackAction::Changing, q(1)),
            (CallbackAction::Changed, q(1)),
            (CallbackAction::Submitted, q(1)),
        ]
    );
    assert!(events.borrow().iter().all(|e| e.3 == 1));
}

#[test]
fn callback_veto_keeps_old_value() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    let recorder = Recorder {
        veto_above: Some(100),
        ..Recorder::default()
    };
    engine.set_callback(HANDLE, recorder).unwrap();

    let err = engine
        .change_question(HANDLE, q(1), TypedValue::U8(150))
        .unwrap_err();
    assert!(matches!(err, BrowserError::Vetoed { .. }));
    assert_eq!(value(&engine, 1), TypedValue::U8(0));
    assert_eq!(state(&engine), FormSetState::Clean);
}

#[test]
fn callback_may_reenter_engine() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    engine.open_form(HANDLE, MAIN).unwrap();
    let recorder = Recorder {
        reenter: true,
        ..Recorder::default()
    };
    engine.set_callback(HANDLE, recorder).unwrap();

    engine
        .change_question(HANDLE, q(1), TypedValue::U8(5))
        .unwrap();

    // Values written by the callback stay; its context changes do not.
    assert_eq!(value(&engine, 2), TypedValue::U16(77));
    assert_eq!(engine.context().open_forms, vec![(HANDLE, MAIN)]);
    assert_eq!(engine.callback_depth(), 0);
    assert!(engine.formset(HANDLE).unwrap().has_callback());
}
