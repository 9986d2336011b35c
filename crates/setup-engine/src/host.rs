//! Boundaries between the engine and the platform.
//!
//! The engine never talks to firmware, a console or a variable service
//! directly. Everything outside the form set goes through one of the traits
//! below, bundled in a [`Host`]. The `Memory*` implementations keep their
//! state behind a shared handle so a caller can hold a clone and inspect
//! what the engine did.

use setup_configstr::encoding::decode_value;
use setup_configstr::{ConfigElement, ConfigRequest, ConfigResp, ConfigResult};
use setup_types::{DefaultId, HiiDate, HiiTime, QuestionId, TypedValue};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{HostError, RouteFailure};
use crate::form::FormSetHandle;
use crate::submit::SaveFailure;

// ══════════════════════════════════════════════════════════════════════════════
// Collaborator traits
// ══════════════════════════════════════════════════════════════════════════════

/// The configuration provider behind buffer and name/value storages.
pub trait ConfigRouting {
    /// Answer `request` with the provider's current value of each element.
    fn extract_config(&mut self, request: &ConfigRequest) -> Result<String, RouteFailure>;

    /// Apply a response. Elements are applied in order; a failure reports
    /// the position of the first element left unapplied.
    fn route_config(&mut self, config: &str) -> Result<(), RouteFailure>;

    /// Render the requested elements of `block` as a response.
    fn block_to_config(&self, request: &ConfigRequest, block: &[u8]) -> ConfigResult<String> {
        setup_configstr::block_to_config(request, block)
    }

    /// Write the elements of a response into `block`.
    fn config_to_block(&self, config: &str, block: &mut [u8]) -> ConfigResult<()> {
        setup_configstr::config_to_block(config, block)
    }
}

/// The external key/value variable store and the platform clock.
pub trait VariableService {
    fn get_variable(&mut self, guid: &Uuid, name: &str) -> Result<Vec<u8>, HostError>;
    fn set_variable(
        &mut self,
        guid: &Uuid,
        name: &str,
        attributes: u32,
        data: &[u8],
    ) -> Result<(), HostError>;
    fn get_time(&mut self) -> Result<(HiiDate, HiiTime), HostError>;
    fn set_time(&mut self, date: Option<HiiDate>, time: Option<HiiTime>) -> Result<(), HostError>;
}

/// Answers `security` opcodes.
pub trait AccessControl {
    fn has_permission(&self, permission: &Uuid) -> bool;
}

/// Supplies defaults that override the ones embedded in the package.
pub trait DefaultSource {
    fn default_value(
        &mut self,
        formset: &Uuid,
        question: QuestionId,
        default_id: DefaultId,
    ) -> Option<TypedValue>;
}

/// What to do with storages the provider refused to save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveFailedChoice {
    /// Restore the failed elements from the committed copy.
    #[default]
    Discard,
    /// Keep the edits and go back to the offending question.
    Retry,
}

/// Confirmations the engine needs from whoever drives it.
pub trait UserPrompt {
    fn save_failed(&mut self, failures: &[SaveFailure]) -> SaveFailedChoice;

    /// A `no_submit_if` fired; `message` is its resolved text.
    fn no_submit(&mut self, _message: &str) {}
}

/// Events delivered to a form set's callback provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Changing,
    Changed,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResponse {
    Accept,
    Veto(String),
}

/// Per-form-set provider notified about question changes.
///
/// The callback receives the engine itself and may call back into it, for
/// example to open another form set.
pub trait FormCallback {
    fn callback(
        &mut self,
        engine: &mut Engine,
        formset: FormSetHandle,
        action: CallbackAction,
        question: QuestionId,
        value: &TypedValue,
    ) -> CallbackResponse;
}

// ══════════════════════════════════════════════════════════════════════════════
// Host
// ══════════════════════════════════════════════════════════════════════════════

/// Collaborators of one engine instance.
pub struct Host {
    pub routing: Box<dyn ConfigRouting>,
    pub variables: Box<dyn VariableService>,
    /// `None` means every permission is granted.
    pub access: Option<Box<dyn AccessControl>>,
    pub defaults: Option<Box<dyn DefaultSource>>,
    pub prompt: Box<dyn UserPrompt>,
}

impl Host {
    pub fn new(routing: impl ConfigRouting + 'static, variables: impl VariableService + 'static) -> Self {
        Self {
            routing: Box::new(routing),
            variables: Box::new(variables),
            access: None,
            defaults: None,
            prompt: Box::new(FixedChoice::default()),
        }
    }

    /// A host backed entirely by fresh in-memory collaborators.
    pub fn in_memory() -> Self {
        Self::new(MemoryRouting::new(), MemoryVariables::new())
    }

    pub fn with_access(mut self, access: impl AccessControl + 'static) -> Self {
        self.access = Some(Box::new(access));
        self
    }

    pub fn with_defaults(mut self, defaults: impl DefaultSource + 'static) -> Self {
        self.defaults = Some(Box::new(defaults));
        self
    }

    pub fn with_prompt(mut self, prompt: impl UserPrompt + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub(crate) fn has_permission(&self, permission: &Uuid) -> bool {
        self.access
            .as_ref()
            .map_or(true, |access| access.has_permission(permission))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// In-memory configuration provider
// ══════════════════════════════════════════════════════════════════════════════

/// Contents of one provider-side storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderData {
    Block(Vec<u8>),
    Names(BTreeMap<String, String>),
}

type StorageKey = (Uuid, String);

#[derive(Debug, Default)]
struct RoutingState {
    stores: BTreeMap<StorageKey, ProviderData>,
    rejected: BTreeSet<(Uuid, String, ConfigElement)>,
    unavailable: BTreeSet<StorageKey>,
    routed: usize,
}

/// A configuration provider keeping every storage in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRouting {
    state: Rc<RefCell<RoutingState>>,
}

impl MemoryRouting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, guid: Uuid, name: &str, data: ProviderData) {
        self.state
            .borrow_mut()
            .stores
            .insert((guid, name.to_string()), data);
    }

    pub fn data(&self, guid: Uuid, name: &str) -> Option<ProviderData> {
        self.state
            .borrow()
            .stores
            .get(&(guid, name.to_string()))
            .cloned()
    }

    /// Every storage, for export.
    pub fn stores(&self) -> Vec<(Uuid, String, ProviderData)> {
        self.state
            .borrow()
            .stores
            .iter()
            .map(|((guid, name), data)| (*guid, name.clone(), data.clone()))
            .collect()
    }

    /// Refuse to apply `element` of the given storage.
    pub fn reject(&self, guid: Uuid, name: &str, element: ConfigElement) {
        self.state
            .borrow_mut()
            .rejected
            .insert((guid, name.to_string(), element));
    }

    /// Make extraction from the given storage fail.
    pub fn set_unavailable(&self, guid: Uuid, name: &str) {
        self.state
            .borrow_mut()
            .unavailable
            .insert((guid, name.to_string()));
    }

    /// Number of `route_config` calls received.
    pub fn routed(&self) -> usize {
        self.state.borrow().routed
    }
}

fn config_failure(err: setup_configstr::ConfigError) -> RouteFailure {
    RouteFailure::new(err.position().unwrap_or(0), err.to_string())
}

impl ConfigRouting for MemoryRouting {
    fn extract_config(&mut self, request: &ConfigRequest) -> Result<String, RouteFailure> {
        let state = self.state.borrow();
        let key = (request.header.guid, request.header.name.clone());
        if state.unavailable.contains(&key) {
            return Err(RouteFailure::new(0, "provider unavailable"));
        }
        match state.stores.get(&key) {
            None => Err(RouteFailure::new(
                0,
                format!("no provider for storage `{}`", key.1),
            )),
            Some(ProviderData::Block(bytes)) => {
                self.block_to_config(request, bytes).map_err(config_failure)
            }
            Some(ProviderData::Names(values)) => {
                let mut resp = ConfigResp::new(request.header.clone());
                for element in request.elements() {
                    let ConfigElement::Name(name) = element else {
                        return Err(RouteFailure::new(0, "block element on a name/value storage"));
                    };
                    let value = values
                        .get(name)
                        .ok_or_else(|| RouteFailure::new(0, format!("unknown name `{name}`")))?;
                    resp.push(element.clone(), value.clone());
                }
                Ok(resp.render())
            }
        }
    }

    fn route_config(&mut self, config: &str) -> Result<(), RouteFailure> {
        let resp = ConfigResp::parse(config).map_err(config_failure)?;
        let mut state = self.state.borrow_mut();
        state.routed += 1;
        let RoutingState {
            stores, rejected, ..
        } = &mut *state;
        let (guid, name) = (resp.header.guid, resp.header.name.clone());
        let data = stores
            .get_mut(&(guid, name.clone()))
            .ok_or_else(|| RouteFailure::new(0, format!("no provider for storage `{name}`")))?;

        for entry in &resp.entries {
            if rejected.contains(&(guid, name.clone(), entry.element.clone())) {
                return Err(RouteFailure::new(entry.position, "element rejected"));
            }
            match (&mut *data, &entry.element) {
                (ProviderData::Block(bytes), ConfigElement::Block { offset, width }) => {
                    let start = usize::from(*offset);
                    let width = usize::from(*width);
                    if start + width > bytes.len() {
                        return Err(RouteFailure::new(entry.position, "element out of range"));
                    }
                    let value = decode_value(&entry.value, width, entry.position)
                        .map_err(config_failure)?;
                    bytes[start..start + width].copy_from_slice(&value);
                }
                (ProviderData::Names(values), ConfigElement::Name(key)) => {
                    values.insert(key.clone(), entry.value.clone());
                }
                _ => return Err(RouteFailure::new(entry.position, "element kind mismatch")),
            }
        }
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// In-memory variable store
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct VariableState {
    variables: BTreeMap<StorageKey, (u32, Vec<u8>)>,
    locked: BTreeSet<StorageKey>,
    date: HiiDate,
    time: HiiTime,
}

/// A variable store and settable clock kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryVariables {
    state: Rc<RefCell<VariableState>>,
}

impl MemoryVariables {
    pub fn new() -> Self {
        let vars = Self::default();
        vars.set_clock(HiiDate::new(2000, 1, 1), HiiTime::default());
        vars
    }

    pub fn insert(&self, guid: Uuid, name: &str, data: Vec<u8>) {
        self.state
            .borrow_mut()
            .variables
            .insert((guid, name.to_string()), (0, data));
    }

    pub fn variable(&self, guid: Uuid, name: &str) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .variables
            .get(&(guid, name.to_string()))
            .map(|(_, data)| data.clone())
    }

    /// Every variable, for export.
    pub fn variables(&self) -> Vec<(Uuid, String, Vec<u8>)> {
        self.state
            .borrow()
            .variables
            .iter()
            .map(|((guid, name), (_, data))| (*guid, name.clone(), data.clone()))
            .collect()
    }

    /// Make writes to the given variable fail.
    pub fn lock(&self, guid: Uuid, name: &str) {
        self.state
            .borrow_mut()
            .locked
            .insert((guid, name.to_string()));
    }

    pub fn set_clock(&self, date: HiiDate, time: HiiTime) {
        let mut state = self.state.borrow_mut();
        state.date = date;
        state.time = time;
    }

    pub fn clock(&self) -> (HiiDate, HiiTime) {
        let state = self.state.borrow();
        (state.date, state.time)
    }
}

impl VariableService for MemoryVariables {
    fn get_variable(&mut self, guid: &Uuid, name: &str) -> Result<Vec<u8>, HostError> {
        self.variable(*guid, name)
            .ok_or_else(|| HostError::VariableNotFound {
                name: name.to_string(),
            })
    }

    fn set_variable(
        &mut self,
        guid: &Uuid,
        name: &str,
        attributes: u32,
        data: &[u8],
    ) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        let key = (*guid, name.to_string());
        if state.locked.contains(&key) {
            return Err(HostError::VariableRejected {
                name: name.to_string(),
                reason: "write protected".into(),
            });
        }
        state.variables.insert(key, (attributes, data.to_vec()));
        Ok(())
    }

    fn get_time(&mut self) -> Result<(HiiDate, HiiTime), HostError> {
        Ok(self.clock())
    }

    fn set_time(&mut self, date: Option<HiiDate>, time: Option<HiiTime>) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        if let Some(date) = date {
            state.date = date;
        }
        if let Some(time) = time {
            state.time = time;
        }
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Small collaborators
// ══════════════════════════════════════════════════════════════════════════════

/// Grants exactly the listed permissions.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet(pub BTreeSet<Uuid>);

impl AccessControl for PermissionSet {
    fn has_permission(&self, permission: &Uuid) -> bool {
        self.0.contains(permission)
    }
}

/// Answers every save-failed prompt the same way.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedChoice(pub SaveFailedChoice);

impl UserPrompt for FixedChoice {
    fn save_failed(&mut self, _failures: &[SaveFailure]) -> SaveFailedChoice {
        self.0
    }
}

/// Defaults keyed by (question, default class).
#[derive(Debug, Clone, Default)]
pub struct DefaultTable(pub BTreeMap<(QuestionId, DefaultId), TypedValue>);

impl DefaultSource for DefaultTable {
    fn default_value(
        &mut self,
        _formset: &Uuid,
        question: QuestionId,
        default_id: DefaultId,
    ) -> Option<TypedValue> {
        self.0.get(&(question, default_id)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use setup_configstr::ConfigHeader;

    fn header() -> ConfigHeader {
        ConfigHeader::new(Uuid::from_u128(1), "Setup")
    }

    #[test]
    fn test_memory_routing_extract_and_route() {
        let mut routing = MemoryRouting::new();
        routing.insert(Uuid::from_u128(1), "Setup", ProviderData::Block(vec![1, 2, 3, 4]));

        let mut request = ConfigRequest::new(header());
        request.push(ConfigElement::block(2, 2));
        let text = routing.extract_config(&request).unwrap();
        assert!(text.ends_with("VALUE=0403"));

        let mut block = [0u8; 4];
        routing.config_to_block(&text, &mut block).unwrap();
        block[2] = 9;
        let back = routing.block_to_config(&request, &block).unwrap();
        routing.route_config(&back).unwrap();
        assert_eq!(
            routing.data(Uuid::from_u128(1), "Setup"),
            Some(ProviderData::Block(vec![1, 2, 9, 4]))
        );
        assert_eq!(routing.routed(), 1);
    }

    #[test]
    fn test_rejected_element_reports_progress() {
        let mut routing = MemoryRouting::new();
        routing.insert(Uuid::from_u128(1), "Setup", ProviderData::Block(vec![0; 4]));
        routing.reject(Uuid::from_u128(1), "Setup", ConfigElement::block(1, 1));

        let mut request = ConfigRequest::new(header());
        request.push(ConfigElement::block(0, 1));
        request.push(ConfigElement::block(1, 1));
        let text = routing.block_to_config(&request, &[5, 6, 0, 0]).unwrap();
        let err = routing.route_config(&text).unwrap_err();
        let resp = ConfigResp::parse(&text).unwrap();
        assert_eq!(resp.entry_at(err.progress), Some(1));
        // The element before the failure was applied.
        assert_eq!(
            routing.data(Uuid::from_u128(1), "Setup"),
            Some(ProviderData::Block(vec![5, 0, 0, 0]))
        );
    }

    #[test]
    fn test_variables_lock_and_clock() {
        let mut vars = MemoryVariables::new();
        let guid = Uuid::from_u128(2);
        vars.set_variable(&guid, "Boot", 7, &[1]).unwrap();
        assert_eq!(vars.get_variable(&guid, "Boot").unwrap(), vec![1]);
        vars.lock(guid, "Boot");
        assert!(vars.set_variable(&guid, "Boot", 7, &[2]).is_err());
        vars.set_time(None, Some(HiiTime::new(1, 2, 3))).unwrap();
        assert_eq!(vars.get_time().unwrap().1, HiiTime::new(1, 2, 3));
    }

    #[test]
    fn test_no_access_control_grants_everything() {
        let host = Host::in_memory();
        assert!(host.has_permission(&Uuid::from_u128(42)));
        let host = Host::in_memory().with_access(PermissionSet::default());
        assert!(!host.has_permission(&Uuid::from_u128(42)));
    }
}
