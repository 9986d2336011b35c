//! The storage abstraction.
//!
//! A storage holds the bytes or entries questions are bound to. Buffer-like
//! storages keep two copies of identical size: the edit copy (the only one
//! user interaction and expressions may mutate) and the committed copy
//! (changed only by [`Storage::synchronize`]). Name/value storages keep the
//! same two copies per entry. External variables have no edit/commit split.

use setup_configstr::{ConfigElement, ConfigHeader, ConfigRequest, ConfigResp};
use setup_types::package::{StorageDecl, StorageKindDecl};
use setup_types::{FormId, StorageId};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use crate::error::{EvalError, EvalResult};
use crate::host::ConfigRouting;

/// Which of the two parallel copies to operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferCopy {
    Edit,
    Committed,
}

/// Direction of a [`Storage::synchronize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Edit -> Committed.
    Commit,
    /// Committed -> Edit.
    Restore,
}

// ══════════════════════════════════════════════════════════════════════════════
// Buffer
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStore {
    edit: Vec<u8>,
    committed: Vec<u8>,
}

impl BufferStore {
    pub fn new(size: usize) -> Self {
        Self {
            edit: vec![0; size],
            committed: vec![0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.edit.len()
    }

    pub fn bytes(&self, copy: BufferCopy) -> &[u8] {
        match copy {
            BufferCopy::Edit => &self.edit,
            BufferCopy::Committed => &self.committed,
        }
    }

    fn bytes_mut(&mut self, copy: BufferCopy) -> &mut [u8] {
        match copy {
            BufferCopy::Edit => &mut self.edit,
            BufferCopy::Committed => &mut self.committed,
        }
    }

    pub fn read_at(&self, copy: BufferCopy, offset: usize, width: usize) -> EvalResult<&[u8]> {
        let size = self.size();
        self.bytes(copy)
            .get(offset..offset + width)
            .ok_or_else(|| out_of_range(offset, width, size))
    }

    pub fn write_at(&mut self, copy: BufferCopy, offset: usize, data: &[u8]) -> EvalResult<()> {
        let size = self.size();
        let slot = self
            .bytes_mut(copy)
            .get_mut(offset..offset + data.len())
            .ok_or_else(|| out_of_range(offset, data.len(), size))?;
        slot.copy_from_slice(data);
        Ok(())
    }

    /// Replace both copies with `data`, zero-extended or truncated to size.
    pub fn load(&mut self, data: &[u8]) {
        let n = data.len().min(self.size());
        self.committed.fill(0);
        self.committed[..n].copy_from_slice(&data[..n]);
        self.edit.copy_from_slice(&self.committed);
    }

    /// Sync both directions through the provider's block codec, so the same
    /// conversion applies as for a real provider round trip.
    fn synchronize(
        &mut self,
        routing: &dyn ConfigRouting,
        request: &ConfigRequest,
        direction: SyncDirection,
    ) -> EvalResult<()> {
        let Self { edit, committed } = self;
        let (source, target) = match direction {
            SyncDirection::Commit => (&*edit, committed),
            SyncDirection::Restore => (&*committed, edit),
        };
        let text = routing.block_to_config(request, source)?;
        routing.config_to_block(&text, target)?;
        Ok(())
    }

    fn element_changed(&self, element: &ConfigElement) -> bool {
        match element {
            ConfigElement::Block { offset, width } => {
                let range = usize::from(*offset)..usize::from(*offset) + usize::from(*width);
                self.edit.get(range.clone()) != self.committed.get(range)
            }
            ConfigElement::Name(_) => false,
        }
    }
}

fn out_of_range(offset: usize, width: usize, size: usize) -> EvalError {
    EvalError::StorageIo(format!(
        "{width} bytes at offset {offset} exceed the {size}-byte storage"
    ))
}

// ══════════════════════════════════════════════════════════════════════════════
// Name/value
// ══════════════════════════════════════════════════════════════════════════════

/// One entry of a name/value storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameValueNode {
    pub name: String,
    /// Edit copy, hex text.
    pub edit: String,
    /// Committed copy, hex text.
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameValueStore {
    nodes: Vec<NameValueNode>,
}

impl NameValueStore {
    pub fn new(names: &[String]) -> Self {
        let mut store = Self::default();
        for name in names {
            store.set(name, "", BufferCopy::Committed);
        }
        store
    }

    pub fn nodes(&self) -> &[NameValueNode] {
        &self.nodes
    }

    pub fn get(&self, name: &str, copy: BufferCopy) -> Option<&str> {
        self.nodes.iter().find(|n| n.name == name).map(|n| match copy {
            BufferCopy::Edit => n.edit.as_str(),
            BufferCopy::Committed => n.value.as_str(),
        })
    }

    /// Set an entry, creating it (with both copies equal) when absent.
    pub fn set(&mut self, name: &str, value: &str, copy: BufferCopy) -> &mut NameValueNode {
        let index = match self.nodes.iter().position(|n| n.name == name) {
            Some(index) => index,
            None => {
                self.nodes.push(NameValueNode {
                    name: name.to_string(),
                    edit: value.to_string(),
                    value: value.to_string(),
                });
                self.nodes.len() - 1
            }
        };
        let node = &mut self.nodes[index];
        match copy {
            BufferCopy::Edit => node.edit = value.to_string(),
            BufferCopy::Committed => node.value = value.to_string(),
        }
        node
    }

    fn synchronize(&mut self, names: Option<&BTreeSet<&str>>, direction: SyncDirection) {
        for node in &mut self.nodes {
            if names.is_some_and(|names| !names.contains(node.name.as_str())) {
                continue;
            }
            match direction {
                SyncDirection::Commit => node.value = node.edit.clone(),
                SyncDirection::Restore => node.edit = node.value.clone(),
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Storage
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBacking {
    /// Reached through the configuration provider.
    Buffer(BufferStore),
    /// Committed copy persisted as one external variable.
    VariableBuffer { store: BufferStore, attributes: u32 },
    /// Reached through the configuration provider, one entry per name.
    NameValue(NameValueStore),
    /// One external variable per question.
    Variable { attributes: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    pub id: StorageId,
    pub guid: Uuid,
    pub name: String,
    pub backing: StorageBacking,
    /// Elements used by the currently open forms.
    pub config_request: ConfigRequest,
    referencing: BTreeSet<FormId>,
}

impl Storage {
    pub fn new(id: StorageId, guid: Uuid, name: impl Into<String>, backing: StorageBacking) -> Self {
        let name = name.into();
        Self {
            id,
            guid,
            config_request: ConfigRequest::new(ConfigHeader::new(guid, name.clone())),
            name,
            backing,
            referencing: BTreeSet::new(),
        }
    }

    pub fn from_decl(decl: &StorageDecl) -> Self {
        let backing = match &decl.kind {
            StorageKindDecl::Buffer { size } => {
                StorageBacking::Buffer(BufferStore::new(usize::from(*size)))
            }
            StorageKindDecl::VariableBuffer { size, attributes } => StorageBacking::VariableBuffer {
                store: BufferStore::new(usize::from(*size)),
                attributes: *attributes,
            },
            StorageKindDecl::NameValue { names } => {
                StorageBacking::NameValue(NameValueStore::new(names))
            }
            StorageKindDecl::Variable { attributes } => StorageBacking::Variable {
                attributes: *attributes,
            },
        };
        Self::new(decl.id, decl.guid, decl.name.clone(), backing)
    }

    pub fn header(&self) -> ConfigHeader {
        ConfigHeader::new(self.guid, self.name.clone())
    }

    pub fn kind_name(&self) -> &'static str {
        match self.backing {
            StorageBacking::Buffer(_) => "buffer",
            StorageBacking::VariableBuffer { .. } => "variable buffer",
            StorageBacking::NameValue(_) => "name/value",
            StorageBacking::Variable { .. } => "variable",
        }
    }

    pub fn buffer(&self) -> Option<&BufferStore> {
        match &self.backing {
            StorageBacking::Buffer(store) | StorageBacking::VariableBuffer { store, .. } => {
                Some(store)
            }
            _ => None,
        }
    }

    pub fn buffer_mut(&mut self) -> Option<&mut BufferStore> {
        match &mut self.backing {
            StorageBacking::Buffer(store) | StorageBacking::VariableBuffer { store, .. } => {
                Some(store)
            }
            _ => None,
        }
    }

    pub fn name_values(&self) -> Option<&NameValueStore> {
        match &self.backing {
            StorageBacking::NameValue(store) => Some(store),
            _ => None,
        }
    }

    pub fn name_values_mut(&mut self) -> Option<&mut NameValueStore> {
        match &mut self.backing {
            StorageBacking::NameValue(store) => Some(store),
            _ => None,
        }
    }

    /// Storages whose values travel through the configuration provider.
    pub fn is_provider_backed(&self) -> bool {
        matches!(
            self.backing,
            StorageBacking::Buffer(_) | StorageBacking::NameValue(_)
        )
    }

    /// Every element of the storage.
    pub fn full_request(&self) -> ConfigRequest {
        let mut request = ConfigRequest::new(self.header());
        match &self.backing {
            StorageBacking::Buffer(store) | StorageBacking::VariableBuffer { store, .. } => {
                let size = u16::try_from(store.size()).unwrap_or(u16::MAX);
                request.push(ConfigElement::block(0, size));
            }
            StorageBacking::NameValue(store) => {
                for node in store.nodes() {
                    request.push(ConfigElement::name(node.name.clone()));
                }
            }
            StorageBacking::Variable { .. } => {}
        }
        request
    }

    // ── Form references ──────────────────────────────────────────────────

    /// Record that `form` is open and uses the elements of `fragment`.
    pub fn attach_form(&mut self, form: FormId, fragment: &ConfigRequest) {
        self.referencing.insert(form);
        self.config_request.merge(fragment);
    }

    /// Record that `form` closed. The element set shrinks only once no
    /// referencing form is left; returns whether that happened.
    pub fn detach_form(&mut self, form: FormId) -> bool {
        self.referencing.remove(&form);
        if self.referencing.is_empty() {
            self.config_request.clear();
            true
        } else {
            false
        }
    }

    pub fn referencing_forms(&self) -> impl Iterator<Item = FormId> + '_ {
        self.referencing.iter().copied()
    }

    // ── Edit vs committed ────────────────────────────────────────────────

    pub fn element_changed(&self, element: &ConfigElement) -> bool {
        match (&self.backing, element) {
            (StorageBacking::NameValue(store), ConfigElement::Name(name)) => {
                store.get(name, BufferCopy::Edit) != store.get(name, BufferCopy::Committed)
            }
            _ => self.buffer().is_some_and(|b| b.element_changed(element)),
        }
    }

    /// The subset of `candidates` whose edit copy differs from committed.
    pub fn changed_elements(&self, candidates: &ConfigRequest) -> ConfigRequest {
        let mut changed = ConfigRequest::new(self.header());
        for element in candidates.elements() {
            if self.element_changed(element) {
                changed.push(element.clone());
            }
        }
        changed
    }

    /// Render the edit copy of `request`'s elements as a provider response.
    pub fn edit_response(
        &self,
        routing: &dyn ConfigRouting,
        request: &ConfigRequest,
    ) -> EvalResult<String> {
        match &self.backing {
            StorageBacking::Buffer(store) | StorageBacking::VariableBuffer { store, .. } => {
                Ok(routing.block_to_config(request, store.bytes(BufferCopy::Edit))?)
            }
            StorageBacking::NameValue(store) => {
                let mut resp = ConfigResp::new(self.header());
                for element in request.elements() {
                    if let ConfigElement::Name(name) = element {
                        let value = store.get(name, BufferCopy::Edit).unwrap_or("");
                        resp.push(element.clone(), value);
                    }
                }
                Ok(resp.render())
            }
            StorageBacking::Variable { .. } => Err(EvalError::StorageIo(format!(
                "storage `{}` has no provider representation",
                self.name
            ))),
        }
    }

    // ── Synchronize ──────────────────────────────────────────────────────

    /// Copy the elements named by `filter` (all elements when `None`)
    /// between the two copies.
    pub fn synchronize(
        &mut self,
        routing: &dyn ConfigRouting,
        filter: Option<&ConfigRequest>,
        direction: SyncDirection,
    ) -> EvalResult<()> {
        debug!(
            storage = %self.id,
            name = %self.name,
            ?direction,
            elements = filter.map_or(0, ConfigRequest::len),
            "synchronize"
        );
        let mut request = ConfigRequest::new(self.header());
        match filter {
            Some(filter) => {
                for element in filter.elements() {
                    request.push(element.clone());
                }
            }
            None => request = self.full_request(),
        }

        match &mut self.backing {
            StorageBacking::Buffer(store) | StorageBacking::VariableBuffer { store, .. } => {
                store.synchronize(routing, &request, direction)
            }
            StorageBacking::NameValue(store) => {
                let names: BTreeSet<&str> = request
                    .elements()
                    .iter()
                    .filter_map(|e| match e {
                        ConfigElement::Name(name) => Some(name.as_str()),
                        ConfigElement::Block { .. } => None,
                    })
                    .collect();
                store.synchronize(Some(&names), direction);
                Ok(())
            }
            StorageBacking::Variable { .. } => Ok(()),
        }
    }
}
