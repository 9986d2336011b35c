//! Package-scoped string tables.

use setup_types::package::StringEntry;
use setup_types::StringId;
use std::collections::BTreeMap;

/// Resolves string ids to text and back, for one form package.
pub trait StringTable {
    fn get(&self, id: StringId) -> Option<&str>;

    /// Id of `text`, adding it to the table when absent. Interning the same
    /// text twice yields the same id.
    fn intern(&mut self, text: &str) -> StringId;
}

/// The string table carried by a form package, extended at runtime with
/// strings produced by expressions.
#[derive(Debug, Clone, Default)]
pub struct PackageStrings {
    by_id: BTreeMap<StringId, String>,
    by_text: BTreeMap<String, StringId>,
    next: u16,
}

impl PackageStrings {
    pub fn new() -> Self {
        Self {
            next: 1,
            ..Self::default()
        }
    }

    pub fn from_entries(entries: &[StringEntry]) -> Self {
        let mut table = Self::new();
        for entry in entries {
            if entry.id.is_none() {
                continue;
            }
            table.by_id.insert(entry.id, entry.text.clone());
            table.by_text.entry(entry.text.clone()).or_insert(entry.id);
            table.next = table.next.max(entry.id.0.saturating_add(1));
        }
        table
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl StringTable for PackageStrings {
    fn get(&self, id: StringId) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    fn intern(&mut self, text: &str) -> StringId {
        if let Some(id) = self.by_text.get(text) {
            return *id;
        }
        let id = StringId(self.next.max(1));
        self.next = id.0.wrapping_add(1).max(1);
        self.by_id.insert(id, text.to_string());
        self.by_text.insert(text.to_string(), id);
        id
    }
}
