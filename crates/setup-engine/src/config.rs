//! Engine configuration.

use serde::{Deserialize, Serialize};
use setup_types::DefaultId;

/// Which forms a submit or discard request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitScope {
    /// Only the requested form.
    Form,
    /// Every form of the requested form set.
    #[default]
    FormSet,
    /// Every open form set.
    System,
}

/// Tunables of one engine instance. Every field has a default, so an empty
/// JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Slots added whenever one of the evaluation stacks is full.
    pub stack_grow_increment: usize,
    /// Maximum nesting of rule references inside one evaluation.
    pub max_rule_depth: usize,
    /// Value pushed by the `version` opcode.
    pub ifr_version: u16,
    pub default_scope: SubmitScope,
    pub standard_default_id: DefaultId,
    pub manufacturing_default_id: DefaultId,
    pub safe_default_id: DefaultId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stack_grow_increment: 8,
            max_rule_depth: 32,
            ifr_version: 0x0100,
            default_scope: SubmitScope::FormSet,
            standard_default_id: DefaultId::STANDARD,
            manufacturing_default_id: DefaultId::MANUFACTURING,
            safe_default_id: DefaultId::SAFE,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
