//! Suppress / gray-out / disable decisions.

use serde::Serialize;
use setup_types::package::ConditionKind;
use setup_types::{FormId, TypedValue};
use std::fmt;

use crate::evaluator::Evaluator;
use crate::form::FormSetHandle;
use crate::stack::Conditional;

/// Effect of the conditions on a form, statement or option. Ordered from
/// weakest to strongest; combining lists keeps the strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gating {
    #[default]
    Visible,
    GrayOut,
    Suppress,
    Disable,
}

impl From<ConditionKind> for Gating {
    fn from(kind: ConditionKind) -> Self {
        match kind {
            ConditionKind::SuppressIf => Self::Suppress,
            ConditionKind::GrayOutIf => Self::GrayOut,
            ConditionKind::DisableIf => Self::Disable,
        }
    }
}

impl fmt::Display for Gating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Visible => "visible",
            Self::GrayOut => "grayed out",
            Self::Suppress => "suppressed",
            Self::Disable => "disabled",
        })
    }
}

impl Gating {
    /// Suppressed and disabled items are not shown at all.
    pub fn is_hidden(self) -> bool {
        self >= Self::Suppress
    }
}

impl Evaluator<'_> {
    /// Combine a conditional list. A condition gates only when it evaluates
    /// to `true`; failures and non-boolean results do not gate.
    pub fn gating(
        &mut self,
        formset: FormSetHandle,
        form: FormId,
        conditions: &[Conditional],
    ) -> Gating {
        let mut gating = Gating::Visible;
        for conditional in conditions {
            let effect = Gating::from(conditional.kind);
            if effect <= gating {
                continue;
            }
            if let Ok(TypedValue::Bool(true)) = self.evaluate(formset, form, conditional.expr) {
                gating = effect;
            }
        }
        gating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strongest_gating_wins() {
        let combined = [Gating::GrayOut, Gating::Disable, Gating::Suppress]
            .into_iter()
            .max()
            .unwrap();
        assert_eq!(combined, Gating::Disable);
        assert!(Gating::Suppress.is_hidden());
        assert!(!Gating::GrayOut.is_hidden());
    }
}
