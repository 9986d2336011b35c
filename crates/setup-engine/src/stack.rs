//! The evaluation stack set.
//!
//! Five independent LIFO stacks share one growth policy:
//!
//! | stack        | holds                                           |
//! |--------------|-------------------------------------------------|
//! | operands     | [`TypedValue`]s pushed and popped by opcodes    |
//! | scopes       | [`ScopeMarker`]s for rules and package scopes   |
//! | expressions  | [`ExprFrame`]s of expressions being evaluated   |
//! | maps         | [`MapFrame`]s of `map` opcodes in flight        |
//! | conditionals | per-level [`Conditional`] lists (form/statement/option) |
//!
//! Every stack has a relative base. [`Stack::enter`] moves the base to the
//! current top and returns the previous one; pops below the base fail with
//! [`EvalError::StackUnderflow`]. [`Stack::leave`] discards whatever the
//! nested section left behind and restores the base, whether that section
//! succeeded or not.

use setup_types::package::ConditionKind;
use setup_types::{ExprRef, FormId, RuleId, TypedValue};

use crate::error::{EvalError, EvalResult};
use crate::form::FormSetHandle;

// ══════════════════════════════════════════════════════════════════════════════
// Stack
// ══════════════════════════════════════════════════════════════════════════════

/// An auto-growing stack with a movable base.
#[derive(Debug, Clone)]
pub struct Stack<T> {
    name: &'static str,
    items: Vec<T>,
    base: usize,
    increment: usize,
}

/// Saved base returned by [`Stack::enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a checkpoint must be handed back to `leave`"]
pub struct Checkpoint(usize);

impl<T> Stack<T> {
    pub fn new(name: &'static str, increment: usize) -> Self {
        let increment = increment.max(1);
        Self {
            name,
            items: Vec::with_capacity(increment),
            base: 0,
            increment,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.items.capacity() {
            self.items.reserve_exact(self.increment);
        }
        self.items.push(item);
    }

    pub fn pop(&mut self) -> EvalResult<T> {
        if self.items.len() <= self.base {
            return Err(EvalError::StackUnderflow { stack: self.name });
        }
        self.items
            .pop()
            .ok_or(EvalError::StackUnderflow { stack: self.name })
    }

    /// Top item above the base.
    pub fn peek(&self) -> Option<&T> {
        if self.items.len() > self.base {
            self.items.last()
        } else {
            None
        }
    }

    pub fn peek_mut(&mut self) -> Option<&mut T> {
        if self.items.len() > self.base {
            self.items.last_mut()
        } else {
            None
        }
    }

    /// Items above the base, bottom first.
    pub fn visible(&self) -> &[T] {
        &self.items[self.base..]
    }

    /// Number of items above the base.
    pub fn depth(&self) -> usize {
        self.items.len() - self.base
    }

    /// Number of items in the whole stack, ignoring the base.
    pub fn total_depth(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Start a nested section: later pops cannot reach current items.
    pub fn enter(&mut self) -> Checkpoint {
        let saved = Checkpoint(self.base);
        self.base = self.items.len();
        saved
    }

    /// End a nested section, dropping everything it left on the stack.
    pub fn leave(&mut self, checkpoint: Checkpoint) {
        self.items.truncate(self.base);
        self.base = checkpoint.0.min(self.items.len());
    }

    /// Drop everything above the base.
    pub fn reset(&mut self) {
        self.items.truncate(self.base);
    }

    pub fn contains(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.items.contains(item)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Frames
// ══════════════════════════════════════════════════════════════════════════════

/// A nested-scope marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMarker {
    /// A rule currently being evaluated. Seeing the same marker twice means
    /// the rule references itself.
    Rule {
        formset: FormSetHandle,
        form: FormId,
        rule: RuleId,
    },
    /// A conditional scope opened while loading a package.
    Conditional { level: ConditionLevel },
}

/// An expression currently being evaluated. The top frame decides which
/// form set and form cross-references resolve against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprFrame {
    pub formset: FormSetHandle,
    pub form: FormId,
    pub expr: Option<ExprRef>,
}

/// A `map` opcode in flight: its subject and the clause being tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapFrame {
    pub subject: TypedValue,
    pub clause: usize,
}

/// What a conditional list gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConditionLevel {
    Form,
    Statement,
    Option,
}

/// One gating expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conditional {
    pub kind: ConditionKind,
    pub expr: ExprRef,
}

/// Conditional lists, one stack per [`ConditionLevel`].
#[derive(Debug, Clone)]
pub struct ConditionalLists {
    form: Stack<Conditional>,
    statement: Stack<Conditional>,
    option: Stack<Conditional>,
}

impl ConditionalLists {
    fn new(increment: usize) -> Self {
        Self {
            form: Stack::new("form conditional", increment),
            statement: Stack::new("statement conditional", increment),
            option: Stack::new("option conditional", increment),
        }
    }

    pub fn level(&self, level: ConditionLevel) -> &Stack<Conditional> {
        match level {
            ConditionLevel::Form => &self.form,
            ConditionLevel::Statement => &self.statement,
            ConditionLevel::Option => &self.option,
        }
    }

    pub fn level_mut(&mut self, level: ConditionLevel) -> &mut Stack<Conditional> {
        match level {
            ConditionLevel::Form => &mut self.form,
            ConditionLevel::Statement => &mut self.statement,
            ConditionLevel::Option => &mut self.option,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// StackSet
// ══════════════════════════════════════════════════════════════════════════════

/// The five evaluation stacks.
#[derive(Debug, Clone)]
pub struct StackSet {
    pub operands: Stack<TypedValue>,
    pub scopes: Stack<ScopeMarker>,
    pub expressions: Stack<ExprFrame>,
    pub maps: Stack<MapFrame>,
    pub conditionals: ConditionalLists,
}

impl StackSet {
    pub fn new(increment: usize) -> Self {
        Self {
            operands: Stack::new("operand", increment),
            scopes: Stack::new("scope", increment),
            expressions: Stack::new("expression", increment),
            maps: Stack::new("map", increment),
            conditionals: ConditionalLists::new(increment),
        }
    }
}

impl Default for StackSet {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_lifo() {
        let mut stack = Stack::new("test", 2);
        stack.push(1);
        stack.push(2);
        assert_eq!(stack.pop(), Ok(2));
        assert_eq!(stack.pop(), Ok(1));
        assert_eq!(stack.pop(), Err(EvalError::StackUnderflow { stack: "test" }));
    }

    #[test]
    fn test_grows_by_increment_and_never_shrinks() {
        let mut stack = Stack::new("test", 4);
        for i in 0..5 {
            stack.push(i);
        }
        let grown = stack.capacity();
        assert!(grown >= 8);
        stack.reset();
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.capacity(), grown);
    }

    #[test]
    fn test_nested_section_cannot_pop_outer_values() {
        let mut stack = Stack::new("test", 4);
        stack.push(10);
        let outer = stack.enter();
        assert_eq!(stack.depth(), 0);
        assert!(stack.pop().is_err());
        stack.push(20);
        stack.push(30);
        stack.leave(outer);
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.pop(), Ok(10));
    }

    #[test]
    fn test_nested_checkpoints_unwind_in_order() {
        let mut stack = Stack::new("test", 4);
        stack.push('a');
        let first = stack.enter();
        stack.push('b');
        let second = stack.enter();
        stack.push('c');
        stack.leave(second);
        assert_eq!(stack.visible(), &['b']);
        stack.leave(first);
        assert_eq!(stack.visible(), &['a']);
    }

    #[test]
    fn test_conditional_levels_are_independent() {
        let mut set = StackSet::default();
        let cond = Conditional {
            kind: ConditionKind::SuppressIf,
            expr: ExprRef(0),
        };
        set.conditionals.level_mut(ConditionLevel::Statement).push(cond);
        assert_eq!(set.conditionals.level(ConditionLevel::Statement).depth(), 1);
        assert_eq!(set.conditionals.level(ConditionLevel::Form).depth(), 0);
        assert_eq!(set.conditionals.level(ConditionLevel::Option).depth(), 0);
    }
}
