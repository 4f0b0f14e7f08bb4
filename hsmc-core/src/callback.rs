//! The callback registry: one slot per distinct action or guard name.
//!
//! Names are interned as the compiler walks the machine, so slot order is
//! first-appearance order: states in declaration order (entry actions, then
//! exit actions), then transitions in declaration order (guard, then each
//! branch's actions).

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::error::{CompileError, Result};
use crate::transition::GuardDomain;
use crate::tree::check_name;

/// Position of a callback in the generated callback table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CallbackIdx(usize);

impl CallbackIdx {
    pub const fn ordinal(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CallbackKind {
    Action,
    Guard(GuardDomain),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Callback {
    pub name: String,
    pub kind: CallbackKind,
}

impl Callback {
    /// Field name in generated callback tables: `condition_<name>` for guards,
    /// `action_<name>` for actions.
    pub fn field_name(&self) -> String {
        match self.kind {
            CallbackKind::Action => format!("action_{}", self.name),
            CallbackKind::Guard(_) => format!("condition_{}", self.name),
        }
    }

    pub fn is_guard(&self) -> bool {
        matches!(self.kind, CallbackKind::Guard(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallbackTable {
    callbacks: Vec<Callback>,
    by_name: HashMap<String, CallbackIdx>,
}

impl CallbackTable {
    /// Returns the slot for `name`, allocating one on first sight.
    pub(crate) fn intern(&mut self, name: &str, kind: CallbackKind) -> Result<CallbackIdx> {
        if let Some(&idx) = self.by_name.get(name) {
            return match (self.callbacks[idx.0].kind, kind) {
                (existing, requested) if existing == requested => Ok(idx),
                (CallbackKind::Guard(_), CallbackKind::Guard(_)) => {
                    Err(CompileError::GuardDomainConflict {
                        guard: name.to_string(),
                    })
                }
                _ => Err(CompileError::CallbackKindConflict {
                    name: name.to_string(),
                }),
            };
        }

        let what = match kind {
            CallbackKind::Action => "action",
            CallbackKind::Guard(_) => "guard",
        };
        check_name(what, name)?;

        let idx = CallbackIdx(self.callbacks.len());
        self.callbacks.push(Callback {
            name: name.to_string(),
            kind,
        });
        self.by_name.insert(name.to_string(), idx);
        Ok(idx)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn get(&self, idx: CallbackIdx) -> &Callback {
        &self.callbacks[idx.0]
    }

    pub fn name(&self, idx: CallbackIdx) -> &str {
        &self.callbacks[idx.0].name
    }

    pub fn lookup(&self, name: &str) -> Option<CallbackIdx> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CallbackIdx, &Callback)> + '_ {
        self.callbacks
            .iter()
            .enumerate()
            .map(|(ordinal, callback)| (CallbackIdx(ordinal), callback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent_and_ordered() {
        let mut table = CallbackTable::default();
        let a = table.intern("enter_A", CallbackKind::Action).unwrap();
        let g = table
            .intern("check", CallbackKind::Guard(GuardDomain::Boolean))
            .unwrap();
        let again = table.intern("enter_A", CallbackKind::Action).unwrap();
        assert_eq!(a, again);
        assert_eq!(a.ordinal(), 0);
        assert_eq!(g.ordinal(), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(a).field_name(), "action_enter_A");
        assert_eq!(table.get(g).field_name(), "condition_check");
    }

    #[test]
    fn guard_and_action_cannot_share_a_name() {
        let mut table = CallbackTable::default();
        table.intern("check", CallbackKind::Action).unwrap();
        assert_eq!(
            table
                .intern("check", CallbackKind::Guard(GuardDomain::Boolean))
                .unwrap_err(),
            CompileError::CallbackKindConflict {
                name: "check".to_string()
            }
        );
    }

    #[test]
    fn guard_keeps_one_domain() {
        let mut table = CallbackTable::default();
        table
            .intern("mode", CallbackKind::Guard(GuardDomain::Selector))
            .unwrap();
        assert_eq!(
            table
                .intern("mode", CallbackKind::Guard(GuardDomain::Boolean))
                .unwrap_err(),
            CompileError::GuardDomainConflict {
                guard: "mode".to_string()
            }
        );
    }

    #[test]
    fn names_must_be_identifiers() {
        let mut table = CallbackTable::default();
        assert!(matches!(
            table.intern("do it", CallbackKind::Action).unwrap_err(),
            CompileError::InvalidName { what: "action", .. }
        ));
    }
}
