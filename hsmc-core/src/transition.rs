//! Validated transition definitions.

use std::collections::{HashMap, HashSet};

#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::debug;

use crate::callback::{CallbackIdx, CallbackKind, CallbackTable};
use crate::error::{CompileError, Result};
use crate::ir::{MachineIr, TargetDecl, TransitionDecl, When};
use crate::tree::{EventAlphabet, EventIdx, StateIdx, StateTree};

/// Value domain of a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum GuardDomain {
    Boolean,
    Selector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Guard {
    pub callback: CallbackIdx,
    pub domain: GuardDomain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Target {
    State(StateIdx),
    Final,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Branch {
    pub when: When,
    pub target: Target,
    pub actions: Vec<CallbackIdx>,
}

/// A reaction declared on `defining` for `event`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TransitionDef {
    pub defining: StateIdx,
    pub event: EventIdx,
    pub guard: Option<Guard>,
    pub branches: Vec<Branch>,
}

/// All transition definitions, keyed by (defining state, event).
#[derive(Debug, Clone, Default)]
pub struct TransitionSet {
    defs: Vec<TransitionDef>,
    by_pair: HashMap<(StateIdx, EventIdx), usize>,
}

impl TransitionSet {
    pub(crate) fn build(
        ir: &MachineIr,
        tree: &StateTree,
        events: &EventAlphabet,
        callbacks: &mut CallbackTable,
    ) -> Result<Self> {
        let mut set = Self::default();
        for decl in &ir.transitions {
            let def = lower(decl, tree, events, callbacks)?;
            let key = (def.defining, def.event);
            if set.by_pair.insert(key, set.defs.len()).is_some() {
                return Err(CompileError::DuplicateTransition {
                    state: decl.state.clone(),
                    event: decl.event.clone(),
                });
            }
            set.defs.push(def);
        }
        debug!(transitions = set.defs.len(), "validated transitions");
        Ok(set)
    }

    /// The definition declared directly on `state` for `event`, if any.
    /// Ancestors are not consulted; see [`Resolver`](crate::resolve::Resolver).
    pub fn get(&self, state: StateIdx, event: EventIdx) -> Option<&TransitionDef> {
        self.by_pair.get(&(state, event)).map(|&i| &self.defs[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransitionDef> + '_ {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

fn lower(
    decl: &TransitionDecl,
    tree: &StateTree,
    events: &EventAlphabet,
    callbacks: &mut CallbackTable,
) -> Result<TransitionDef> {
    let defining = tree
        .lookup(&decl.state)
        .ok_or_else(|| CompileError::UnknownTransitionState {
            state: decl.state.clone(),
            event: decl.event.clone(),
        })?;
    let event = events
        .lookup(&decl.event)
        .ok_or_else(|| CompileError::UnknownEvent {
            state: decl.state.clone(),
            event: decl.event.clone(),
        })?;
    if decl.branches.is_empty() {
        return Err(CompileError::NoBranches {
            state: decl.state.clone(),
            event: decl.event.clone(),
        });
    }

    let guard = match &decl.guard {
        None => {
            if decl.branches.len() != 1 || decl.branches[0].when != When::Always {
                return Err(CompileError::UnguardedBranches {
                    state: decl.state.clone(),
                    event: decl.event.clone(),
                });
            }
            None
        }
        Some(name) => {
            let domain = check_conditions(decl, name)?;
            let callback = callbacks.intern(name, CallbackKind::Guard(domain))?;
            Some(Guard { callback, domain })
        }
    };

    let mut branches = Vec::with_capacity(decl.branches.len());
    for branch in &decl.branches {
        let target = match &branch.target {
            TargetDecl::State(id) => {
                Target::State(tree.lookup(id).ok_or_else(|| CompileError::UnknownTarget {
                    state: decl.state.clone(),
                    event: decl.event.clone(),
                    target: id.clone(),
                })?)
            }
            TargetDecl::Final => Target::Final,
            TargetDecl::Internal => Target::Internal,
        };
        let actions = branch
            .actions
            .iter()
            .map(|action| callbacks.intern(action, CallbackKind::Action))
            .collect::<Result<Vec<_>>>()?;
        branches.push(Branch {
            when: branch.when,
            target,
            actions,
        });
    }

    Ok(TransitionDef {
        defining,
        event,
        guard,
        branches,
    })
}

/// Checks the branch conditions of a guarded transition and infers the
/// guard's domain from them.
fn check_conditions(decl: &TransitionDecl, guard: &str) -> Result<GuardDomain> {
    let mut domain = None;
    let mut seen = HashSet::new();
    let mut catch_all = false;

    for branch in &decl.branches {
        if catch_all {
            return Err(CompileError::BranchAfterCatchAll {
                state: decl.state.clone(),
                event: decl.event.clone(),
            });
        }
        let branch_domain = match branch.when {
            When::Always => {
                return Err(CompileError::UnconditionalGuardedBranch {
                    state: decl.state.clone(),
                    event: decl.event.clone(),
                });
            }
            When::Is(_) => Some(GuardDomain::Boolean),
            When::Case(_) => Some(GuardDomain::Selector),
            When::Otherwise => {
                catch_all = true;
                None
            }
        };
        if let Some(branch_domain) = branch_domain {
            match domain {
                Some(existing) if existing != branch_domain => {
                    return Err(CompileError::MixedConditions {
                        state: decl.state.clone(),
                        event: decl.event.clone(),
                        guard: guard.to_string(),
                    });
                }
                _ => domain = Some(branch_domain),
            }
        }
        if !seen.insert(branch.when) {
            return Err(CompileError::DuplicateBranch {
                state: decl.state.clone(),
                event: decl.event.clone(),
                condition: branch.when.to_string(),
            });
        }
    }

    // A guard with only a catch-all is treated as boolean.
    let domain = domain.unwrap_or(GuardDomain::Boolean);
    if !catch_all {
        let missing = match domain {
            GuardDomain::Boolean => {
                match (seen.contains(&When::Is(true)), seen.contains(&When::Is(false))) {
                    (true, true) => None,
                    (true, false) => Some("false"),
                    (false, true) => Some("true"),
                    (false, false) => Some("true and false"),
                }
            }
            GuardDomain::Selector => Some("otherwise"),
        };
        if let Some(missing) = missing {
            return Err(CompileError::NonExhaustiveGuard {
                state: decl.state.clone(),
                event: decl.event.clone(),
                guard: guard.to_string(),
                missing: missing.to_string(),
            });
        }
    }
    Ok(domain)
}
