//! The state tree and event alphabet.
//!
//! States live in an arena addressed by [`StateIdx`]; an index doubles as the
//! state ordinal used by every backend. Parent, child and default-child links
//! are indices into the same arena.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::debug;

use crate::callback::{CallbackIdx, CallbackKind, CallbackTable};
use crate::error::{CompileError, Result};
use crate::ir::MachineIr;

/// Ordinal of a state in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct StateIdx(usize);

impl StateIdx {
    pub const fn new(ordinal: usize) -> Self {
        Self(ordinal)
    }

    pub const fn ordinal(self) -> usize {
        self.0
    }
}

/// Ordinal of an event in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EventIdx(usize);

impl EventIdx {
    pub const fn new(ordinal: usize) -> Self {
        Self(ordinal)
    }

    pub const fn ordinal(self) -> usize {
        self.0
    }
}

/// One state of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StateNode {
    pub id: String,
    /// Identifier-safe rendering of the id (`A/B` becomes `A_B`).
    pub label: String,
    pub parent: Option<StateIdx>,
    pub children: Vec<StateIdx>,
    pub default_child: Option<StateIdx>,
    pub entry: Vec<CallbackIdx>,
    pub exit: Vec<CallbackIdx>,
    /// Zero for top-level states.
    pub depth: usize,
}

impl StateNode {
    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }
}

/// The validated, immutable state hierarchy.
#[derive(Debug, Clone)]
pub struct StateTree {
    nodes: Vec<StateNode>,
    roots: Vec<StateIdx>,
    initial: StateIdx,
    by_id: HashMap<String, StateIdx>,
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    !matches!(name, "_" | "self" | "Self" | "super" | "crate")
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn check_name(what: &'static str, name: &str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(CompileError::InvalidName {
            what,
            name: name.to_string(),
        })
    }
}

impl StateTree {
    /// Validates the declared hierarchy. Entry and exit actions are interned
    /// into `callbacks` in declaration order.
    pub(crate) fn build(ir: &MachineIr, callbacks: &mut CallbackTable) -> Result<Self> {
        if ir.states.is_empty() {
            return Err(CompileError::EmptyMachine {
                machine: ir.name.clone(),
            });
        }

        // First pass: ids, labels and uniqueness.
        let mut by_id = HashMap::with_capacity(ir.states.len());
        let mut by_label: HashMap<String, &str> = HashMap::with_capacity(ir.states.len());
        let mut nodes = Vec::with_capacity(ir.states.len());
        for (ordinal, decl) in ir.states.iter().enumerate() {
            if decl.id.is_empty() || !decl.id.split('/').all(is_identifier) {
                return Err(CompileError::InvalidName {
                    what: "state",
                    name: decl.id.clone(),
                });
            }
            if by_id.insert(decl.id.clone(), StateIdx(ordinal)).is_some() {
                return Err(CompileError::DuplicateState {
                    state: decl.id.clone(),
                });
            }
            let label = decl.id.replace('/', "_");
            if let Some(first) = by_label.insert(label.clone(), &decl.id) {
                return Err(CompileError::DuplicateLabel {
                    label,
                    first: first.to_string(),
                    second: decl.id.clone(),
                });
            }
            let entry = decl
                .entry
                .iter()
                .map(|action| callbacks.intern(action, CallbackKind::Action))
                .collect::<Result<Vec<_>>>()?;
            let exit = decl
                .exit
                .iter()
                .map(|action| callbacks.intern(action, CallbackKind::Action))
                .collect::<Result<Vec<_>>>()?;
            nodes.push(StateNode {
                id: decl.id.clone(),
                label,
                parent: None,
                children: Vec::new(),
                default_child: None,
                entry,
                exit,
                depth: 0,
            });
        }

        // Second pass: parent links.
        for (ordinal, decl) in ir.states.iter().enumerate() {
            if let Some(parent_id) = &decl.parent {
                let parent = by_id.get(parent_id).copied().ok_or_else(|| {
                    CompileError::UnknownParent {
                        state: decl.id.clone(),
                        parent: parent_id.clone(),
                    }
                })?;
                nodes[ordinal].parent = Some(parent);
            }
        }

        // Every parent chain must reach a root within `len` steps.
        for start in 0..nodes.len() {
            let mut depth = 0;
            let mut cursor = nodes[start].parent;
            while let Some(parent) = cursor {
                depth += 1;
                if depth > nodes.len() || parent.0 == start {
                    return Err(CompileError::HierarchyCycle {
                        state: nodes[start].id.clone(),
                    });
                }
                cursor = nodes[parent.0].parent;
            }
            nodes[start].depth = depth;
        }

        let mut roots = Vec::new();
        for ordinal in 0..nodes.len() {
            match nodes[ordinal].parent {
                Some(parent) => nodes[parent.0].children.push(StateIdx(ordinal)),
                None => roots.push(StateIdx(ordinal)),
            }
        }

        // Third pass: default children.
        for (ordinal, decl) in ir.states.iter().enumerate() {
            let node = &nodes[ordinal];
            match (&decl.initial, node.is_composite()) {
                (None, false) => {}
                (None, true) => {
                    return Err(CompileError::MissingDefaultChild {
                        state: decl.id.clone(),
                    });
                }
                (Some(child), false) => {
                    return Err(CompileError::DefaultChildOnLeaf {
                        state: decl.id.clone(),
                        child: child.clone(),
                    });
                }
                (Some(child), true) => {
                    let child_idx = by_id
                        .get(child)
                        .copied()
                        .filter(|idx| node.children.contains(idx))
                        .ok_or_else(|| CompileError::DefaultChildNotAChild {
                            state: decl.id.clone(),
                            child: child.clone(),
                        })?;
                    nodes[ordinal].default_child = Some(child_idx);
                }
            }
        }

        let initial = match &ir.initial {
            Some(id) => {
                let idx = by_id
                    .get(id)
                    .copied()
                    .ok_or_else(|| CompileError::UnknownInitial { state: id.clone() })?;
                if nodes[idx.0].parent.is_some() {
                    return Err(CompileError::InitialNotTopLevel { state: id.clone() });
                }
                idx
            }
            None if roots.len() == 1 => roots[0],
            None => return Err(CompileError::MissingInitial { count: roots.len() }),
        };

        debug!(
            states = nodes.len(),
            roots = roots.len(),
            initial = %nodes[initial.0].id,
            "built state tree"
        );

        Ok(Self {
            nodes,
            roots,
            initial,
            by_id,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, idx: StateIdx) -> &StateNode {
        &self.nodes[idx.0]
    }

    pub fn lookup(&self, id: &str) -> Option<StateIdx> {
        self.by_id.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateIdx, &StateNode)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(ordinal, node)| (StateIdx(ordinal), node))
    }

    pub fn roots(&self) -> &[StateIdx] {
        &self.roots
    }

    /// The top-level state entered at startup.
    pub fn initial(&self) -> StateIdx {
        self.initial
    }

    /// `idx` followed by its parent, grandparent, and so on up to its root.
    pub fn ancestors(&self, idx: StateIdx) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: Some(idx),
        }
    }

    /// Root-first path from the top-level ancestor down to `idx`.
    pub fn path(&self, idx: StateIdx) -> Vec<StateIdx> {
        let mut path: Vec<StateIdx> = self.ancestors(idx).collect();
        path.reverse();
        path
    }

    pub fn is_ancestor_or_self(&self, ancestor: StateIdx, idx: StateIdx) -> bool {
        self.ancestors(idx).any(|a| a == ancestor)
    }

    /// Deepest state that is an ancestor-or-self of both `a` and `b`.
    /// `None` stands for the implicit whole-tree root.
    pub fn lca(&self, a: StateIdx, b: StateIdx) -> Option<StateIdx> {
        let (mut a, mut b) = (Some(a), Some(b));
        while let (Some(x), Some(y)) = (a, b) {
            if x == y {
                return Some(x);
            }
            let (dx, dy) = (self.get(x).depth, self.get(y).depth);
            if dx >= dy {
                a = self.get(x).parent;
            }
            if dy >= dx {
                b = self.get(y).parent;
            }
        }
        None
    }

    /// Follows default children from `idx` down to a leaf.
    pub fn default_leaf(&self, idx: StateIdx) -> StateIdx {
        let mut cursor = idx;
        while let Some(child) = self.get(cursor).default_child {
            cursor = child;
        }
        cursor
    }
}

/// Iterator returned by [`StateTree::ancestors`].
pub struct Ancestors<'a> {
    tree: &'a StateTree,
    next: Option<StateIdx>,
}

impl Iterator for Ancestors<'_> {
    type Item = StateIdx;

    fn next(&mut self) -> Option<StateIdx> {
        let current = self.next?;
        self.next = self.tree.get(current).parent;
        Some(current)
    }
}

/// The fixed event alphabet.
#[derive(Debug, Clone, Default)]
pub struct EventAlphabet {
    events: Vec<String>,
    by_id: HashMap<String, EventIdx>,
}

impl EventAlphabet {
    pub(crate) fn build(events: &[String]) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(events.len());
        for (ordinal, event) in events.iter().enumerate() {
            check_name("event", event)?;
            if by_id.insert(event.clone(), EventIdx(ordinal)).is_some() {
                return Err(CompileError::DuplicateEvent {
                    event: event.clone(),
                });
            }
        }
        Ok(Self {
            events: events.to_vec(),
            by_id,
        })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn name(&self, idx: EventIdx) -> &str {
        &self.events[idx.0]
    }

    pub fn lookup(&self, event: &str) -> Option<EventIdx> {
        self.by_id.get(event).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventIdx, &str)> + '_ {
        self.events
            .iter()
            .enumerate()
            .map(|(ordinal, event)| (EventIdx(ordinal), event.as_str()))
    }
}
